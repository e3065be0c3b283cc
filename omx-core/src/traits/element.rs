//! Matrix element type constraints
//!
//! This module defines the trait that constrains what types can be
//! stored as matrix elements in an OMX container.

use crate::format::DataType;

/// Trait for types that can be stored as matrix elements
///
/// Elements are plain old data so payloads can be cast to and from bytes,
/// and carry the [`DataType`] code written to the entry header.
pub trait MatrixElement:
    bytemuck::Pod + PartialEq + Default + core::fmt::Debug + Send + Sync + 'static
{
    /// Get the DataType representation for this element type
    fn data_type() -> DataType;

    /// Get the size in bytes of this element type
    fn size_bytes() -> usize {
        core::mem::size_of::<Self>()
    }

    /// Convert from f64 for generic construction
    fn from_f64(value: f64) -> Self;

    /// Convert to f64 for generic operations
    fn to_f64(self) -> f64;
}

macro_rules! impl_matrix_element {
    ($type:ty, $variant:ident) => {
        impl MatrixElement for $type {
            fn data_type() -> DataType {
                DataType::$variant
            }

            fn from_f64(value: f64) -> Self {
                value as $type
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_matrix_element!(f32, F32);
impl_matrix_element!(f64, F64);
impl_matrix_element!(i32, I32);
impl_matrix_element!(i64, I64);
impl_matrix_element!(u32, U32);
impl_matrix_element!(u64, U64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_codes_match_sizes() {
        assert_eq!(f32::data_type().size_bytes(), f32::size_bytes());
        assert_eq!(u64::data_type().size_bytes(), u64::size_bytes());
        assert_eq!(i32::from_f64(3.9), 3);
        assert_eq!(f64::from_f64(2.5).to_f64(), 2.5);
    }
}
