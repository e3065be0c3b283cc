//! Ordering used by lookup resolution
//!
//! Lookup identifiers need a total order. Integers and strings use their
//! natural order. Floats use the IEEE 754 total order after folding `-0.0`
//! into `0.0` and every `NaN` into one value above every number, so keys
//! that compare equal as numbers are equal as identifiers.

use core::cmp::Ordering;

/// Types that can serve as lookup identifiers
pub trait LookupKey {
    /// Total order between two identifiers
    fn key_cmp(&self, other: &Self) -> Ordering;
}

macro_rules! impl_ord_key {
    ($($type:ty),*) => {
        $(
            impl LookupKey for $type {
                fn key_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

impl_ord_key!(i32, i64, u32, u64, str);

macro_rules! impl_float_key {
    ($($type:ty),*) => {
        $(
            impl LookupKey for $type {
                fn key_cmp(&self, other: &Self) -> Ordering {
                    let canonical = |v: $type| {
                        if v.is_nan() {
                            <$type>::NAN
                        } else if v == 0.0 {
                            0.0
                        } else {
                            v
                        }
                    };
                    canonical(*self).total_cmp(&canonical(*other))
                }
            }
        )*
    };
}

impl_float_key!(f32, f64);

#[cfg(feature = "alloc")]
impl LookupKey for alloc::string::String {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_total_order() {
        assert_eq!(1.0f64.key_cmp(&2.0), Ordering::Less);
        assert_eq!(f64::NAN.key_cmp(&f64::INFINITY), Ordering::Greater);
        assert_eq!((-0.0f32).key_cmp(&0.0), Ordering::Equal);
        assert_eq!((-f64::NAN).key_cmp(&f64::NAN), Ordering::Equal);
        assert_eq!((-f64::NAN).key_cmp(&f64::INFINITY), Ordering::Greater);
        assert_eq!((-1.0f32).key_cmp(&-0.0), Ordering::Less);
    }

    #[test]
    fn test_str_order() {
        assert_eq!("A10".key_cmp("A9"), Ordering::Less);
        assert_eq!("b".key_cmp("a"), Ordering::Greater);
    }
}
