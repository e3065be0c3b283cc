//! Array bounds validation
//!
//! This module provides overflow-checked size arithmetic for entry
//! payloads with no I/O dependencies.

use crate::CoreError;

/// Product of all dimensions with overflow protection
pub fn checked_element_count(dims: &[u64]) -> Result<u64, CoreError> {
    dims.iter()
        .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
        .ok_or(CoreError::ArraySizeOverflow)
}

/// Byte length of `count` elements of `element_size` bytes, as a usize
pub fn checked_byte_len(count: u64, element_size: usize) -> Result<usize, CoreError> {
    let bytes = count
        .checked_mul(element_size as u64)
        .ok_or(CoreError::ArraySizeOverflow)?;
    usize::try_from(bytes).map_err(|_| CoreError::ArraySizeOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_element_count() {
        assert_eq!(checked_element_count(&[3, 4, 2]), Ok(24));
        assert_eq!(checked_element_count(&[]), Ok(1));
        assert_eq!(
            checked_element_count(&[u64::MAX, 2]),
            Err(CoreError::ArraySizeOverflow)
        );
    }

    #[test]
    fn test_checked_byte_len() {
        assert_eq!(checked_byte_len(10, 8), Ok(80));
        assert_eq!(checked_byte_len(u64::MAX, 8), Err(CoreError::ArraySizeOverflow));
    }
}
