//! Entry name rules
//!
//! Names become file names inside the container, so they are limited to
//! ASCII alphanumerics, `_`, `-` and `.`, must not start with `.`, and are
//! at most [`MAX_NAME_LEN`](crate::format::constants::MAX_NAME_LEN) bytes.

use crate::format::constants::MAX_NAME_LEN;
use crate::CoreError;

/// Validate a matrix or lookup name
pub fn validate_entry_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.starts_with('.') {
        return Err(CoreError::InvalidName);
    }
    let allowed = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.');
    if !name.bytes().all(allowed) {
        return Err(CoreError::InvalidName);
    }
    Ok(())
}
