//! Validation utilities for OMX structures
//!
//! Pure functions with no I/O: size arithmetic and entry name rules.

pub mod bounds;
pub mod names;

pub use bounds::{checked_byte_len, checked_element_count};
pub use names::validate_entry_name;
