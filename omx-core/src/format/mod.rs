//! Binary format definitions for OMX container entries
//!
//! This module contains pure data structure definitions for the entry wire
//! format and the root attributes. No I/O operations.

pub mod constants;
pub mod header;
#[cfg(feature = "alloc")]
pub mod attributes;

// Re-export format definitions
pub use constants::*;
pub use header::{Codec, DataType, ElementType, EntryHeader, EntryKind};
#[cfg(feature = "alloc")]
pub use attributes::RootAttributes;
