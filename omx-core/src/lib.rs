#![no_std]

//! OMX Core - Open Matrix Container Format Definitions
//!
//! This crate provides the entry wire format, shape rules and the
//! identifier resolution algorithm for open matrix containers. It performs
//! no I/O; the `omx` crate hosts these definitions on disk.

// Payloads are little-endian on disk and viewed in place as native slices
#[cfg(target_endian = "big")]
compile_error!("omx payloads are stored little-endian; big-endian targets are not supported");

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod error;
pub mod format;
#[cfg(feature = "alloc")]
pub mod resolve;
pub mod shape;
pub mod traits;
pub mod validation;

pub use error::*;
pub use format::*;
#[cfg(feature = "alloc")]
pub use resolve::{is_sorted_and_unique, resolve_indices, Resolver};
pub use shape::{Shape, ShapeRegistry};
pub use traits::*;
pub use validation::*;
