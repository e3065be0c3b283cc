//! On-disk storage of container entries
//!
//! Every entry file is a fixed-size [`EntryHeader`](omx_core::EntryHeader)
//! followed by its payload. Whole-entry writes always go through a temporary
//! file that is synced and renamed into place, so a reader sees either the
//! previous entry or the new one. Uncompressed payloads are memory-mapped,
//! which also allows in-place updates during chunked imports.

mod durable;
mod entry_file;

pub(crate) use durable::{remove_stale_temp_files, sync_dir, write_atomic};
pub use entry_file::{EntryFile, EntryWriter, Payload};
