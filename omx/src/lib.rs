//! OMX - Open matrix containers
//!
//! A container holds equally shaped dense matrices plus lookups that map
//! external identifiers (zone numbers, district names) to matrix positions.
//!
//! ## Architecture
//!
//! OMX follows a format/implementation separation:
//!
//! - **omx-core**: entry header format, shape registry, resolution and
//!   validation (no I/O)
//! - **omx**: the on-disk container with memory-mapped entries, lookups,
//!   bulk import and configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use omx::{DenseArray, ImportConfig, CsvSource, OpenMatrix};
//!
//! fn example() -> omx::Result<()> {
//!     let mut omx = OpenMatrix::create("skims.omx")?;
//!
//!     // The first matrix establishes the container shape
//!     let time = DenseArray::from_rows(&[[0.0f32, 12.5], [11.0, 0.0]])?;
//!     omx.put("time", &time, false)?;
//!
//!     omx.add_lookup("taz", vec![101i64, 102])?;
//!     let positions = omx.resolve("taz", &[102i64, 101])?;
//!     assert_eq!(positions, vec![1, 0]);
//!
//!     // Stream a large (o, d, value...) table in chunks
//!     let mut source = CsvSource::from_path("distance.csv")?;
//!     omx.import_table(&mut source, &ImportConfig::default())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Memory-mapped entries**: uncompressed matrices are read and updated in place
//! - **Optional compression**: zstd-compressed entries per container configuration
//! - **Crash-safe writes**: every entry and attribute write is atomic and fsynced
//! - **Chunked import**: bounded-memory import with durable per-chunk progress
//! - **Cached reverse lookups**: validated against each lookup's write generation

pub use omx_core::{
    // Format definitions
    Codec, DataType, ElementType, EntryHeader, EntryKind,
    // Model
    LookupKey, MatrixElement, Resolver, Shape, ShapeRegistry,
    // Error handling
    CoreError, ErrorCategory,
};

pub mod array;
pub mod config;
pub mod container;
pub mod error;
pub mod import;
pub mod lookup;
pub mod matrix_store;
pub mod storage;

pub use array::{DenseArray, DynamicArray, DynamicElement};
pub use config::{ContainerConfig, ImportConfig, Mode};
pub use container::OpenMatrix;
pub use error::{Error, Result};
pub use import::{CsvSource, ImportPhase, ImportSummary, MemorySource, TableSource};
pub use lookup::{LookupArray, LookupElement, LookupValue, ReverseLookup};
pub use matrix_store::MatrixHandle;
