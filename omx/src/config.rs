//! Container and import configuration

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use omx_core::{Codec, DataType};
use serde::{Deserialize, Serialize};

/// Default zstd level for compressed entries
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 5;

/// Default number of records processed per import chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// How a container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Existing container, no mutation
    Read,
    /// Existing container, or a new one if the directory holds none
    #[default]
    Append,
    /// Always start an empty container, discarding a previous one
    Create,
}

impl Mode {
    pub fn is_writable(self) -> bool {
        !matches!(self, Mode::Read)
    }
}

/// Configuration applied when a container is opened or created
///
/// Codec and level apply to entries written through this handle; existing
/// entries keep the encoding they were written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub mode: Mode,
    pub codec: Codec,
    pub level: i32,
}

impl ContainerConfig {
    /// Config for read-only access
    pub fn read_only() -> Self {
        Self::default().with_mode(Mode::Read)
    }

    /// Set the open mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Compress new entries with zstd at `level`
    pub fn with_compression(mut self, level: i32) -> Self {
        self.codec = Codec::Zstd;
        self.level = level;
        self
    }

    /// Write new entries uncompressed (memory-mappable)
    pub fn without_compression(mut self) -> Self {
        self.codec = Codec::None;
        self
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Append,
            codec: Codec::None,
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Configuration for bulk table imports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Row and column ids start at 1
    pub one_based: bool,
    /// Records buffered and applied per chunk
    pub chunk_size: usize,
    /// Source value column to destination matrix; all value columns when `None`
    pub column_map: Option<Vec<(String, String)>>,
    /// Element type of destination matrices that do not exist yet
    pub default_type: DataType,
    /// Checked between chunks; a set flag aborts the import
    #[serde(skip)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ImportConfig {
    /// Ids in the source start at 0
    pub fn zero_based(mut self) -> Self {
        self.one_based = false;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_default_type(mut self, default_type: DataType) -> Self {
        self.default_type = default_type;
        self
    }

    /// Map source columns to destination matrices
    pub fn with_column_map<I, S, D>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        self.column_map = Some(
            pairs
                .into_iter()
                .map(|(source, dest)| (source.into(), dest.into()))
                .collect(),
        );
        self
    }

    /// Abort at the next chunk boundary once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub(crate) fn offset(&self) -> u64 {
        u64::from(self.one_based)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            one_based: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            column_map: None,
            default_type: DataType::F32,
            cancel: None,
        }
    }
}
