//! Format constants and magic bytes for OMX entries

/// Magic bytes opening every entry file
pub const ENTRY_MAGIC: [u8; 4] = *b"OMXE";

/// Current entry format version
pub const ENTRY_VERSION: u8 = 1;

/// Fixed size of the entry header in bytes
pub const ENTRY_HEADER_SIZE: usize = 128;

/// Container format version written to the root attributes
pub const CONTAINER_VERSION: &str = "0.2";

/// Highest supported entry rank (rows, cols and two trailing dimensions)
pub const MAX_RANK: usize = 4;

/// Maximum reasonable label stride (64KB)
pub const MAX_LABEL_STRIDE: u32 = 65536;

/// Maximum entry name length in bytes
pub const MAX_NAME_LEN: usize = 255;

/// Element type code used for fixed-width UTF-8 labels
pub const LABEL_TYPE_CODE: u8 = 128;
