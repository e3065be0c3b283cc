//! Entry header format definitions
//!
//! Every matrix and lookup entry starts with the same fixed-size header
//! describing its element type, dimensions, codec and payload location.

use super::constants::*;
use crate::validation::checked_element_count;
use crate::{CoreError, Result};

/// Data types supported for matrix and numeric lookup elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum DataType {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 32-bit signed integer
    I32 = 2,
    /// 64-bit signed integer
    I64 = 3,
    /// 32-bit unsigned integer
    U32 = 4,
    /// 64-bit unsigned integer
    U64 = 5,
}

impl DataType {
    /// Convert from u8 representation
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataType::F32),
            1 => Some(DataType::F64),
            2 => Some(DataType::I32),
            3 => Some(DataType::I64),
            4 => Some(DataType::U32),
            5 => Some(DataType::U64),
            _ => None,
        }
    }

    /// Convert to u8 representation
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the size in bytes for this data type
    pub const fn size_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
        }
    }

    /// Whether this is a floating point type
    pub const fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Parse a type name such as `f32` or `float64`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "f32" | "float32" => Some(DataType::F32),
            "f64" | "float64" => Some(DataType::F64),
            "i32" | "int32" => Some(DataType::I32),
            "i64" | "int64" => Some(DataType::I64),
            "u32" | "uint32" => Some(DataType::U32),
            "u64" | "uint64" => Some(DataType::U64),
            _ => None,
        }
    }

    /// Write `value` as this type in little-endian order
    ///
    /// Integer targets use saturating `as` conversion.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`DataType::size_bytes`].
    pub fn encode_f64(self, value: f64, out: &mut [u8]) {
        match self {
            DataType::F32 => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
            DataType::F64 => out[..8].copy_from_slice(&value.to_le_bytes()),
            DataType::I32 => out[..4].copy_from_slice(&(value as i32).to_le_bytes()),
            DataType::I64 => out[..8].copy_from_slice(&(value as i64).to_le_bytes()),
            DataType::U32 => out[..4].copy_from_slice(&(value as u32).to_le_bytes()),
            DataType::U64 => out[..8].copy_from_slice(&(value as u64).to_le_bytes()),
        }
    }

    /// Read a little-endian value of this type as f64
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`DataType::size_bytes`].
    pub fn decode_f64(self, bytes: &[u8]) -> f64 {
        match self {
            DataType::F32 => f32::from_le_bytes(le_array(bytes)) as f64,
            DataType::F64 => f64::from_le_bytes(le_array(bytes)),
            DataType::I32 => i32::from_le_bytes(le_array(bytes)) as f64,
            DataType::I64 => i64::from_le_bytes(le_array(bytes)) as f64,
            DataType::U32 => u32::from_le_bytes(le_array(bytes)) as f64,
            DataType::U64 => u64::from_le_bytes(le_array(bytes)) as f64,
        }
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataType::F32 => write!(f, "f32"),
            DataType::F64 => write!(f, "f64"),
            DataType::I32 => write!(f, "i32"),
            DataType::I64 => write!(f, "i64"),
            DataType::U32 => write!(f, "u32"),
            DataType::U64 => write!(f, "u64"),
        }
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    array.copy_from_slice(&bytes[..N]);
    array
}

/// Payload compression codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum Codec {
    /// Raw little-endian payload, memory-mappable
    #[default]
    None = 0,
    /// Zstandard-compressed payload
    Zstd = 1,
}

impl Codec {
    /// Convert from u8 representation
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Codec::None),
            1 => Some(Codec::Zstd),
            _ => None,
        }
    }
}

impl core::fmt::Display for Codec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Codec::None => write!(f, "none"),
            Codec::Zstd => write!(f, "zstd"),
        }
    }
}

/// What an entry stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    Matrix = 0,
    Lookup = 1,
}

impl EntryKind {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryKind::Matrix),
            1 => Some(EntryKind::Lookup),
            _ => None,
        }
    }
}

impl core::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EntryKind::Matrix => write!(f, "matrix"),
            EntryKind::Lookup => write!(f, "lookup"),
        }
    }
}

/// Element type of an entry: a numeric atom or a fixed-width label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Numeric(DataType),
    Label,
}

impl ElementType {
    /// Type code stored in the header
    pub const fn code(self) -> u8 {
        match self {
            ElementType::Numeric(data_type) => data_type.to_u8(),
            ElementType::Label => LABEL_TYPE_CODE,
        }
    }

    /// Parse a header type code
    pub const fn from_code(code: u8) -> Option<Self> {
        if code == LABEL_TYPE_CODE {
            return Some(ElementType::Label);
        }
        match DataType::from_u8(code) {
            Some(data_type) => Some(ElementType::Numeric(data_type)),
            None => None,
        }
    }
}

impl core::fmt::Display for ElementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ElementType::Numeric(data_type) => write!(f, "{data_type}"),
            ElementType::Label => write!(f, "label"),
        }
    }
}

/// Fixed-size header opening every entry file (128 bytes, little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Magic bytes: "OMXE"
    pub magic: [u8; 4],
    /// Format version
    pub version: u8,
    pub kind: EntryKind,
    pub element: ElementType,
    pub codec: Codec,
    /// Codec level the payload was written with
    pub level: i32,
    /// Number of meaningful entries in `dims`
    pub rank: u32,
    pub dims: [u64; MAX_RANK],
    /// Write counter, bumped on every rewrite of the entry
    pub generation: u64,
    /// Bytes per label (labels only)
    pub label_stride: u32,
    /// Offset of the payload from the start of the file
    pub payload_offset: u64,
    /// Size of the payload as stored
    pub payload_size: u64,
    /// Size of the payload once decoded
    pub decoded_size: u64,
}

impl EntryHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = ENTRY_HEADER_SIZE;

    /// Create a header for an uncompressed numeric entry
    pub fn new(kind: EntryKind, data_type: DataType, dims: &[u64]) -> Result<Self> {
        Self::build(kind, ElementType::Numeric(data_type), dims, 0)
    }

    /// Create a header for a lookup of `count` fixed-width labels
    pub fn for_labels(count: u64, stride: u32) -> Result<Self> {
        if stride == 0 || stride > MAX_LABEL_STRIDE {
            return Err(CoreError::InvalidHeader);
        }
        Self::build(EntryKind::Lookup, ElementType::Label, &[count], stride)
    }

    fn build(kind: EntryKind, element: ElementType, dims: &[u64], label_stride: u32) -> Result<Self> {
        if dims.is_empty() || dims.len() > MAX_RANK {
            return Err(CoreError::InvalidHeader);
        }
        let mut stored = [0u64; MAX_RANK];
        stored[..dims.len()].copy_from_slice(dims);

        let mut header = Self {
            magic: ENTRY_MAGIC,
            version: ENTRY_VERSION,
            kind,
            element,
            codec: Codec::None,
            level: 0,
            rank: dims.len() as u32,
            dims: stored,
            generation: 0,
            label_stride,
            payload_offset: Self::SIZE as u64,
            payload_size: 0,
            decoded_size: 0,
        };
        header.decoded_size = header.expected_decoded_size()?;
        header.payload_size = header.decoded_size;
        Ok(header)
    }

    /// Meaningful dimensions
    pub fn dims(&self) -> &[u64] {
        &self.dims[..self.rank as usize]
    }

    /// First two dimensions, if the entry has at least two
    pub fn leading_dims(&self) -> Option<(u64, u64)> {
        match self.dims() {
            [rows, cols, ..] => Some((*rows, *cols)),
            _ => None,
        }
    }

    /// Bytes per element
    pub const fn element_size(&self) -> usize {
        match self.element {
            ElementType::Numeric(data_type) => data_type.size_bytes(),
            ElementType::Label => self.label_stride as usize,
        }
    }

    /// Total number of elements
    pub fn element_count(&self) -> Result<u64> {
        checked_element_count(self.dims())
    }

    /// Decoded payload size implied by the dimensions and element size
    pub fn expected_decoded_size(&self) -> Result<u64> {
        self.element_count()?
            .checked_mul(self.element_size() as u64)
            .ok_or(CoreError::ArraySizeOverflow)
    }

    /// Record how the payload is stored
    pub fn set_payload(&mut self, codec: Codec, level: i32, stored_size: u64) {
        self.codec = codec;
        self.level = if codec == Codec::None { 0 } else { level };
        self.payload_size = stored_size;
    }

    /// Validate the header magic and version
    pub fn is_valid(&self) -> bool {
        self.magic == ENTRY_MAGIC && self.version <= ENTRY_VERSION
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(CoreError::InsufficientBuffer);
        }

        // Validate magic bytes
        if bytes[0..4] != ENTRY_MAGIC {
            return Err(CoreError::InvalidHeader);
        }

        let version = bytes[4];
        if version > ENTRY_VERSION {
            return Err(CoreError::UnsupportedFormat);
        }
        let kind = EntryKind::from_u8(bytes[5]).ok_or(CoreError::UnsupportedFormat)?;
        let element = ElementType::from_code(bytes[6]).ok_or(CoreError::UnsupportedFormat)?;
        let codec = Codec::from_u8(bytes[7]).ok_or(CoreError::UnsupportedFormat)?;

        let level = i32::from_le_bytes(le_array(&bytes[8..12]));
        let rank = u32::from_le_bytes(le_array(&bytes[12..16]));
        if rank == 0 || rank as usize > MAX_RANK {
            return Err(CoreError::InvalidHeader);
        }

        let mut dims = [0u64; MAX_RANK];
        for (i, dim) in dims.iter_mut().enumerate() {
            let start = 16 + i * 8;
            *dim = u64::from_le_bytes(le_array(&bytes[start..start + 8]));
        }
        if dims[rank as usize..].iter().any(|&d| d != 0) {
            return Err(CoreError::InvalidHeader);
        }

        let header = Self {
            magic: ENTRY_MAGIC,
            version,
            kind,
            element,
            codec,
            level,
            rank,
            dims,
            generation: u64::from_le_bytes(le_array(&bytes[48..56])),
            label_stride: u32::from_le_bytes(le_array(&bytes[56..60])),
            payload_offset: u64::from_le_bytes(le_array(&bytes[64..72])),
            payload_size: u64::from_le_bytes(le_array(&bytes[72..80])),
            decoded_size: u64::from_le_bytes(le_array(&bytes[80..88])),
        };

        if header.element == ElementType::Label
            && (header.label_stride == 0 || header.label_stride > MAX_LABEL_STRIDE)
        {
            return Err(CoreError::InvalidHeader);
        }
        if header.payload_offset < Self::SIZE as u64 {
            return Err(CoreError::InvalidHeader);
        }
        if header.expected_decoded_size()? != header.decoded_size {
            return Err(CoreError::CorruptedData);
        }
        if header.codec == Codec::None && header.payload_size != header.decoded_size {
            return Err(CoreError::CorruptedData);
        }

        Ok(header)
    }

    /// Convert header to its fixed-size byte form
    pub fn to_bytes(&self) -> [u8; ENTRY_HEADER_SIZE] {
        let mut bytes = [0u8; ENTRY_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5] = self.kind as u8;
        bytes[6] = self.element.code();
        bytes[7] = self.codec as u8;
        bytes[8..12].copy_from_slice(&self.level.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.rank.to_le_bytes());
        for (i, dim) in self.dims.iter().enumerate() {
            let start = 16 + i * 8;
            bytes[start..start + 8].copy_from_slice(&dim.to_le_bytes());
        }
        bytes[48..56].copy_from_slice(&self.generation.to_le_bytes());
        bytes[56..60].copy_from_slice(&self.label_stride.to_le_bytes());
        // bytes 60..64 are padding
        bytes[64..72].copy_from_slice(&self.payload_offset.to_le_bytes());
        bytes[72..80].copy_from_slice(&self.payload_size.to_le_bytes());
        bytes[80..88].copy_from_slice(&self.decoded_size.to_le_bytes());
        // bytes 88..128 reserved
        bytes
    }
}
