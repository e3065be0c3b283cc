//! Error types for OMX format and model checks

/// Errors that can occur while validating OMX structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid entry header
    InvalidHeader,
    /// Unsupported format version or type code
    UnsupportedFormat,
    /// Data corruption detected
    CorruptedData,
    /// Insufficient buffer space
    InsufficientBuffer,
    /// Size calculation would overflow
    ArraySizeOverflow,
    /// Entry name is empty or contains forbidden characters
    InvalidName,
    /// The container shape has not been established
    ShapeUnset,
    /// A shape with a zero dimension was proposed
    ZeroDimension,
    /// Dimensions disagree with the container shape
    IncompatibleShape,
    /// A lookup holds duplicate identifiers
    NonUniqueLookup,
    /// A lookup holds no identifiers
    EmptyLookup,
}

/// Broad classification of failures, shared by every OMX layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A structural precondition is not met
    BadFormat,
    /// Dimensions disagree with the established shape
    IncompatibleShape,
    /// Resolution against a lookup with duplicate values
    NonUniqueLookup,
    /// A named matrix or lookup does not exist
    NotFound,
    /// A bulk import stopped before finishing
    ImportAborted,
    /// The caller supplied an unusable argument
    InvalidInput,
    /// The storage medium failed
    Io,
}

impl CoreError {
    /// Classify this error
    pub const fn category(&self) -> ErrorCategory {
        match self {
            CoreError::InvalidHeader
            | CoreError::UnsupportedFormat
            | CoreError::CorruptedData
            | CoreError::InsufficientBuffer
            | CoreError::ArraySizeOverflow
            | CoreError::ShapeUnset
            | CoreError::ZeroDimension
            | CoreError::EmptyLookup => ErrorCategory::BadFormat,
            CoreError::InvalidName => ErrorCategory::InvalidInput,
            CoreError::IncompatibleShape => ErrorCategory::IncompatibleShape,
            CoreError::NonUniqueLookup => ErrorCategory::NonUniqueLookup,
        }
    }
}

impl core::fmt::Display for CoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            CoreError::InvalidHeader => "Invalid entry header",
            CoreError::UnsupportedFormat => "Unsupported format version",
            CoreError::CorruptedData => "Data corruption detected",
            CoreError::InsufficientBuffer => "Insufficient buffer space",
            CoreError::ArraySizeOverflow => "Array size overflow",
            CoreError::InvalidName => "Invalid entry name",
            CoreError::ShapeUnset => "Container shape has not been set",
            CoreError::ZeroDimension => "Shape dimensions must be non-zero",
            CoreError::IncompatibleShape => "Shape is incompatible with the container",
            CoreError::NonUniqueLookup => "Lookup does not have unique labels",
            CoreError::EmptyLookup => "Lookup is empty",
        };
        write!(f, "{msg}")
    }
}

impl core::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ErrorCategory::BadFormat => "bad format",
            ErrorCategory::IncompatibleShape => "incompatible shape",
            ErrorCategory::NonUniqueLookup => "non-unique lookup",
            ErrorCategory::NotFound => "not found",
            ErrorCategory::ImportAborted => "import aborted",
            ErrorCategory::InvalidInput => "invalid input",
            ErrorCategory::Io => "io",
        };
        write!(f, "{name}")
    }
}

/// Result type for OMX core operations
pub type Result<T> = core::result::Result<T, CoreError>;
