//! Root attribute model for OMX containers

use alloc::string::{String, ToString};

use super::constants::CONTAINER_VERSION;

/// Attributes stored at the container root
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RootAttributes {
    /// Container format version
    #[cfg_attr(feature = "serde", serde(rename = "VERSION"))]
    pub version: String,
    /// Shared `(rows, cols)` shape, `[0, 0]` while unset
    #[cfg_attr(feature = "serde", serde(rename = "SHAPE"))]
    pub shape: [u64; 2],
}

impl RootAttributes {
    /// Attributes of a freshly created container
    pub fn new() -> Self {
        Self {
            version: CONTAINER_VERSION.to_string(),
            shape: [0, 0],
        }
    }
}

impl Default for RootAttributes {
    fn default() -> Self {
        Self::new()
    }
}
