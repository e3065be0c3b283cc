//! Element and key traits for OMX entries

pub mod element;
pub mod key;

pub use element::MatrixElement;
pub use key::LookupKey;
