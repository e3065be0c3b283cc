//! Container shape registry
//!
//! The shape shared by every matrix is an explicit two-state machine:
//! `Unset` until the first shape is established, then `Set(rows, cols)`.
//! Transitions are computed here and persisted by the caller.

use crate::{CoreError, Result};

/// A `(rows, cols)` pair with both dimensions non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub rows: u64,
    pub cols: u64,
}

impl Shape {
    /// Create a shape, rejecting zero dimensions
    pub const fn new(rows: u64, cols: u64) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(CoreError::ZeroDimension);
        }
        Ok(Self { rows, cols })
    }

    /// Whether a lookup of `len` entries can align with one of the dimensions
    pub const fn accepts_lookup_len(&self, len: u64) -> bool {
        len == self.rows || len == self.cols
    }

    /// Number of cells in one `rows × cols` slice
    pub const fn cells(&self) -> Option<u64> {
        self.rows.checked_mul(self.cols)
    }
}

impl core::fmt::Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.rows, self.cols)
    }
}

/// Shape state of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeRegistry {
    #[default]
    Unset,
    Set(Shape),
}

impl ShapeRegistry {
    /// Restore the registry from a persisted `SHAPE` attribute
    ///
    /// `[0, 0]` means unset; a single zero dimension is malformed.
    pub const fn from_attribute(shape: [u64; 2]) -> Result<Self> {
        if shape[0] == 0 && shape[1] == 0 {
            return Ok(ShapeRegistry::Unset);
        }
        match Shape::new(shape[0], shape[1]) {
            Ok(shape) => Ok(ShapeRegistry::Set(shape)),
            Err(e) => Err(e),
        }
    }

    /// Persistable form of the registry
    pub const fn to_attribute(&self) -> [u64; 2] {
        match self {
            ShapeRegistry::Unset => [0, 0],
            ShapeRegistry::Set(shape) => [shape.rows, shape.cols],
        }
    }

    /// Current `(rows, cols)`, `(0, 0)` while unset
    pub const fn dims(&self) -> (u64, u64) {
        match self {
            ShapeRegistry::Unset => (0, 0),
            ShapeRegistry::Set(shape) => (shape.rows, shape.cols),
        }
    }

    pub const fn is_set(&self) -> bool {
        matches!(self, ShapeRegistry::Set(_))
    }

    /// The established shape, or `ShapeUnset`
    pub const fn require(&self) -> Result<Shape> {
        match self {
            ShapeRegistry::Unset => Err(CoreError::ShapeUnset),
            ShapeRegistry::Set(shape) => Ok(*shape),
        }
    }

    /// Compute the registry that results from proposing `proposed`
    ///
    /// Equal proposals are always accepted. A different shape is accepted
    /// only while no matrix exists.
    pub fn propose(&self, proposed: Shape, matrices_exist: bool) -> Result<ShapeRegistry> {
        match self {
            ShapeRegistry::Set(current) if *current == proposed => Ok(*self),
            ShapeRegistry::Set(_) if matrices_exist => Err(CoreError::IncompatibleShape),
            _ => Ok(ShapeRegistry::Set(proposed)),
        }
    }

    /// Check that an entry's leading two dimensions equal the shape
    pub fn check_matrix_dims(&self, dims: &[u64]) -> Result<()> {
        let shape = self.require()?;
        match dims {
            [rows, cols, ..] if *rows == shape.rows && *cols == shape.cols => Ok(()),
            _ => Err(CoreError::IncompatibleShape),
        }
    }

    /// Check that a lookup length aligns with one of the dimensions
    pub fn check_lookup_len(&self, len: u64) -> Result<()> {
        let shape = self.require()?;
        if shape.accepts_lookup_len(len) {
            Ok(())
        } else {
            Err(CoreError::IncompatibleShape)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_states() {
        assert_eq!(ShapeRegistry::from_attribute([0, 0]), Ok(ShapeRegistry::Unset));
        assert_eq!(
            ShapeRegistry::from_attribute([3, 4]),
            Ok(ShapeRegistry::Set(Shape { rows: 3, cols: 4 }))
        );
        assert_eq!(
            ShapeRegistry::from_attribute([0, 4]),
            Err(CoreError::ZeroDimension)
        );
        assert_eq!(ShapeRegistry::Unset.to_attribute(), [0, 0]);
    }

    #[test]
    fn test_first_proposal_sets_shape() {
        let proposed = Shape::new(3, 3).unwrap();
        let registry = ShapeRegistry::Unset.propose(proposed, false).unwrap();
        assert_eq!(registry.dims(), (3, 3));
    }

    #[test]
    fn test_set_shape_is_immutable_with_matrices() {
        let registry = ShapeRegistry::Set(Shape::new(3, 3).unwrap());

        assert_eq!(registry.propose(Shape::new(3, 3).unwrap(), true), Ok(registry));
        assert_eq!(
            registry.propose(Shape::new(3, 4).unwrap(), true),
            Err(CoreError::IncompatibleShape)
        );
        // Without matrices the shape may still move
        assert_eq!(
            registry.propose(Shape::new(3, 4).unwrap(), false),
            Ok(ShapeRegistry::Set(Shape::new(3, 4).unwrap()))
        );
    }

    #[test]
    fn test_matrix_and_lookup_checks() {
        let registry = ShapeRegistry::Set(Shape::new(3, 3).unwrap());
        assert_eq!(registry.check_matrix_dims(&[3, 3]), Ok(()));
        assert_eq!(registry.check_matrix_dims(&[3, 3, 5]), Ok(()));
        assert_eq!(
            registry.check_matrix_dims(&[3, 4]),
            Err(CoreError::IncompatibleShape)
        );
        assert_eq!(registry.check_matrix_dims(&[3]), Err(CoreError::IncompatibleShape));

        assert_eq!(registry.check_lookup_len(3), Ok(()));
        assert_eq!(registry.check_lookup_len(2), Err(CoreError::IncompatibleShape));
        assert_eq!(
            ShapeRegistry::Unset.check_lookup_len(3),
            Err(CoreError::ShapeUnset)
        );
    }
}
