//! Identifier-to-position resolution
//!
//! A lookup maps positions to identifiers. Resolution runs the other way:
//! each query value is assigned the position of the smallest identifier
//! that is greater than or equal to it (`min{ i : L[i] >= v }`), clamped to
//! the last position when the value exceeds every identifier. A query equal
//! to an identifier therefore resolves to exactly that identifier's position.
//!
//! Sorted lookups without duplicates are searched directly. Any other lookup
//! is searched through a sorting permutation, which is only possible when its
//! identifiers are unique; duplicates make positions ambiguous and fail with
//! [`CoreError::NonUniqueLookup`].

use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::{CoreError, LookupKey, Result};

/// Whether `labels` is strictly increasing
pub fn is_sorted_and_unique<T: LookupKey>(labels: &[T]) -> bool {
    labels
        .windows(2)
        .all(|pair| pair[0].key_cmp(&pair[1]) == Ordering::Less)
}

/// Prepared search over one lookup
#[derive(Debug, Clone)]
pub enum Resolver<'a, T> {
    /// Identifiers already strictly increasing
    Direct(&'a [T]),
    /// Identifiers in arbitrary order; `order[k]` is the original position
    /// of the k-th smallest identifier
    Permuted { labels: &'a [T], order: Vec<usize> },
}

impl<'a, T: LookupKey> Resolver<'a, T> {
    /// Prepare resolution against `labels`
    pub fn new(labels: &'a [T]) -> Result<Self> {
        if labels.is_empty() {
            return Err(CoreError::EmptyLookup);
        }
        if is_sorted_and_unique(labels) {
            return Ok(Resolver::Direct(labels));
        }

        let mut order: Vec<usize> = (0..labels.len()).collect();
        order.sort_unstable_by(|&a, &b| labels[a].key_cmp(&labels[b]));

        // Fewer distinct values than entries means duplicates
        if order
            .windows(2)
            .any(|pair| labels[pair[0]].key_cmp(&labels[pair[1]]) == Ordering::Equal)
        {
            return Err(CoreError::NonUniqueLookup);
        }

        Ok(Resolver::Permuted { labels, order })
    }

    /// Number of identifiers in the lookup
    pub fn len(&self) -> usize {
        match self {
            Resolver::Direct(labels) => labels.len(),
            Resolver::Permuted { order, .. } => order.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the direct path is used
    pub fn is_direct(&self) -> bool {
        matches!(self, Resolver::Direct(_))
    }

    /// Position of a single query value
    pub fn position(&self, value: &T) -> usize {
        match self {
            Resolver::Direct(labels) => {
                let pos = labels.partition_point(|label| label.key_cmp(value) == Ordering::Less);
                pos.min(labels.len() - 1)
            }
            Resolver::Permuted { labels, order } => {
                let pos = order
                    .partition_point(|&i| labels[i].key_cmp(value) == Ordering::Less)
                    .min(order.len() - 1);
                order[pos]
            }
        }
    }

    /// Positions of every query value, in input order
    pub fn resolve_all(&self, queries: &[T]) -> Vec<usize> {
        queries.iter().map(|value| self.position(value)).collect()
    }
}

/// Resolve `queries` against `labels` in one call
pub fn resolve_indices<T: LookupKey>(labels: &[T], queries: &[T]) -> Result<Vec<usize>> {
    Ok(Resolver::new(labels)?.resolve_all(queries))
}
