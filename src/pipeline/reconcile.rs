// src/pipeline/reconcile.rs

//! Removal-delta computation between the store and the latest extraction.
//!
//! The upstream portal never truly deletes records, and the active listing
//! omits archived entries, so local removal is a deliberate policy decision:
//! only ids already persisted and absent from the current active listing are
//! candidates, and the delta is applied on a coarser cadence than the sync
//! cycle.

use crate::models::Circular;

/// Ids scheduled for deletion, one domain per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSet {
    pub circulars: Vec<u64>,
    pub attachments: Vec<u64>,
}

impl RemovalSet {
    pub fn is_empty(&self) -> bool {
        self.circulars.is_empty() && self.attachments.is_empty()
    }
}

/// Persisted ids absent from the current extraction.
///
/// Both collections are sorted descending and membership is tested with a
/// binary search over the current ids, avoiding an auxiliary hash structure.
/// An empty `current` yields every persisted id.
pub fn removal_candidates(persisted: &[u64], current: &[u64]) -> Vec<u64> {
    let mut persisted = persisted.to_vec();
    persisted.sort_unstable_by(|a, b| b.cmp(a));

    let mut current = current.to_vec();
    current.sort_unstable_by(|a, b| b.cmp(a));

    persisted
        .into_iter()
        .filter(|id| current.binary_search_by(|probe| id.cmp(probe)).is_err())
        .collect()
}

/// Compute the removal delta for the current extraction, independently for
/// circular and attachment identifiers.
pub fn removal_set(
    circulars: &[Circular],
    persisted_circulars: &[u64],
    persisted_attachments: &[u64],
) -> RemovalSet {
    let current_circulars: Vec<u64> = circulars.iter().map(|c| c.id).collect();
    let current_attachments: Vec<u64> = circulars
        .iter()
        .flat_map(|c| c.attachments.iter().map(|a| a.id))
        .collect();

    RemovalSet {
        circulars: removal_candidates(persisted_circulars, &current_circulars),
        attachments: removal_candidates(persisted_attachments, &current_attachments),
    }
}
