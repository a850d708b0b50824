//! The aggregate view queried by the engines
//!
//! An [`ActiveFilterSet`] is an immutable overlay of every loaded filter's
//! index. Writers build a new set and publish it whole; readers hold a
//! reference for the duration of one query.

use std::sync::Arc;

use crate::index::RuleIndex;
use crate::psl::PublicSuffixes;
use crate::types::FilterId;

/// One filter's contribution to the active set.
#[derive(Debug, Clone)]
pub struct LoadedFilter {
    pub id: FilterId,
    pub index: Arc<RuleIndex>,
    /// User-authored rules; their selectors form the custom stylesheet group.
    pub custom: bool,
}

/// Immutable aggregate of all loaded filter indices.
#[derive(Debug, Clone, Default)]
pub struct ActiveFilterSet {
    filters: Vec<LoadedFilter>,
    psl: Arc<PublicSuffixes>,
}

impl ActiveFilterSet {
    pub fn new(filters: Vec<LoadedFilter>, psl: Arc<PublicSuffixes>) -> Self {
        Self { filters, psl }
    }

    /// A set with nothing loaded.
    pub fn empty(psl: Arc<PublicSuffixes>) -> Self {
        Self::new(Vec::new(), psl)
    }

    /// Loaded filters in precedence order (earlier wins ties).
    pub fn filters(&self) -> &[LoadedFilter] {
        &self.filters
    }

    pub fn psl(&self) -> &PublicSuffixes {
        &self.psl
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn contains(&self, id: &FilterId) -> bool {
        self.filters.iter().any(|f| &f.id == id)
    }

    /// Total number of rules across all loaded filters.
    pub fn rule_count(&self) -> usize {
        self.filters.iter().map(|f| f.index.rule_count()).sum()
    }
}
