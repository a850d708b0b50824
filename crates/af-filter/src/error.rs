//! Error types for filter management

use af_core::error::IndexError;
use af_core::types::FilterId;

use crate::filter::DownloadState;

/// Error type for filter-set operations.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("unknown filter {0}")]
    UnknownFilter(FilterId),
    #[error("no stored data for filter {0}")]
    MissingData(FilterId),
    #[error("failed to index filter {id}: {source}")]
    Index {
        id: FilterId,
        #[source]
        source: IndexError,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// A download event that does not apply to the filter's current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("filter {id}: cannot apply {event} while {from:?}")]
pub struct TransitionError {
    pub id: FilterId,
    pub from: DownloadState,
    pub event: &'static str,
}
