//! Error types for the matching core

/// Error type for assembling a [`RuleIndex`](crate::index::RuleIndex).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("bucket table mismatch: {keys} keys for {buckets} buckets")]
    BucketMismatch { keys: usize, buckets: usize },
    #[error("rule reference out of range: {0}")]
    RuleOutOfRange(u32),
    #[error("failed to build substring automaton: {0}")]
    Automaton(#[from] aho_corasick::BuildError),
}

/// Error type for element-hiding script generation.
#[derive(Debug, thiserror::Error)]
pub enum HidingError {
    #[error("unparseable url {url:?}: {source}")]
    UnparseableUrl {
        url: String,
        #[source]
        source: ::url::ParseError,
    },
    #[error("url has no hierarchical path: {0:?}")]
    NoPath(String),
}
