//! adfilter Core Library
//!
//! This crate provides the matching core for the adfilter content blocker.
//!
//! # Architecture
//!
//! Each filter list is compiled into an immutable [`RuleIndex`]. The indices
//! of all loaded lists form an [`ActiveFilterSet`], which is published whole
//! and queried without locks. Request classification only verifies rules
//! from buckets whose literal key occurs in the request URL.
//!
//! # Modules
//!
//! - `hash`: Murmur3 hashing for stable filter identifiers
//! - `psl`: Public Suffix List for eTLD+1 extraction
//! - `url`: URL parsing and host helpers
//! - `types`: Shared type definitions
//! - `rule`: Parsed filter rules and domain constraints
//! - `pattern`: Wildcard pattern programs
//! - `index`: Per-filter rule index
//! - `filter_set`: Aggregate of loaded indices
//! - `matcher`: Request matching engine
//! - `elemhide`: Element-hiding stylesheet and scripts
//! - `script`: JavaScript templates

pub mod elemhide;
pub mod error;
pub mod filter_set;
pub mod hash;
pub mod index;
pub mod matcher;
pub mod pattern;
pub mod psl;
pub mod rule;
pub mod script;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use elemhide::{ElementHiding, HidingResolver, HIDING_CSS};
pub use error::{HidingError, IndexError};
pub use filter_set::{ActiveFilterSet, LoadedFilter};
pub use hash::{hash64, Hash64};
pub use index::{IndexParts, RuleIndex};
pub use matcher::Matcher;
pub use psl::PublicSuffixes;
pub use rule::{DomainConstraint, Rule};
pub use types::{
    FilterId, MatchDecision, MatchResult, MatchedRule, PartyMask, RequestContext, RequestType,
    RuleFlags, RuleKind,
};
