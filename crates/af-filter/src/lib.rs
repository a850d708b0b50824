//! Filter subscriptions and the adfilter engine
//!
//! This crate owns everything that changes at runtime: subscribed filters and
//! their download state, the stored list data, and the active filter set that
//! queries read. [`AdFilter`] is the entry point for host integrations.

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod manager;
pub mod store;

pub use config::{EngineConfig, FilterConfig, DEFAULT_BRIDGE_NAME};
pub use engine::AdFilter;
pub use error::{FilterError, TransitionError};
pub use filter::{DownloadEvent, DownloadState, Filter};
pub use manager::{FilterListener, FilterSetManager, CUSTOM_FILTER_ID};
pub use store::{FilterStore, MemoryStore};
