//! Storage seam for fetched filter data
//!
//! The persistent store lives outside this crate; the manager only needs to
//! save what a download produced and read it back when loading a filter.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use af_core::types::FilterId;

/// Raw filter-list data keyed by filter.
pub trait FilterStore: Send + Sync {
    fn save(&self, id: &FilterId, data: &[u8]);
    fn load(&self, id: &FilterId) -> Option<Arc<[u8]>>;
    fn remove(&self, id: &FilterId);

    fn contains(&self, id: &FilterId) -> bool {
        self.load(id).is_some()
    }
}

/// In-process store, used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<FilterId, Arc<[u8]>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FilterStore for MemoryStore {
    fn save(&self, id: &FilterId, data: &[u8]) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::from(data));
    }

    fn load(&self, id: &FilterId) -> Option<Arc<[u8]>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn remove(&self, id: &FilterId) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}
