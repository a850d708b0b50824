//! The adfilter engine
//!
//! [`AdFilter`] wires configuration, the filter set manager and the rendered
//! element-hiding scripts together. Every query reads one snapshot of the
//! active set and holds no lock while matching.

use std::sync::Arc;

use af_core::elemhide::{ElementHiding, HidingResolver};
use af_core::error::HidingError;
use af_core::matcher::Matcher;
use af_core::psl::PublicSuffixes;
use af_core::types::{MatchResult, RequestType};

use crate::config::EngineConfig;
use crate::error::FilterError;
use crate::manager::FilterSetManager;
use crate::store::FilterStore;

pub struct AdFilter {
    manager: FilterSetManager,
    hiding: ElementHiding,
}

impl AdFilter {
    /// Build an engine with the built-in public suffix fallback.
    pub fn new(config: &EngineConfig, store: Arc<dyn FilterStore>) -> Result<Self, FilterError> {
        Self::with_public_suffixes(config, store, Arc::new(PublicSuffixes::default()))
    }

    pub fn with_public_suffixes(
        config: &EngineConfig,
        store: Arc<dyn FilterStore>,
        psl: Arc<PublicSuffixes>,
    ) -> Result<Self, FilterError> {
        let manager = FilterSetManager::new(store, psl);
        manager.set_filtering_enabled(config.filtering_enabled);

        for filter in &config.filters {
            let id = manager.add_filter(&filter.url, &filter.name);
            if !filter.enabled {
                manager.set_enabled(&id, false)?;
            }
        }
        if !config.custom_rules.is_empty() {
            manager.set_custom_rules(&config.custom_rules)?;
        }

        log::info!(
            "adfilter ready: {} filters, filtering {}",
            config.filters.len(),
            if config.filtering_enabled { "on" } else { "off" }
        );

        Ok(Self {
            manager,
            hiding: ElementHiding::new(&config.bridge_name, config.debug_scripts),
        })
    }

    pub fn manager(&self) -> &FilterSetManager {
        &self.manager
    }

    pub fn classify(&self, url: &str, document_url: &str, request_type: RequestType) -> MatchResult {
        let set = self.manager.snapshot();
        Matcher::new(&set).classify(url, document_url, request_type)
    }

    /// Whether the host should cancel this request. Main-frame navigations are
    /// never blocked.
    pub fn should_block(&self, url: &str, document_url: &str, request_type: RequestType) -> bool {
        if request_type.contains(RequestType::MAIN_FRAME) {
            return false;
        }
        self.classify(url, document_url, request_type).blocked()
    }

    pub fn hiding_style_sheet(&self, document_url: &str) -> Option<String> {
        let set = self.manager.snapshot();
        HidingResolver::new(&set).hiding_style_sheet(document_url)
    }

    pub fn css_rules(&self, document_url: &str) -> Vec<String> {
        let set = self.manager.snapshot();
        HidingResolver::new(&set).css_rules(document_url)
    }

    /// CSS injection rules for `document_url` as a JSON array of strings.
    pub fn css_rules_json(&self, document_url: &str) -> String {
        let rules = self.css_rules(document_url);
        serde_json::to_string(&rules).unwrap_or_else(|err| {
            log::warn!("failed to serialize css rules: {err}");
            "[]".to_string()
        })
    }

    pub fn element_hiding_script(&self, blocked_url: &str) -> Result<String, HidingError> {
        self.hiding.element_hiding_script(blocked_url)
    }

    pub fn page_script(&self) -> &str {
        self.hiding.page_script()
    }
}
