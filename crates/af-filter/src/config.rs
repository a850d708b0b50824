//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Settings the host app hands to [`AdFilter`](crate::AdFilter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Global switch; when off nothing is loaded
    pub filtering_enabled: bool,
    pub filters: Vec<FilterConfig>,
    /// User rules, one per entry
    pub custom_rules: Vec<String>,
    /// Name of the JavaScript bridge object the scripts call into
    pub bridge_name: String,
    /// Emit console logging from injected scripts
    pub debug_scripts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            filtering_enabled: true,
            filters: Vec::new(),
            custom_rules: Vec::new(),
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
            debug_scripts: false,
        }
    }
}

pub const DEFAULT_BRIDGE_NAME: &str = "AdFilterBridge";

/// A subscription as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, FilterError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, FilterError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
