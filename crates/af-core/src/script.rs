//! JavaScript templates for the WebView injection path
//!
//! Templates use `{{NAME}}` placeholders. Rendering is a pure substitution
//! step; unknown placeholders are left untouched.

use crate::hash::hash64;

pub const ELEMENT_HIDING_TEMPLATE: &str = include_str!("../js/element_hiding.js");
pub const ELEMHIDE_BLOCKED_TEMPLATE: &str = include_str!("../js/elemhide_blocked.js");

/// Substitute `{{KEY}}` placeholders.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}", key = key), value);
    }
    out
}

/// Placeholder values shared by both templates.
#[derive(Debug, Clone)]
pub struct ScriptVars {
    /// Name of the JavaScript bridge object exposed by the host
    pub bridge: String,
    /// Document property marking that hiding already ran
    pub hidden_flag: String,
    /// Prefix for debug statements: empty to keep them, `//` to comment them out
    pub debug: &'static str,
}

impl ScriptVars {
    pub fn new(bridge: &str, debug: bool) -> Self {
        Self {
            bridge: bridge.to_string(),
            hidden_flag: format!("af_hidden_{}", &hash64(bridge.as_bytes()).to_hex()[..8]),
            debug: if debug { "" } else { "//" },
        }
    }

    pub fn render(&self, template: &str) -> String {
        render(
            template,
            &[
                ("BRIDGE", &self.bridge),
                ("HIDDEN_FLAG", &self.hidden_flag),
                ("DEBUG", self.debug),
            ],
        )
    }
}
