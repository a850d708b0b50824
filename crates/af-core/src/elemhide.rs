//! Element-Hiding Resolver
//!
//! Produces the stylesheet injected into a page and the script that hides a
//! single element whose resource was blocked.

use std::collections::HashSet;

use crate::error::HidingError;
use crate::filter_set::ActiveFilterSet;
use crate::index::{DomainBuckets, RuleIndex};
use crate::script::{ScriptVars, ELEMENT_HIDING_TEMPLATE, ELEMHIDE_BLOCKED_TEMPLATE};
use crate::types::RuleFlags;
use crate::url::{get_host_position, parse_url};

/// Declaration block appended to each selector group.
pub const HIDING_CSS: &str = "{display: none !important; visibility: hidden !important;}";

/// Name of the function the blocked-resource script calls.
pub const ELEMHIDE_FUNCTION: &str = "elemhideForSelector";

// =============================================================================
// Stylesheet Resolution
// =============================================================================

/// Resolves hiding CSS for documents against one filter-set snapshot.
pub struct HidingResolver<'a> {
    set: &'a ActiveFilterSet,
}

/// What `$elemhide` / `$generichide` exceptions switched off for a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HidingSwitches {
    elemhide_disabled: bool,
    generichide_disabled: bool,
}

/// A parsed document URL.
struct Document {
    url: String,
    url_lower: String,
    host: Option<String>,
}

impl<'a> HidingResolver<'a> {
    pub fn new(set: &'a ActiveFilterSet) -> Self {
        Self { set }
    }

    /// CSS text to inject into `document_url`, or `None` when no selector applies.
    pub fn hiding_style_sheet(&self, document_url: &str) -> Option<String> {
        let document = Self::parse_document(document_url)?;
        let switches = self.switches(&document);
        if switches.elemhide_disabled {
            log::debug!("element hiding disabled for {}", document.url);
            return None;
        }

        let host = document.host.as_deref();
        let standard = self.selectors(host, switches, false);
        let custom = self.selectors(host, switches, true);
        if standard.is_empty() && custom.is_empty() {
            return None;
        }

        let mut css = String::new();
        for group in [&standard, &custom] {
            if !group.is_empty() {
                css.push_str(&group.join(", "));
                css.push_str(HIDING_CSS);
            }
        }
        for rule in self.styles(host, switches) {
            css.push_str(&rule);
        }
        Some(css)
    }

    /// Individual CSS injection rules (`#$#`) applying to `document_url`.
    pub fn css_rules(&self, document_url: &str) -> Vec<String> {
        let document = match Self::parse_document(document_url) {
            Some(document) => document,
            None => return Vec::new(),
        };
        let switches = self.switches(&document);
        if switches.elemhide_disabled {
            return Vec::new();
        }
        self.styles(document.host.as_deref(), switches)
    }

    fn parse_document(document_url: &str) -> Option<Document> {
        let parsed = parse_url(document_url)?;
        let url = parsed.as_str().to_string();
        Some(Document {
            url_lower: url.to_ascii_lowercase(),
            host: parsed.host_str().map(str::to_string),
            url,
        })
    }

    fn switches(&self, document: &Document) -> HidingSwitches {
        let host_range = get_host_position(&document.url);
        let host = document.host.as_deref();
        let mut switches = HidingSwitches::default();

        for loaded in self.set.filters() {
            for filter in loaded.index.hide_disablers() {
                let rule = loaded.index.rule(filter.rule);
                if !rule.domain_matches(host)
                    || !filter.pattern.matches(&document.url, &document.url_lower, host_range)
                {
                    continue;
                }
                switches.elemhide_disabled |= rule.flags.contains(RuleFlags::ELEMHIDE);
                switches.generichide_disabled |= rule.flags.contains(RuleFlags::GENERICHIDE);
            }
        }
        switches
    }

    /// Hiding selectors from standard or custom filters, minus exceptions.
    fn selectors(&self, host: Option<&str>, switches: HidingSwitches, custom: bool) -> Vec<String> {
        let exceptions = self.collect(host, RuleIndex::hide_exceptions, false, None);
        self.collect(host, RuleIndex::hide, switches.generichide_disabled, Some(custom))
            .into_iter()
            .filter(|selector| !exceptions.contains(selector))
            .collect()
    }

    fn styles(&self, host: Option<&str>, switches: HidingSwitches) -> Vec<String> {
        let exceptions = self.collect(host, RuleIndex::style_exceptions, false, None);
        self.collect(host, RuleIndex::styles, switches.generichide_disabled, None)
            .into_iter()
            .filter(|rule| !exceptions.contains(rule))
            .collect()
    }

    /// Distinct rule bodies from one bucket family, in filter then rule order.
    fn collect(
        &self,
        host: Option<&str>,
        buckets: fn(&RuleIndex) -> &DomainBuckets,
        skip_generic: bool,
        custom: Option<bool>,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        let filters = self
            .set
            .filters()
            .iter()
            .filter(|f| custom.map_or(true, |c| f.custom == c));
        for loaded in filters {
            for id in buckets(&loaded.index).candidates(host) {
                let rule = loaded.index.rule(id);
                if skip_generic && rule.is_generic() {
                    continue;
                }
                if !rule.domain_matches(host) {
                    continue;
                }
                if seen.insert(rule.pattern.as_str()) {
                    out.push(rule.pattern.clone());
                }
            }
        }
        out
    }
}

// =============================================================================
// Blocked Resource Hiding
// =============================================================================

/// Rendered injection scripts, built once per engine.
#[derive(Debug, Clone)]
pub struct ElementHiding {
    page_script: String,
    blocked_script: String,
}

impl ElementHiding {
    pub fn new(bridge_name: &str, debug: bool) -> Self {
        let vars = ScriptVars::new(bridge_name, debug);
        Self {
            page_script: vars.render(ELEMENT_HIDING_TEMPLATE),
            blocked_script: vars.render(ELEMHIDE_BLOCKED_TEMPLATE),
        }
    }

    /// Script that asks the bridge for the page stylesheet and injects it.
    pub fn page_script(&self) -> &str {
        &self.page_script
    }

    /// Script hiding elements that loaded `blocked_url`.
    ///
    /// Elements are first narrowed by a `src`/`srcset` suffix selector, since
    /// the page may reference the resource by a relative path; the script
    /// then compares absolute URLs.
    pub fn element_hiding_script(&self, blocked_url: &str) -> Result<String, HidingError> {
        let path = extract_path_with_query(blocked_url)?;
        let path = path.strip_prefix('/').unwrap_or(&path);
        log::debug!("hiding elements for blocked resource {blocked_url} by path {path}");

        let selector = blocked_resource_selector(path);
        let mut script = String::with_capacity(self.blocked_script.len() + 128);
        script.push_str(&self.blocked_script);
        script.push_str("\n\n");
        script.push_str(ELEMHIDE_FUNCTION);
        script.push_str("(\"");
        script.push_str(&escape_js_string(blocked_url));
        script.push_str("\", \"");
        script.push_str(&escape_js_string(&selector));
        script.push_str("\", 0)");
        Ok(script)
    }
}

/// Suffix selector matching `src` or `srcset` attributes ending in `path`.
///
/// `path` goes between single quotes without CSS escaping, so a `'` in it
/// yields an invalid selector and `querySelectorAll` throws in the page.
/// Escaping the script string later does not make the selector valid CSS.
pub fn blocked_resource_selector(path: &str) -> String {
    format!("[src$='{path}'], [srcset$='{path}']")
}

/// Path plus `?query` of an absolute URL.
pub fn extract_path_with_query(url: &str) -> Result<String, HidingError> {
    let parsed = ::url::Url::parse(url).map_err(|source| HidingError::UnparseableUrl {
        url: url.to_string(),
        source,
    })?;
    if parsed.cannot_be_a_base() {
        return Err(HidingError::NoPath(url.to_string()));
    }

    let mut out = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }
    Ok(out)
}

/// Escape text for embedding in a double- or single-quoted script string.
///
/// U+2028 and U+2029 pass through unchanged.
pub fn escape_js_string(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 8);
    for c in line.chars() {
        match c {
            '"' | '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    // Line separators are mapped onto themselves; this is a no-op kept as an
    // explicit step of the escaping contract.
    out.replace('\u{2028}', "\u{2028}").replace('\u{2029}', "\u{2029}")
}
