//! Core Matching Engine
//!
//! This is the hot path - every sub-resource request goes through here.
//! Only rules from buckets whose key occurs in the URL are verified.

use crate::filter_set::{ActiveFilterSet, LoadedFilter};
use crate::index::NetworkFilter;
use crate::rule::Rule;
use crate::types::{MatchDecision, MatchResult, MatchedRule, RequestContext, RequestType};
use crate::url::{get_host_position, parse_url};

// =============================================================================
// Matcher
// =============================================================================

/// The core matching engine over one filter-set snapshot.
pub struct Matcher<'a> {
    set: &'a ActiveFilterSet,
}

/// A verified rule hit, ranked for precedence.
#[derive(Clone, Copy)]
struct Hit<'s> {
    filter: &'s LoadedFilter,
    position: usize,
    rule: u32,
    key_len: usize,
}

impl Hit<'_> {
    /// Earlier filter, then earlier rule.
    fn order(&self) -> (usize, u32) {
        (self.position, self.rule)
    }

    fn into_matched(self) -> MatchedRule {
        MatchedRule {
            filter_id: self.filter.id.clone(),
            rule: self.filter.index.rule(self.rule).clone(),
        }
    }
}

impl<'a> Matcher<'a> {
    pub fn new(set: &'a ActiveFilterSet) -> Self {
        Self { set }
    }

    /// Classify a request by URL, document URL and resource type.
    ///
    /// An unparseable request URL is allowed. An unparseable document URL
    /// only disables domain- and party-restricted rules.
    pub fn classify(&self, url: &str, document_url: &str, request_type: RequestType) -> MatchResult {
        let parsed = match parse_url(url) {
            Some(parsed) => parsed,
            None => return MatchResult::allow(request_type),
        };
        let document = parse_url(document_url);

        let url = parsed.as_str();
        let url_lower = url.to_ascii_lowercase();
        let req_host = parsed.host_str().unwrap_or("");
        let site_host = document.as_ref().and_then(|d| d.host_str());
        let is_third_party = site_host.map(|site| self.set.psl().is_third_party(site, req_host));

        let ctx = RequestContext {
            url,
            url_lower: &url_lower,
            host_range: get_host_position(url),
            req_host,
            site_host,
            is_third_party,
            request_type,
        };
        self.match_request(&ctx)
    }

    /// Match a prepared request context and return the decision.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        let mut best_exception: Option<Hit<'_>> = None;
        let mut best_block: Option<Hit<'_>> = None;

        for (position, loaded) in self.set.filters().iter().enumerate() {
            for filter in loaded.index.network_candidates(ctx.url_lower) {
                let rule = loaded.index.rule(filter.rule);
                if !self.rule_matches(rule, filter, ctx) {
                    continue;
                }
                let hit = Hit {
                    filter: loaded,
                    position,
                    rule: filter.rule,
                    key_len: filter.key_len,
                };

                if rule.kind.is_exception() {
                    if best_exception.map_or(true, |b| hit.order() < b.order()) {
                        best_exception = Some(hit);
                    }
                } else if best_block.map_or(true, |b| outranks(&hit, &b)) {
                    best_block = Some(hit);
                }
            }
        }

        if let Some(hit) = best_exception {
            log::trace!("allowed {} by {}", ctx.url, hit.filter.index.rule(hit.rule).raw);
            return MatchResult {
                decision: MatchDecision::Allow,
                matched_rule: Some(hit.into_matched()),
                request_type: ctx.request_type,
            };
        }

        match best_block {
            Some(hit) => {
                log::trace!("blocked {} by {}", ctx.url, hit.filter.index.rule(hit.rule).raw);
                MatchResult {
                    decision: MatchDecision::Block,
                    matched_rule: Some(hit.into_matched()),
                    request_type: ctx.request_type,
                }
            }
            None => MatchResult::allow(ctx.request_type),
        }
    }

    #[inline]
    fn rule_matches(&self, rule: &Rule, filter: &NetworkFilter, ctx: &RequestContext<'_>) -> bool {
        rule.kind.is_network()
            && rule.type_mask.intersects(ctx.request_type)
            && rule.party_matches(ctx.is_third_party)
            && rule.domain_matches(ctx.site_host)
            && filter.pattern.matches(ctx.url, ctx.url_lower, ctx.host_range)
    }
}

/// Longer bucket key wins; ties go to the earlier rule.
fn outranks(hit: &Hit<'_>, best: &Hit<'_>) -> bool {
    hit.key_len > best.key_len || (hit.key_len == best.key_len && hit.order() < best.order())
}
