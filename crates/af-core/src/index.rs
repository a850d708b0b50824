//! Per-filter rule index
//!
//! A [`RuleIndex`] is immutable once assembled. Network rules are bucketed by
//! their longest literal; an Aho-Corasick automaton over the bucket keys finds
//! every bucket whose key occurs in a request URL, so only those rules (plus
//! the fallback bucket) are verified. Element-hiding and CSS rules are keyed
//! by the domains they include.

use std::collections::HashMap;
use std::sync::Arc;

use aho_corasick::AhoCorasick;

use crate::error::IndexError;
use crate::pattern::Pattern;
use crate::psl::host_suffixes;
use crate::rule::Rule;

/// A network rule together with its compiled pattern.
#[derive(Debug, Clone)]
pub struct NetworkFilter {
    /// Position of the rule in the owning index
    pub rule: u32,
    pub pattern: Pattern,
    /// Length of the bucket key the rule is filed under (0 for fallback)
    pub key_len: usize,
}

/// Rule ids keyed by included domain, plus a bucket for unrestricted rules.
#[derive(Debug, Clone, Default)]
pub struct DomainBuckets {
    by_domain: HashMap<String, Vec<u32>>,
    generic: Vec<u32>,
}

impl DomainBuckets {
    pub fn insert(&mut self, id: u32, rule: &Rule) {
        match &rule.domains {
            Some(constraint) if !constraint.include.is_empty() => {
                for domain in &constraint.include {
                    self.by_domain.entry(domain.clone()).or_default().push(id);
                }
            }
            _ => self.generic.push(id),
        }
    }

    /// Rule ids that may apply to `host`, in insertion order.
    ///
    /// Domain exclusions are not evaluated here.
    pub fn candidates(&self, host: Option<&str>) -> Vec<u32> {
        let mut ids = self.generic.clone();
        if let Some(host) = host {
            for suffix in host_suffixes(host) {
                if let Some(bucket) = self.by_domain.get(suffix) {
                    ids.extend_from_slice(bucket);
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.generic.is_empty() && self.by_domain.is_empty()
    }
}

/// Everything needed to assemble a [`RuleIndex`].
#[derive(Debug, Default)]
pub struct IndexParts {
    pub rules: Vec<Rule>,
    pub network: Vec<NetworkFilter>,
    /// One key per bucket, lowercase
    pub bucket_keys: Vec<String>,
    /// Indices into `network`, one list per key
    pub buckets: Vec<Vec<u32>>,
    /// Indices into `network` for rules without a usable key
    pub fallback: Vec<u32>,
    /// Indices into `network` for `$elemhide` / `$generichide` exceptions
    pub hide_disablers: Vec<u32>,
    pub hide: DomainBuckets,
    pub hide_exceptions: DomainBuckets,
    pub styles: DomainBuckets,
    pub style_exceptions: DomainBuckets,
}

/// Compiled, immutable index for one filter list.
#[derive(Debug)]
pub struct RuleIndex {
    rules: Vec<Arc<Rule>>,
    network: Vec<NetworkFilter>,
    automaton: Option<AhoCorasick>,
    buckets: Vec<Vec<u32>>,
    fallback: Vec<u32>,
    hide_disablers: Vec<u32>,
    hide: DomainBuckets,
    hide_exceptions: DomainBuckets,
    styles: DomainBuckets,
    style_exceptions: DomainBuckets,
}

impl RuleIndex {
    /// Assemble an index, building the substring automaton.
    pub fn from_parts(parts: IndexParts) -> Result<Self, IndexError> {
        if parts.bucket_keys.len() != parts.buckets.len() {
            return Err(IndexError::BucketMismatch {
                keys: parts.bucket_keys.len(),
                buckets: parts.buckets.len(),
            });
        }
        let rule_count = parts.rules.len();
        if let Some(filter) = parts.network.iter().find(|f| f.rule as usize >= rule_count) {
            return Err(IndexError::RuleOutOfRange(filter.rule));
        }
        let network_count = parts.network.len() as u32;
        let network_refs = parts
            .buckets
            .iter()
            .flatten()
            .chain(&parts.fallback)
            .chain(&parts.hide_disablers);
        for &id in network_refs {
            if id >= network_count {
                return Err(IndexError::RuleOutOfRange(id));
            }
        }

        let automaton = if parts.bucket_keys.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(&parts.bucket_keys)?)
        };

        Ok(Self {
            rules: parts.rules.into_iter().map(Arc::new).collect(),
            network: parts.network,
            automaton,
            buckets: parts.buckets,
            fallback: parts.fallback,
            hide_disablers: parts.hide_disablers,
            hide: parts.hide,
            hide_exceptions: parts.hide_exceptions,
            styles: parts.styles,
            style_exceptions: parts.style_exceptions,
        })
    }

    /// An index with no rules.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            network: Vec::new(),
            automaton: None,
            buckets: Vec::new(),
            fallback: Vec::new(),
            hide_disablers: Vec::new(),
            hide: DomainBuckets::default(),
            hide_exceptions: DomainBuckets::default(),
            styles: DomainBuckets::default(),
            style_exceptions: DomainBuckets::default(),
        }
    }

    #[inline]
    pub fn rule(&self, id: u32) -> &Arc<Rule> {
        &self.rules[id as usize]
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn network_count(&self) -> usize {
        self.network.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn fallback_count(&self) -> usize {
        self.fallback.len()
    }

    /// Network filters whose bucket key occurs in `url_lower`, plus the
    /// fallback bucket.
    pub fn network_candidates(&self, url_lower: &str) -> Vec<&NetworkFilter> {
        let mut hits: Vec<usize> = match &self.automaton {
            Some(ac) => ac
                .find_overlapping_iter(url_lower)
                .map(|m| m.pattern().as_usize())
                .collect(),
            None => Vec::new(),
        };
        hits.sort_unstable();
        hits.dedup();

        hits.into_iter()
            .flat_map(|bucket| self.buckets[bucket].iter())
            .chain(&self.fallback)
            .map(|&id| &self.network[id as usize])
            .collect()
    }

    /// Exceptions carrying `$elemhide` or `$generichide`.
    pub fn hide_disablers(&self) -> impl Iterator<Item = &NetworkFilter> {
        self.hide_disablers.iter().map(|&id| &self.network[id as usize])
    }

    pub fn hide(&self) -> &DomainBuckets {
        &self.hide
    }

    pub fn hide_exceptions(&self) -> &DomainBuckets {
        &self.hide_exceptions
    }

    pub fn styles(&self) -> &DomainBuckets {
        &self.styles
    }

    pub fn style_exceptions(&self) -> &DomainBuckets {
        &self.style_exceptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::AnchorType;
    use crate::rule::DomainConstraint;
    use crate::types::{PartyMask, RequestType, RuleFlags, RuleKind};

    fn block_rule(pattern: &str) -> Rule {
        Rule {
            raw: pattern.to_string(),
            kind: RuleKind::Block,
            flags: RuleFlags::empty(),
            pattern: pattern.to_string(),
            type_mask: RequestType::ALL,
            party_mask: PartyMask::ALL,
            domains: None,
        }
    }

    #[test]
    fn candidates_come_from_present_keys_only() {
        let rules = vec![block_rule("/banner/"), block_rule("/tracker.js"), block_rule("a*b")];
        let network = rules
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let pattern = Pattern::compile(&r.pattern, AnchorType::None, false, false);
                let key_len = pattern.literal_key().map_or(0, |k| k.len());
                NetworkFilter { rule: i as u32, pattern, key_len }
            })
            .collect();
        let index = RuleIndex::from_parts(IndexParts {
            rules,
            network,
            bucket_keys: vec!["/banner/".into(), "/tracker.js".into()],
            buckets: vec![vec![0], vec![1]],
            fallback: vec![2],
            ..IndexParts::default()
        })
        .expect("index should assemble");

        let found: Vec<u32> = index
            .network_candidates("http://x.com/banner/1.png")
            .iter()
            .map(|f| f.rule)
            .collect();
        assert_eq!(found, vec![0, 2]);
        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.fallback_count(), 1);
    }

    #[test]
    fn rejects_mismatched_parts() {
        let err = RuleIndex::from_parts(IndexParts {
            bucket_keys: vec!["abc".into()],
            ..IndexParts::default()
        })
        .unwrap_err();
        assert!(matches!(err, IndexError::BucketMismatch { keys: 1, buckets: 0 }));

        let err = RuleIndex::from_parts(IndexParts {
            fallback: vec![3],
            ..IndexParts::default()
        })
        .unwrap_err();
        assert!(matches!(err, IndexError::RuleOutOfRange(3)));
    }

    #[test]
    fn domain_buckets_walk_parents() {
        let mut buckets = DomainBuckets::default();
        let mut scoped = block_rule("x");
        scoped.domains = Some(DomainConstraint {
            include: vec!["example.com".into()],
            exclude: Vec::new(),
        });
        buckets.insert(0, &scoped);
        buckets.insert(1, &block_rule("y"));

        assert_eq!(buckets.candidates(Some("www.example.com")), vec![0, 1]);
        assert_eq!(buckets.candidates(Some("other.com")), vec![1]);
        assert_eq!(buckets.candidates(None), vec![1]);
        assert_eq!(buckets.candidates(Some("www.example.com.")), vec![0, 1]);

        let mut tld = block_rule("z");
        tld.domains = Some(DomainConstraint {
            include: vec!["com".into()],
            exclude: Vec::new(),
        });
        buckets.insert(2, &tld);
        assert_eq!(buckets.candidates(Some("other.com")), vec![1, 2]);
    }
}
