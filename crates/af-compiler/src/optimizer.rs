use std::collections::HashSet;

use af_core::rule::Rule;
use af_core::types::{PartyMask, RequestType, RuleFlags, RuleKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Apply `$badfilter` cancellations and drop duplicate rules, keeping the
/// first occurrence of each.
pub fn optimize_rules(rules: &mut Vec<Rule>) -> OptimizeStats {
    let before = rules.len();
    let mut badfilter_keys: HashSet<RuleKey> = HashSet::new();
    let mut badfilter_rules = 0usize;

    for rule in rules.iter() {
        if rule.flags.contains(RuleFlags::BADFILTER) {
            badfilter_rules += 1;
            badfilter_keys.insert(RuleKey::from(rule));
        }
    }

    let mut badfiltered_rules = 0usize;
    rules.retain(|rule| {
        if rule.flags.contains(RuleFlags::BADFILTER) {
            return false;
        }
        if !badfilter_keys.is_empty() && badfilter_keys.contains(&RuleKey::from(rule)) {
            badfiltered_rules += 1;
            return false;
        }
        true
    });

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.insert(RuleKey::from(rule)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    let after = rules.len();
    if badfiltered_rules > 0 || deduped > 0 {
        log::debug!(
            "optimized {before} rules to {after}: {deduped} duplicates, {badfiltered_rules} cancelled by badfilter"
        );
    }

    OptimizeStats {
        before,
        after,
        deduped,
        badfilter_rules,
        badfiltered_rules,
    }
}

/// Identity of a rule ignoring its raw text, option order and `$badfilter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RuleKey {
    kind: RuleKind,
    flags: RuleFlags,
    pattern: String,
    type_mask: RequestType,
    party_mask: PartyMask,
    include: Vec<String>,
    exclude: Vec<String>,
    has_domains: bool,
}

impl From<&Rule> for RuleKey {
    fn from(rule: &Rule) -> Self {
        let (mut include, mut exclude) = match &rule.domains {
            Some(c) => (c.include.clone(), c.exclude.clone()),
            None => (Vec::new(), Vec::new()),
        };
        include.sort_unstable();
        include.dedup();
        exclude.sort_unstable();
        exclude.dedup();

        Self {
            kind: rule.kind,
            flags: rule.flags - RuleFlags::BADFILTER,
            pattern: rule.pattern.clone(),
            type_mask: rule.type_mask,
            party_mask: rule.party_mask,
            include,
            exclude,
            has_domains: rule.domains.is_some(),
        }
    }
}
