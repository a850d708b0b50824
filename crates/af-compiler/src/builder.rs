use std::collections::HashMap;

use af_core::error::IndexError;
use af_core::index::{IndexParts, NetworkFilter, RuleIndex};
use af_core::pattern::{AnchorType, Pattern};
use af_core::rule::Rule;
use af_core::types::{RuleFlags, RuleKind};

use crate::optimizer::{optimize_rules, OptimizeStats};
use crate::parser::parse_filter_list;

/// Counters from compiling one filter list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub lines: usize,
    pub comments: usize,
    pub malformed: usize,
    pub optimize: OptimizeStats,
    pub network_rules: usize,
    pub hide_rules: usize,
    pub style_rules: usize,
    pub buckets: usize,
    pub fallback_rules: usize,
}

/// Parse, optimize and index a filter list.
pub fn compile_filter_list(text: &str) -> Result<(RuleIndex, CompileStats), IndexError> {
    let parsed = parse_filter_list(text);
    let comments = parsed.comments;
    let malformed = parsed.malformed.len();
    let lines = parsed.rules.len() + comments + malformed;

    let mut rules = parsed.rules;
    let optimize = optimize_rules(&mut rules);

    let mut hide_rules = 0usize;
    let mut style_rules = 0usize;
    for rule in &rules {
        match rule.kind {
            RuleKind::ElementHide | RuleKind::ElementHideException => hide_rules += 1,
            RuleKind::StyleInject | RuleKind::StyleInjectException => style_rules += 1,
            RuleKind::Block | RuleKind::Exception => {}
        }
    }

    let index = build_index(rules)?;
    let stats = CompileStats {
        lines,
        comments,
        malformed,
        optimize,
        network_rules: index.network_count(),
        hide_rules,
        style_rules,
        buckets: index.bucket_count(),
        fallback_rules: index.fallback_count(),
    };

    if malformed > 0 {
        log::debug!("dropped {malformed} malformed lines out of {lines}");
    }
    log::debug!(
        "compiled {} rules into {} buckets ({} in fallback)",
        index.rule_count(),
        stats.buckets,
        stats.fallback_rules
    );

    Ok((index, stats))
}

/// Index parsed rules. Rule ids are positions in `rules`.
pub fn build_index(rules: Vec<Rule>) -> Result<RuleIndex, IndexError> {
    let mut parts = IndexParts::default();
    let mut bucket_ids: HashMap<String, u32> = HashMap::new();

    for (id, rule) in rules.iter().enumerate() {
        let id = id as u32;
        match rule.kind {
            RuleKind::Block | RuleKind::Exception => {
                let pattern = compile_pattern(rule);
                let key = pattern.literal_key();
                let network_id = parts.network.len() as u32;
                parts.network.push(NetworkFilter {
                    rule: id,
                    pattern,
                    key_len: key.as_ref().map_or(0, String::len),
                });

                if rule.flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE) {
                    parts.hide_disablers.push(network_id);
                }
                if rule.type_mask.is_empty() {
                    continue;
                }

                match key {
                    Some(key) => {
                        let bucket = match bucket_ids.get(&key) {
                            Some(&bucket) => bucket,
                            None => {
                                let bucket = parts.bucket_keys.len() as u32;
                                parts.bucket_keys.push(key.clone());
                                parts.buckets.push(Vec::new());
                                bucket_ids.insert(key, bucket);
                                bucket
                            }
                        };
                        parts.buckets[bucket as usize].push(network_id);
                    }
                    None => parts.fallback.push(network_id),
                }
            }
            RuleKind::ElementHide => parts.hide.insert(id, rule),
            RuleKind::ElementHideException => parts.hide_exceptions.insert(id, rule),
            RuleKind::StyleInject => parts.styles.insert(id, rule),
            RuleKind::StyleInjectException => parts.style_exceptions.insert(id, rule),
        }
    }

    parts.rules = rules;
    RuleIndex::from_parts(parts)
}

fn compile_pattern(rule: &Rule) -> Pattern {
    let anchor = if rule.flags.contains(RuleFlags::HAS_HOST_ANCHOR) {
        AnchorType::Hostname
    } else if rule.flags.contains(RuleFlags::HAS_LEFT_ANCHOR) {
        AnchorType::Left
    } else {
        AnchorType::None
    };
    Pattern::compile(
        &rule.pattern,
        anchor,
        rule.flags.contains(RuleFlags::HAS_RIGHT_ANCHOR),
        rule.flags.contains(RuleFlags::MATCH_CASE),
    )
}
