use std::net::IpAddr;

use af_core::pattern::AnchorType;
use af_core::rule::{DomainConstraint, Rule};
use af_core::types::{PartyMask, RequestType, RuleFlags, RuleKind};
use af_core::url::normalize_domain;

/// Why a line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("empty pattern")]
    EmptyPattern,
    #[error("empty selector")]
    EmptySelector,
    #[error("unbalanced selector")]
    UnbalancedSelector,
    #[error("invalid domain {0:?}")]
    InvalidDomain(String),
    #[error("unknown option {0:?}")]
    UnknownOption(String),
    #[error("option {0:?} is only valid on exception rules")]
    ExceptionOnlyOption(String),
    #[error("options exclude every {0}")]
    EmptyMask(&'static str),
    #[error("unsupported {0} rule")]
    Unsupported(&'static str),
}

/// Outcome of parsing one line of filter-list text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Rule(Rule),
    /// Comment, header or blank line
    Comment,
    Malformed(MalformedReason),
}

/// A dropped line and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: usize,
    pub reason: MalformedReason,
}

#[derive(Debug, Default)]
pub struct ParseOutput {
    pub rules: Vec<Rule>,
    pub comments: usize,
    pub malformed: Vec<MalformedLine>,
}

/// Parse a whole filter list. Malformed lines are skipped.
pub fn parse_filter_list(text: &str) -> ParseOutput {
    let mut output = ParseOutput::default();

    for (idx, raw_line) in text.lines().enumerate() {
        match parse_line(raw_line) {
            ParsedLine::Rule(rule) => output.rules.push(rule),
            ParsedLine::Comment => output.comments += 1,
            ParsedLine::Malformed(reason) => {
                log::debug!("skipping line {}: {reason}: {:?}", idx + 1, raw_line.trim());
                output.malformed.push(MalformedLine {
                    line: idx + 1,
                    reason,
                });
            }
        }
    }

    output
}

/// Parse one line of filter-list text.
pub fn parse_line(raw_line: &str) -> ParsedLine {
    let line = raw_line.trim();
    if line.is_empty() || is_comment_line(line) {
        return ParsedLine::Comment;
    }

    let result = match find_cosmetic_marker(line) {
        Some((pos, marker)) => parse_cosmetic_rule(line, pos, marker),
        None => parse_network_rule(line),
    };

    match result {
        Ok(Some(rule)) => ParsedLine::Rule(rule),
        Ok(None) => ParsedLine::Comment,
        Err(reason) => ParsedLine::Malformed(reason),
    }
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!')
        || line.starts_with('[')
        || line.starts_with("# ")
        || line.starts_with("#\t")
        || line.bytes().all(|b| b == b'#')
}

// =============================================================================
// Cosmetic Rules
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CosmeticMarker {
    Hide,
    HideException,
    Style,
    StyleException,
    Extended,
}

impl CosmeticMarker {
    /// Longer tokens first.
    const ALL: [(&'static str, CosmeticMarker); 6] = [
        ("#@$#", CosmeticMarker::StyleException),
        ("#@?#", CosmeticMarker::Extended),
        ("#$#", CosmeticMarker::Style),
        ("#@#", CosmeticMarker::HideException),
        ("#?#", CosmeticMarker::Extended),
        ("##", CosmeticMarker::Hide),
    ];

    fn token_len(self) -> usize {
        match self {
            Self::Hide => 2,
            Self::HideException | Self::Style | Self::Extended => 3,
            Self::StyleException => 4,
        }
    }
}

fn find_cosmetic_marker(line: &str) -> Option<(usize, CosmeticMarker)> {
    line.match_indices('#').find_map(|(pos, _)| {
        let rest = &line[pos..];
        CosmeticMarker::ALL
            .iter()
            .find(|(token, _)| rest.starts_with(*token))
            .map(|&(_, marker)| (pos, marker))
    })
}

fn parse_cosmetic_rule(
    line: &str,
    pos: usize,
    marker: CosmeticMarker,
) -> Result<Option<Rule>, MalformedReason> {
    let kind = match marker {
        CosmeticMarker::Hide => RuleKind::ElementHide,
        CosmeticMarker::HideException => RuleKind::ElementHideException,
        CosmeticMarker::Style => RuleKind::StyleInject,
        CosmeticMarker::StyleException => RuleKind::StyleInjectException,
        CosmeticMarker::Extended => return Err(MalformedReason::Unsupported("extended css")),
    };

    let domains = parse_cosmetic_domains(&line[..pos])?;
    let body = line[pos + marker.token_len()..].trim();
    if body.is_empty() {
        return Err(MalformedReason::EmptySelector);
    }
    if !is_balanced(body) {
        return Err(MalformedReason::UnbalancedSelector);
    }

    let is_style = matches!(kind, RuleKind::StyleInject | RuleKind::StyleInjectException);
    let has_braces = body.contains('{') || body.contains('}');
    if is_style {
        // `selector { declarations }`
        let open = body.find('{');
        if open.map_or(true, |i| i == 0) || !body.ends_with('}') {
            return Err(MalformedReason::UnbalancedSelector);
        }
    } else if has_braces {
        return Err(MalformedReason::UnbalancedSelector);
    }

    Ok(Some(Rule {
        raw: line.to_string(),
        kind,
        flags: RuleFlags::empty(),
        pattern: body.to_string(),
        type_mask: RequestType::empty(),
        party_mask: PartyMask::ALL,
        domains,
    }))
}

fn parse_cosmetic_domains(prefix: &str) -> Result<Option<DomainConstraint>, MalformedReason> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Ok(None);
    }
    parse_domain_list(prefix, ',').map(Some)
}

/// Brackets, parentheses, braces and quotes must pair up.
fn is_balanced(text: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }

    quote.is_none() && stack.is_empty()
}

// =============================================================================
// Network Rules
// =============================================================================

fn parse_network_rule(line: &str) -> Result<Option<Rule>, MalformedReason> {
    if let Some(host) = parse_hosts_file_line(line) {
        return Ok(host.map(|domain| host_block_rule(line, domain)));
    }

    let (kind, rest) = match line.strip_prefix("@@") {
        Some(rest) => (RuleKind::Exception, rest.trim_start()),
        None => (RuleKind::Block, line),
    };

    let (pattern_part, options_text) = split_rule_options(rest);
    let options = match options_text {
        Some(text) => parse_options(text, kind)?,
        None => ParsedOptions::default(),
    };

    let pattern_str = pattern_part.trim();
    if is_regex_pattern(pattern_str) {
        return Err(MalformedReason::Unsupported("regex"));
    }

    let (anchor, body) = if let Some(rest) = pattern_str.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = pattern_str.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, pattern_str)
    };
    let (body, anchor_end) = match body.strip_suffix('|') {
        Some(body) => (body, true),
        None => (body, false),
    };

    let mut flags = options.flags;
    match anchor {
        AnchorType::Hostname => flags |= RuleFlags::HAS_HOST_ANCHOR,
        AnchorType::Left => flags |= RuleFlags::HAS_LEFT_ANCHOR,
        AnchorType::None => {}
    }
    if anchor_end {
        flags |= RuleFlags::HAS_RIGHT_ANCHOR;
    }

    let body = if body.is_empty() {
        if anchor != AnchorType::None || anchor_end || options_text.is_none() {
            return Err(MalformedReason::EmptyPattern);
        }
        "*".to_string()
    } else if anchor == AnchorType::Hostname {
        normalize_pattern_host(body)?
    } else {
        body.to_string()
    };

    Ok(Some(Rule {
        raw: line.to_string(),
        kind,
        flags,
        pattern: body,
        type_mask: options.type_mask,
        party_mask: options.party_mask,
        domains: options.domains,
    }))
}

/// `Some(None)` for hosts-file lines that name a local alias.
fn parse_hosts_file_line(line: &str) -> Option<Option<String>> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;
    first.parse::<IpAddr>().ok()?;

    if matches!(
        second,
        "localhost" | "localhost.localdomain" | "local" | "broadcasthost" | "ip6-localhost"
            | "ip6-loopback" | "0.0.0.0"
    ) {
        return Some(None);
    }
    Some(normalize_domain(second))
}

fn host_block_rule(line: &str, domain: String) -> Rule {
    Rule {
        raw: line.to_string(),
        kind: RuleKind::Block,
        flags: RuleFlags::HAS_HOST_ANCHOR,
        pattern: format!("{domain}^"),
        type_mask: RequestType::ALL,
        party_mask: PartyMask::ALL,
        domains: None,
    }
}

fn is_regex_pattern(pattern: &str) -> bool {
    pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/')
}

/// Options start at the last `$`.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.rfind('$') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

/// Punycode the host part of a `||` pattern.
fn normalize_pattern_host(body: &str) -> Result<String, MalformedReason> {
    let end = body
        .find(|c: char| matches!(c, '/' | '^' | '*' | '?' | '|' | ':' | '#'))
        .unwrap_or(body.len());
    let (host, rest) = body.split_at(end);
    if host.is_ascii() {
        return Ok(body.to_string());
    }
    let host = normalize_domain(host).ok_or_else(|| MalformedReason::InvalidDomain(host.to_string()))?;
    Ok(format!("{host}{rest}"))
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone)]
struct ParsedOptions {
    flags: RuleFlags,
    type_mask: RequestType,
    party_mask: PartyMask,
    domains: Option<DomainConstraint>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            type_mask: RequestType::ALL,
            party_mask: PartyMask::ALL,
            domains: None,
        }
    }
}

fn parse_options(text: &str, kind: RuleKind) -> Result<ParsedOptions, MalformedReason> {
    let mut flags = RuleFlags::empty();
    let mut type_include = RequestType::empty();
    let mut type_exclude = RequestType::empty();
    let mut party_include = PartyMask::empty();
    let mut party_exclude = PartyMask::empty();
    let mut domains: Option<DomainConstraint> = None;

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if let Some(value) = raw_lower.strip_prefix("domain=") {
            let parsed = parse_domain_list(value, '|')?;
            domains = Some(merge_constraints(domains, parsed));
            continue;
        }

        match raw_lower {
            "important" => {
                flags |= RuleFlags::IMPORTANT;
                continue;
            }
            "match-case" | "match_case" => {
                flags |= RuleFlags::MATCH_CASE;
                continue;
            }
            "badfilter" => {
                flags |= RuleFlags::BADFILTER;
                continue;
            }
            "elemhide" | "ehide" | "generichide" | "ghide" => {
                if kind != RuleKind::Exception {
                    return Err(MalformedReason::ExceptionOnlyOption(raw.to_string()));
                }
                flags |= if raw_lower.starts_with('e') {
                    RuleFlags::ELEMHIDE
                } else {
                    RuleFlags::GENERICHIDE
                };
                continue;
            }
            _ => {}
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        if let Some(mask) = request_type_mask(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            // `~third-party` is first-party and vice versa
            if negated {
                party_exclude |= mask;
            } else {
                party_include |= mask;
            }
            continue;
        }

        return Err(MalformedReason::UnknownOption(raw.to_string()));
    }

    let hide_switch = flags.intersects(RuleFlags::ELEMHIDE | RuleFlags::GENERICHIDE);
    let type_mask = if hide_switch && type_include.is_empty() && type_exclude.is_empty() {
        // Only toggles element hiding; never allows a request.
        RequestType::empty()
    } else {
        let base = if type_include.is_empty() { RequestType::ALL } else { type_include };
        let mask = base - type_exclude;
        if mask.is_empty() {
            return Err(MalformedReason::EmptyMask("request type"));
        }
        mask
    };

    let party_base = if party_include.is_empty() { PartyMask::ALL } else { party_include };
    let party_mask = party_base - party_exclude;
    if party_mask.is_empty() {
        return Err(MalformedReason::EmptyMask("party"));
    }

    Ok(ParsedOptions {
        flags,
        type_mask,
        party_mask,
        domains,
    })
}

fn merge_constraints(existing: Option<DomainConstraint>, incoming: DomainConstraint) -> DomainConstraint {
    match existing {
        Some(mut current) => {
            current.include.extend(incoming.include);
            current.exclude.extend(incoming.exclude);
            current
        }
        None => incoming,
    }
}

/// Parse `a.com|~b.a.com` (network) or `a.com,~b.a.com` (cosmetic).
fn parse_domain_list(value: &str, separator: char) -> Result<DomainConstraint, MalformedReason> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for raw in value.split(separator) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw)
            .ok_or_else(|| MalformedReason::InvalidDomain(domain_raw.to_string()))?;
        if is_exclude {
            exclude.push(domain);
        } else {
            include.push(domain);
        }
    }

    if include.is_empty() && exclude.is_empty() {
        return Err(MalformedReason::InvalidDomain(value.to_string()));
    }

    Ok(DomainConstraint { include, exclude })
}

fn request_type_mask(name: &str) -> Option<RequestType> {
    match name {
        "script" => Some(RequestType::SCRIPT),
        "image" => Some(RequestType::IMAGE),
        "stylesheet" | "css" => Some(RequestType::STYLESHEET),
        "object" | "object-subrequest" => Some(RequestType::OBJECT),
        "subdocument" | "frame" => Some(RequestType::SUBDOCUMENT),
        "document" | "doc" => Some(RequestType::MAIN_FRAME),
        "xmlhttprequest" | "xhr" => Some(RequestType::XMLHTTPREQUEST),
        "media" => Some(RequestType::MEDIA),
        "font" => Some(RequestType::FONT),
        "ping" => Some(RequestType::PING),
        "websocket" => Some(RequestType::WEBSOCKET),
        "other" => Some(RequestType::OTHER),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<PartyMask> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(line: &str) -> Rule {
        match parse_line(line) {
            ParsedLine::Rule(rule) => rule,
            other => panic!("expected a rule for {line:?}, got {other:?}"),
        }
    }

    fn malformed(line: &str) -> MalformedReason {
        match parse_line(line) {
            ParsedLine::Malformed(reason) => reason,
            other => panic!("expected {line:?} to be malformed, got {other:?}"),
        }
    }

    #[test]
    fn comments_and_headers() {
        for line in ["", "   ", "! Title: EasyList", "[Adblock Plus 2.0]", "# hosts comment", "####"] {
            assert_eq!(parse_line(line), ParsedLine::Comment, "{line:?}");
        }
    }

    #[test]
    fn hostname_anchor_with_options() {
        let r = rule("||ads.example.com^$image,third-party");
        assert_eq!(r.kind, RuleKind::Block);
        assert_eq!(r.pattern, "ads.example.com^");
        assert!(r.flags.contains(RuleFlags::HAS_HOST_ANCHOR));
        assert_eq!(r.type_mask, RequestType::IMAGE);
        assert_eq!(r.party_mask, PartyMask::THIRD_PARTY);
        assert!(r.third_party_only());
        assert_eq!(r.domains, None);
    }

    #[test]
    fn exception_and_anchors() {
        let r = rule("@@|https://cdn.example/ok.js|");
        assert_eq!(r.kind, RuleKind::Exception);
        assert_eq!(r.pattern, "https://cdn.example/ok.js");
        assert!(r.flags.contains(RuleFlags::HAS_LEFT_ANCHOR | RuleFlags::HAS_RIGHT_ANCHOR));
        assert_eq!(r.type_mask, RequestType::ALL);
    }

    #[test]
    fn negated_options() {
        let r = rule("/banner/*$~script,~third-party");
        assert_eq!(r.type_mask, RequestType::ALL - RequestType::SCRIPT);
        assert_eq!(r.party_mask, PartyMask::FIRST_PARTY);

        assert_eq!(malformed("/ads$script,~script"), MalformedReason::EmptyMask("request type"));
    }

    #[test]
    fn domain_option_normalizes() {
        let r = rule("/track.js$domain=Example.COM|~sub.example.com|bücher.de");
        let domains = r.domains.expect("domains");
        assert_eq!(domains.include, vec!["example.com", "xn--bcher-kva.de"]);
        assert_eq!(domains.exclude, vec!["sub.example.com"]);
    }

    #[test]
    fn options_split_at_last_dollar() {
        let r = rule("/path$with$dollar$script");
        assert_eq!(r.pattern, "/path$with$dollar");
        assert_eq!(r.type_mask, RequestType::SCRIPT);
    }

    #[test]
    fn empty_pattern_with_options_matches_everything() {
        let r = rule("$script,domain=example.com");
        assert_eq!(r.pattern, "*");
        assert_eq!(malformed("@@"), MalformedReason::EmptyPattern);
        assert_eq!(malformed("||$image"), MalformedReason::EmptyPattern);
    }

    #[test]
    fn hide_switches_only_on_exceptions() {
        let r = rule("@@||example.com^$elemhide");
        assert!(r.flags.contains(RuleFlags::ELEMHIDE));
        assert!(r.type_mask.is_empty());

        let r = rule("@@||example.com^$generichide");
        assert!(r.flags.contains(RuleFlags::GENERICHIDE));

        assert!(matches!(
            malformed("||example.com^$elemhide"),
            MalformedReason::ExceptionOnlyOption(_)
        ));
    }

    #[test]
    fn unknown_options_are_malformed() {
        assert_eq!(
            malformed("||ads.com^$redirect=noop.js"),
            MalformedReason::UnknownOption("redirect=noop.js".into())
        );
    }

    #[test]
    fn badfilter_and_important_are_recorded() {
        let r = rule("||ads.com^$badfilter");
        assert!(r.flags.contains(RuleFlags::BADFILTER));
        let r = rule("||ads.com^$important");
        assert!(r.flags.contains(RuleFlags::IMPORTANT));
    }

    #[test]
    fn hosts_file_lines() {
        let r = rule("0.0.0.0 ads.example.com");
        assert_eq!(r.kind, RuleKind::Block);
        assert_eq!(r.pattern, "ads.example.com^");
        assert!(r.flags.contains(RuleFlags::HAS_HOST_ANCHOR));

        assert_eq!(parse_line("127.0.0.1 localhost"), ParsedLine::Comment);
    }

    #[test]
    fn unicode_host_anchor_is_punycoded() {
        let r = rule("||bücher.de/ads^");
        assert_eq!(r.pattern, "xn--bcher-kva.de/ads^");
    }

    #[test]
    fn element_hiding_rules() {
        let r = rule("example.com,~shop.example.com##.banner-ad");
        assert_eq!(r.kind, RuleKind::ElementHide);
        assert_eq!(r.pattern, ".banner-ad");
        let domains = r.domains.expect("domains");
        assert_eq!(domains.include, vec!["example.com"]);
        assert_eq!(domains.exclude, vec!["shop.example.com"]);

        let r = rule("##div[id^=\"ad-\"]:has(> a)");
        assert_eq!(r.pattern, "div[id^=\"ad-\"]:has(> a)");
        assert!(r.is_generic());

        let r = rule("example.com#@#.banner-ad");
        assert_eq!(r.kind, RuleKind::ElementHideException);
    }

    #[test]
    fn css_injection_rules() {
        let r = rule("example.com#$#body { overflow: auto !important; }");
        assert_eq!(r.kind, RuleKind::StyleInject);
        assert_eq!(r.pattern, "body { overflow: auto !important; }");

        let r = rule("example.com#@$#body { overflow: auto !important; }");
        assert_eq!(r.kind, RuleKind::StyleInjectException);

        assert_eq!(malformed("example.com#$#body"), MalformedReason::UnbalancedSelector);
    }

    #[test]
    fn malformed_cosmetic_lines() {
        assert_eq!(malformed("example.com##"), MalformedReason::EmptySelector);
        assert_eq!(malformed("##div[class=\"ad\""), MalformedReason::UnbalancedSelector);
        assert_eq!(malformed("##.ad { color: red }"), MalformedReason::UnbalancedSelector);
        assert_eq!(malformed("##a:has(b"), MalformedReason::UnbalancedSelector);
        assert!(matches!(malformed("ex ample.com##.ad"), MalformedReason::InvalidDomain(_)));
        assert_eq!(malformed("example.com#?#.ad:-abp-contains(x)"), MalformedReason::Unsupported("extended css"));
    }

    #[test]
    fn regex_rules_are_skipped() {
        assert_eq!(malformed("/banner\\d+\\.png/"), MalformedReason::Unsupported("regex"));
        assert_eq!(malformed("/ads[0-9]/$script"), MalformedReason::Unsupported("regex"));
    }

    #[test]
    fn list_continues_past_bad_lines() {
        let text = "! comment\n||a.com^\nexample.com##\n||b.com^$bogus\n||c.com^\n";
        let out = parse_filter_list(text);
        assert_eq!(out.rules.len(), 2);
        assert_eq!(out.comments, 1);
        assert_eq!(out.malformed.len(), 2);
        assert_eq!(out.malformed[0].line, 3);
        assert_eq!(out.malformed[1].line, 4);
    }
}
