//! Public Suffix List (PSL) utilities for eTLD+1 extraction
//!
//! A [`PublicSuffixes`] value is built once from the text of a public suffix
//! list and shared by every snapshot. Without list data a small table of
//! common two-part suffixes is used.
//!
//! # Examples
//!
//! ```
//! use af_core::psl::PublicSuffixes;
//!
//! let psl = PublicSuffixes::default();
//! assert_eq!(psl.etld1("sub.example.com"), "example.com");
//! assert_eq!(psl.etld1("sub.example.co.uk"), "example.co.uk");
//! ```

use std::collections::HashSet;
use std::net::IpAddr;

/// Common two-part TLDs for fallback.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// PSL rule sets for suffix lookup.
#[derive(Debug, Default, Clone)]
pub struct PublicSuffixes {
    /// Exact rules (e.g., "com", "co.uk")
    exact: HashSet<String>,
    /// Wildcard rules ("*.ck" stored as "ck")
    wildcard: HashSet<String>,
    /// Exception rules ("!www.ck" stored as "www.ck")
    exception: HashSet<String>,
}

impl PublicSuffixes {
    /// Parse the text format published at publicsuffix.org.
    pub fn parse(text: &str) -> Self {
        let mut sets = Self::default();

        for line in text.lines() {
            let rule = match line.split_whitespace().next() {
                Some(rule) if !rule.starts_with("//") => rule.to_ascii_lowercase(),
                _ => continue,
            };

            if let Some(rest) = rule.strip_prefix('!') {
                sets.exception.insert(rest.to_string());
            } else if let Some(rest) = rule.strip_prefix("*.") {
                sets.wildcard.insert(rest.to_string());
            } else {
                sets.exact.insert(rule);
            }
        }

        log::debug!(
            "loaded public suffixes: {} exact, {} wildcard, {} exception",
            sets.exact.len(),
            sets.wildcard.len(),
            sets.exception.len()
        );
        sets
    }

    /// True when no list data was loaded.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty() && self.exception.is_empty()
    }

    /// Get the eTLD+1 (registrable domain) for a hostname.
    pub fn etld1<'a>(&self, host: &'a str) -> &'a str {
        let host = host.trim_end_matches('.');
        if host.is_empty() || is_ip_literal(host) {
            return host;
        }

        let labels: Vec<&str> = host.split('.').collect();
        let n = labels.len();
        if n <= 1 {
            return host;
        }

        let suffix_start = if self.is_empty() {
            fallback_suffix_start(&labels)
        } else {
            self.suffix_start(&labels)
        };

        match suffix_start {
            // The host is itself a public suffix.
            0 => host,
            start => tail(host, &labels, start - 1),
        }
    }

    /// Index of the first label of the public suffix.
    fn suffix_start(&self, labels: &[&str]) -> usize {
        let n = labels.len();
        for i in 0..n {
            let suffix = labels[i..].join(".");

            // Exception rules override wildcards
            if self.exception.contains(&suffix) {
                return i + 1;
            }
            if self.exact.contains(&suffix) {
                return i;
            }
            if i + 1 < n && self.wildcard.contains(&labels[i + 1..].join(".")) {
                return i;
            }
        }
        // Unknown TLDs act as a one-label suffix.
        n - 1
    }

    /// Check if a request is third-party relative to the document host.
    pub fn is_third_party(&self, site_host: &str, req_host: &str) -> bool {
        !self
            .etld1(site_host)
            .eq_ignore_ascii_case(self.etld1(req_host))
    }
}

fn fallback_suffix_start(labels: &[&str]) -> usize {
    let n = labels.len();
    if n >= 2 {
        let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
        if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
            return n - 2;
        }
    }
    n - 1
}

/// Slice of `host` starting at label `index`.
fn tail<'a>(host: &'a str, labels: &[&str], index: usize) -> &'a str {
    let skipped: usize = labels[..index].iter().map(|l| l.len() + 1).sum();
    &host[skipped..]
}

fn is_ip_literal(host: &str) -> bool {
    host.starts_with('[') || host.parse::<IpAddr>().is_ok()
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Walk `host` and each of its parent domains, down to the top-level label.
///
/// A trailing dot is ignored. IP literals yield only themselves.
pub fn host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.strip_suffix('.').unwrap_or(host);
    HostSuffixIter {
        current: host,
        ip: is_ip_literal(host),
    }
}

/// Iterator for suffix-walking a host from full to its top-level label.
pub struct HostSuffixIter<'a> {
    current: &'a str,
    ip: bool,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_empty() {
            return None;
        }

        let result = self.current;
        self.current = match get_parent_domain(self.current) {
            Some(parent) if !self.ip => parent,
            _ => "",
        };

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "// comment\ncom\nuk\nco.uk\n*.ck\n!www.ck\n\n// ===END===\n";

    #[test]
    fn fallback_etld1() {
        let psl = PublicSuffixes::default();
        assert_eq!(psl.etld1("example.com"), "example.com");
        assert_eq!(psl.etld1("sub.example.com"), "example.com");
        assert_eq!(psl.etld1("sub.example.co.uk"), "example.co.uk");
        assert_eq!(psl.etld1("example.co.uk"), "example.co.uk");
        assert_eq!(psl.etld1("localhost"), "localhost");
        assert_eq!(psl.etld1("192.168.0.1"), "192.168.0.1");
    }

    #[test]
    fn parsed_list_rules() {
        let psl = PublicSuffixes::parse(LIST);
        assert!(!psl.is_empty());
        assert_eq!(psl.etld1("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(psl.etld1("foo.bar.ck"), "foo.bar.ck");
        assert_eq!(psl.etld1("a.www.ck"), "www.ck");
        assert_eq!(psl.etld1("co.uk"), "co.uk");
        assert_eq!(psl.etld1("news.example.test"), "example.test");
    }

    #[test]
    fn third_party() {
        let psl = PublicSuffixes::default();
        assert!(!psl.is_third_party("www.example.com", "cdn.example.com"));
        assert!(psl.is_third_party("news.example", "ads.example.com"));
    }

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain(""), None);
    }

    #[test]
    fn suffix_walk_reaches_tld() {
        let walked: Vec<&str> = host_suffixes("a.b.example.co.uk").collect();
        assert_eq!(
            walked,
            vec!["a.b.example.co.uk", "b.example.co.uk", "example.co.uk", "co.uk", "uk"]
        );
        let walked: Vec<&str> = host_suffixes("example.com.").collect();
        assert_eq!(walked, vec!["example.com", "com"]);
        assert_eq!(host_suffixes("10.0.0.1").collect::<Vec<_>>(), vec!["10.0.0.1"]);
        assert_eq!(host_suffixes("").next(), None);
    }
}
