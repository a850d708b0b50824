//! Parsed filter rules

use crate::psl::host_suffixes;
use crate::types::{PartyMask, RequestType, RuleFlags, RuleKind};

/// Domain restriction of a rule. Entries are lowercase and punycode-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainConstraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DomainConstraint {
    /// Whether the constraint admits a document host.
    ///
    /// The most specific listed suffix of `host` decides; with no listed
    /// suffix the host is admitted only if the include list is empty.
    pub fn applies_to(&self, host: Option<&str>) -> bool {
        let host = match host {
            Some(host) => host,
            None => return self.include.is_empty(),
        };

        for suffix in host_suffixes(host) {
            if self.exclude.iter().any(|d| d == suffix) {
                return false;
            }
            if self.include.iter().any(|d| d == suffix) {
                return true;
            }
        }

        self.include.is_empty()
    }
}

/// One parsed line of filter-list text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    /// The line as it appeared in the list (trimmed)
    pub raw: String,
    pub kind: RuleKind,
    pub flags: RuleFlags,
    /// Network pattern without anchors, CSS selector, or CSS rule body
    pub pattern: String,
    pub type_mask: RequestType,
    pub party_mask: PartyMask,
    pub domains: Option<DomainConstraint>,
}

impl Rule {
    /// True for `$third-party` rules.
    #[inline]
    pub fn third_party_only(&self) -> bool {
        self.party_mask == PartyMask::THIRD_PARTY
    }

    /// True when the rule carries no include domains.
    #[inline]
    pub fn is_generic(&self) -> bool {
        self.domains.as_ref().map_or(true, |d| d.include.is_empty())
    }

    /// Whether the rule's party mask admits a request.
    #[inline]
    pub fn party_matches(&self, is_third_party: Option<bool>) -> bool {
        if self.party_mask.contains(PartyMask::ALL) {
            return true;
        }
        match is_third_party {
            Some(true) => self.party_mask.contains(PartyMask::THIRD_PARTY),
            Some(false) => self.party_mask.contains(PartyMask::FIRST_PARTY),
            None => false,
        }
    }

    /// Whether the rule's domain restriction admits a document host.
    #[inline]
    pub fn domain_matches(&self, site_host: Option<&str>) -> bool {
        match &self.domains {
            Some(constraint) => constraint.applies_to(site_host),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(include: &[&str], exclude: &[&str]) -> DomainConstraint {
        DomainConstraint {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn include_covers_subdomains() {
        let c = constraint(&["example.com"], &[]);
        assert!(c.applies_to(Some("example.com")));
        assert!(c.applies_to(Some("www.example.com")));
        assert!(!c.applies_to(Some("example.org")));
        assert!(!c.applies_to(None));
    }

    #[test]
    fn exclusions_and_specificity() {
        let c = constraint(&[], &["example.com"]);
        assert!(!c.applies_to(Some("a.example.com")));
        assert!(c.applies_to(Some("other.com")));
        assert!(c.applies_to(None));

        let c = constraint(&["example.com"], &["foo.example.com"]);
        assert!(c.applies_to(Some("bar.example.com")));
        assert!(!c.applies_to(Some("x.foo.example.com")));

        let c = constraint(&["foo.example.com"], &["example.com"]);
        assert!(c.applies_to(Some("foo.example.com")));
        assert!(!c.applies_to(Some("example.com")));
    }

    #[test]
    fn public_suffix_and_trailing_dot() {
        let c = constraint(&["co.uk"], &[]);
        assert!(c.applies_to(Some("shop.example.co.uk")));
        assert!(!c.applies_to(Some("example.com")));

        let c = constraint(&["com"], &["example.com"]);
        assert!(c.applies_to(Some("other.com")));
        assert!(!c.applies_to(Some("www.example.com")));

        let c = constraint(&["example.com"], &[]);
        assert!(c.applies_to(Some("example.com.")));
        assert!(c.applies_to(Some("www.example.com.")));
    }
}
