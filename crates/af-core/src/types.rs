//! Core type definitions for adfilter
//!
//! These types are shared by the parser, the index builder and the
//! query engines.

use std::fmt;
use std::sync::Arc;

use crate::rule::Rule;

// =============================================================================
// Rule Kinds
// =============================================================================

/// What a parsed rule does when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleKind {
    /// Network rule - cancels the request
    Block = 0,
    /// Network exception (@@...) - allows the request
    Exception = 1,
    /// Element hiding rule (##)
    ElementHide = 2,
    /// Element hiding exception (#@#)
    ElementHideException = 3,
    /// CSS injection rule (#$#)
    StyleInject = 4,
    /// CSS injection exception (#@$#)
    StyleInjectException = 5,
}

impl RuleKind {
    /// True for the two kinds evaluated against request URLs.
    #[inline]
    pub fn is_network(self) -> bool {
        matches!(self, Self::Block | Self::Exception)
    }

    /// True for exception kinds of any family.
    #[inline]
    pub fn is_exception(self) -> bool {
        matches!(
            self,
            Self::Exception | Self::ElementHideException | Self::StyleInjectException
        )
    }
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u16 {
        /// $important - recorded, exceptions still take precedence
        const IMPORTANT = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 1;
        /// $badfilter - cancels the identical rule
        const BADFILTER = 1 << 2;
        /// Rule has right anchor (ends with |)
        const HAS_RIGHT_ANCHOR = 1 << 3;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 4;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 5;
        /// $elemhide on an exception - disables all element hiding
        const ELEMHIDE = 1 << 6;
        /// $generichide on an exception - disables generic element hiding
        const GENERICHIDE = 1 << 7;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;

        /// All request types
        const ALL = 0x0FFF;
        /// Document types (main_frame + sub_frame)
        const DOCUMENT = Self::MAIN_FRAME.bits() | Self::SUBDOCUMENT.bits();
    }
}

impl RequestType {
    /// Parse from a browser or WebView request type string.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "main_frame" | "document" => Self::MAIN_FRAME,
            "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "ping" => Self::PING,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            _ => Self::OTHER,
        }
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Filter Identifiers
// =============================================================================

/// Stable identifier of a filter list, derived from its source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(String);

impl FilterId {
    /// Derive the identifier for a subscription URL.
    pub fn from_url(url: &str) -> Self {
        Self(crate::hash::hash64(url.as_bytes()).to_hex())
    }

    /// Wrap an identifier that was computed elsewhere (e.g. persisted settings).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Normalized request URL
    pub url: &'a str,
    /// ASCII-lowercased copy of `url` used for case-insensitive matching
    pub url_lower: &'a str,
    /// Byte range of the hostname inside `url`
    pub host_range: Option<(usize, usize)>,
    /// Request hostname
    pub req_host: &'a str,
    /// Document hostname, if the document URL could be parsed
    pub site_host: Option<&'a str>,
    /// Is this a third-party request? `None` when there is no document.
    pub is_third_party: Option<bool>,
    /// Request type
    pub request_type: RequestType,
}

// =============================================================================
// Match Result
// =============================================================================

/// Final decision for a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Request is allowed (no matching block rules, or exception matched)
    Allow,
    /// Request is blocked
    Block,
}

/// The rule that determined a decision, for diagnostics and UI counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRule {
    /// Filter list the rule came from
    pub filter_id: FilterId,
    /// The parsed rule
    pub rule: Arc<Rule>,
}

/// Result of matching a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The final decision for this request
    pub decision: MatchDecision,
    /// Rule that determined the decision, if any
    pub matched_rule: Option<MatchedRule>,
    /// Resource type the request was classified as
    pub request_type: RequestType,
}

impl MatchResult {
    /// Allow with no matched rule.
    pub fn allow(request_type: RequestType) -> Self {
        Self {
            decision: MatchDecision::Allow,
            matched_rule: None,
            request_type,
        }
    }

    #[inline]
    pub fn blocked(&self) -> bool {
        self.decision == MatchDecision::Block
    }
}
