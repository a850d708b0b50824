//! Wildcard pattern programs
//!
//! A network rule's pattern is compiled once into a short sequence of
//! operations (literal, `*`, `^`) plus its anchoring. Matching walks the
//! program against the URL and backtracks only at wildcards.

use crate::url::is_separator_char;

/// Minimum length of a literal worth indexing.
pub const MIN_KEY_LEN: usize = 3;

/// Pattern program operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternOp {
    /// Literal text (lowercased unless the rule is case-sensitive)
    Literal(String),
    /// `*` - any run of characters
    Wildcard,
    /// `^` - one separator character, or the end of the URL
    Separator,
}

/// Where a pattern is allowed to start matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorType {
    /// Anywhere in the URL
    #[default]
    None,
    /// `|` - at the start of the URL
    Left,
    /// `||` - at the start of the hostname or of one of its labels
    Hostname,
}

/// A compiled network pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    ops: Vec<PatternOp>,
    anchor: AnchorType,
    anchor_end: bool,
    match_case: bool,
}

impl Pattern {
    /// Compile a pattern body (anchors already stripped).
    pub fn compile(body: &str, anchor: AnchorType, anchor_end: bool, match_case: bool) -> Self {
        let mut ops = Vec::new();
        let mut literal = String::new();

        for ch in body.chars() {
            match ch {
                '*' | '^' => {
                    if !literal.is_empty() {
                        ops.push(PatternOp::Literal(std::mem::take(&mut literal)));
                    }
                    if ch == '^' {
                        ops.push(PatternOp::Separator);
                    } else if ops.last() != Some(&PatternOp::Wildcard) {
                        ops.push(PatternOp::Wildcard);
                    }
                }
                _ if match_case => literal.push(ch),
                _ => literal.push(ch.to_ascii_lowercase()),
            }
        }
        if !literal.is_empty() {
            ops.push(PatternOp::Literal(literal));
        }

        // A trailing `*` swallows the rest, which makes an end anchor moot.
        let mut anchor_end = anchor_end;
        while ops.last() == Some(&PatternOp::Wildcard) {
            ops.pop();
            anchor_end = false;
        }

        Self {
            ops,
            anchor,
            anchor_end,
            match_case,
        }
    }

    pub fn ops(&self) -> &[PatternOp] {
        &self.ops
    }

    pub fn anchor(&self) -> AnchorType {
        self.anchor
    }

    /// The longest literal, lowercased, used as the bucket key.
    /// `None` when no literal reaches [`MIN_KEY_LEN`].
    pub fn literal_key(&self) -> Option<String> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                PatternOp::Literal(lit) => Some(lit),
                _ => None,
            })
            .fold(None::<&String>, |best, lit| match best {
                Some(b) if b.len() >= lit.len() => Some(b),
                _ => Some(lit),
            })
            .filter(|lit| lit.len() >= MIN_KEY_LEN)
            .map(|lit| lit.to_ascii_lowercase())
    }

    /// Match against a URL. `url_lower` must be `url.to_ascii_lowercase()`
    /// and `host_range` the hostname byte range inside it.
    pub fn matches(&self, url: &str, url_lower: &str, host_range: Option<(usize, usize)>) -> bool {
        let hay = if self.match_case { url } else { url_lower }.as_bytes();
        let mut floors = vec![usize::MAX; self.ops.len() + 1];

        match self.anchor {
            AnchorType::Left => self.match_at(hay, 0, 0, &mut floors),
            AnchorType::None => self.match_wildcard(hay, 0, 0, &mut floors),
            AnchorType::Hostname => {
                let (host_start, host_end) = match host_range {
                    Some(range) => range,
                    None => return false,
                };
                (host_start..host_end)
                    .filter(|&i| i == host_start || hay[i - 1] == b'.')
                    .any(|start| self.match_at(hay, 0, start, &mut floors))
            }
        }
    }

    fn match_at(&self, hay: &[u8], op: usize, pos: usize, floors: &mut [usize]) -> bool {
        let current = match self.ops.get(op) {
            Some(current) => current,
            None => return !self.anchor_end || pos == hay.len(),
        };

        match current {
            PatternOp::Literal(lit) => {
                hay[pos..].starts_with(lit.as_bytes())
                    && self.match_at(hay, op + 1, pos + lit.len(), floors)
            }
            PatternOp::Separator => match hay.get(pos) {
                None => self.match_at(hay, op + 1, pos, floors),
                Some(&b) => is_separator_char(b) && self.match_at(hay, op + 1, pos + 1, floors),
            },
            PatternOp::Wildcard => self.match_wildcard(hay, pos, op + 1, floors),
        }
    }

    /// Try every continuation of a wildcard starting at `from`.
    ///
    /// A failure from `from` also rules out every later start, so
    /// `floors[next_op]` keeps the lowest start known to fail and each
    /// position is scanned at most once per wildcard.
    fn match_wildcard(&self, hay: &[u8], from: usize, next_op: usize, floors: &mut [usize]) -> bool {
        let floor = floors[next_op];
        if from >= floor {
            return false;
        }

        let matched = match self.ops.get(next_op) {
            None => return true,
            Some(PatternOp::Literal(lit)) => {
                let needle = lit.as_bytes();
                // Occurrences must start below the floor.
                let end = floor
                    .saturating_add(needle.len())
                    .saturating_sub(1)
                    .min(hay.len());
                let mut start = from;
                loop {
                    if start > end {
                        break false;
                    }
                    match find_bytes(&hay[start..end], needle) {
                        Some(found) => {
                            if self.match_at(hay, next_op, start + found, floors) {
                                break true;
                            }
                            start += found + 1;
                        }
                        None => break false,
                    }
                }
            }
            Some(_) => (from..floor.min(hay.len() + 1)).any(|p| self.match_at(hay, next_op, p, floors)),
        };

        if !matched {
            floors[next_op] = from;
        }
        matched
    }
}

fn find_bytes(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    hay.windows(needle.len()).position(|w| w == needle)
}
