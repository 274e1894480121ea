//! Permission node grammar and matching
//!
//! A stored permission entry is a dot-separated path such as
//! `chat.admin.exec`, optionally prefixed with `-` to express an explicit
//! deny and optionally terminated with a `*` segment that covers the whole
//! subtree (`chat.*`, or a bare `*` for everything). Query nodes are plain
//! dotted paths with no wildcard and no prefix.
//!
//! Matching is pure and deterministic: among all entries that match a query,
//! the most specific one decides. An exact entry always outranks a wildcard,
//! a deeper wildcard prefix outranks a shallower one, and a deny wins over a
//! grant at equal specificity. A query nothing matches is denied.

use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};

/// A single parsed permission entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Path segments, excluding any terminal wildcard
    segments: Vec<String>,
    /// Whether the entry covers the entire subtree below `segments`
    wildcard: bool,
    /// Whether the entry denies instead of grants
    deny: bool,
}

/// Ranking of a match; field order makes derived `Ord` prefer exact matches,
/// then deeper prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Specificity {
    exact: bool,
    depth: usize,
}

impl NodeEntry {
    /// Parse a stored permission entry, rejecting anything outside the
    /// grammar: empty paths, empty segments, or a `*` anywhere but as the
    /// final segment.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || Error::MalformedNode(raw.to_string());

        let (deny, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if body.is_empty() {
            return Err(malformed());
        }

        let mut segments: Vec<String> = body.split('.').map(str::to_string).collect();
        let wildcard = segments.last().map(String::as_str) == Some("*");
        if wildcard {
            segments.pop();
        }
        if segments.iter().any(|s| s.is_empty() || s.contains('*')) {
            return Err(malformed());
        }

        Ok(Self {
            segments,
            wildcard,
            deny,
        })
    }

    /// Whether this entry is an explicit deny
    pub fn is_deny(&self) -> bool {
        self.deny
    }

    /// Whether this entry covers a subtree rather than a single node
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// How this entry matches a parsed query, if at all
    fn matches(&self, query: &[&str]) -> Option<Specificity> {
        if self.wildcard {
            // Subtree wildcard: covers strict descendants of its prefix.
            if query.len() > self.segments.len()
                && self.segments.iter().zip(query).all(|(s, q)| s == q)
            {
                return Some(Specificity {
                    exact: false,
                    depth: self.segments.len(),
                });
            }
            None
        } else if self.segments.len() == query.len()
            && self.segments.iter().zip(query).all(|(s, q)| s == q)
        {
            Some(Specificity {
                exact: true,
                depth: self.segments.len(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for NodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deny {
            f.write_str("-")?;
        }
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
            first = false;
        }
        if self.wildcard {
            if !first {
                f.write_str(".")?;
            }
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// An evaluated view over the permission entries stored for one entity or
/// permission group
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    entries: Vec<NodeEntry>,
}

impl PermissionSet {
    /// Build a set from stored node strings. Malformed entries never match,
    /// so they are dropped here with a warning rather than failing the
    /// whole set.
    pub fn from_nodes<S: AsRef<str>>(nodes: &[S]) -> Self {
        let entries = nodes
            .iter()
            .filter_map(|raw| match NodeEntry::parse(raw.as_ref()) {
                Ok(entry) => Some(entry),
                Err(_) => {
                    warn!(node = raw.as_ref(), "ignoring malformed permission node");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    /// Number of well-formed entries in the set
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no well-formed entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate the set against a query node.
    ///
    /// Returns `true` only when the most specific matching entry is a grant.
    /// Queries that are empty or contain wildcard/empty segments never match.
    pub fn check(&self, node: &str) -> bool {
        let query = match parse_query(node) {
            Some(query) => query,
            None => {
                warn!(node, "rejecting malformed permission query");
                return false;
            }
        };

        let mut best: Option<(Specificity, bool)> = None;
        for entry in &self.entries {
            if let Some(specificity) = entry.matches(&query) {
                best = Some(match best {
                    None => (specificity, entry.deny),
                    Some((top, _)) if specificity > top => (specificity, entry.deny),
                    // Equal specificity: a deny on either side sticks.
                    Some((top, deny)) if specificity == top => (top, deny || entry.deny),
                    Some(current) => current,
                });
            }
        }

        matches!(best, Some((_, false)))
    }
}

/// Split a query node into segments, rejecting empty or wildcard segments
fn parse_query(node: &str) -> Option<Vec<&str>> {
    if node.is_empty() {
        return None;
    }
    let segments: Vec<&str> = node.split('.').collect();
    if segments.iter().any(|s| s.is_empty() || s.contains('*')) {
        return None;
    }
    Some(segments)
}

/// Evaluate raw stored nodes against a query in one call
pub fn check_permission<S: AsRef<str>>(nodes: &[S], node: &str) -> bool {
    PermissionSet::from_nodes(nodes).check(node)
}
