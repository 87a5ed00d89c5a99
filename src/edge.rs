//! Edge registry: per-node adjacency keyed by edge kind and target identity.
//!
//! One logical edge kind between two nodes carries an ordered, append-only
//! list of occurrences. Occurrences are never deduplicated: the same
//! connection logged twice is two observations.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::node::IdentityKey;
use crate::value::Record;

/// Name of a relationship type, e.g. `connected_to` or `resolves_to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKind(Arc<str>);

impl EdgeKind {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EdgeKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EdgeKind {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target identity → ordered occurrence list, for one edge kind.
pub type Targets = IndexMap<IdentityKey, Vec<Record>>;

/// Outgoing edges of one node.
///
/// Iteration order is insertion order, both for edge kinds and for distinct
/// targets within a kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjacency {
    kinds: IndexMap<EdgeKind, Targets>,
}

/// Counts produced by [`Adjacency::append_from`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub entries_created: usize,
    pub occurrences_appended: usize,
}

impl Adjacency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one occurrence to `(kind, target)`, creating the entry if needed.
    pub fn add(&mut self, kind: EdgeKind, target: IdentityKey, occurrence: Record) {
        self.entry(kind, target).push(occurrence);
    }

    /// Ensure `(kind, target)` exists without recording an occurrence.
    pub fn connect(&mut self, kind: EdgeKind, target: IdentityKey) {
        self.entry(kind, target);
    }

    fn entry(&mut self, kind: EdgeKind, target: IdentityKey) -> &mut Vec<Record> {
        self.kinds.entry(kind).or_default().entry(target).or_default()
    }

    pub fn contains(&self, kind: &EdgeKind, target: &IdentityKey) -> bool {
        self.kinds
            .get(kind)
            .is_some_and(|targets| targets.contains_key(target))
    }

    /// Targets of one edge kind, in insertion order.
    pub fn targets(&self, kind: &EdgeKind) -> Option<&Targets> {
        self.kinds.get(kind)
    }

    /// Occurrences recorded for `(kind, target)`.
    pub fn occurrences(&self, kind: &EdgeKind, target: &IdentityKey) -> Option<&[Record]> {
        self.kinds
            .get(kind)
            .and_then(|targets| targets.get(target))
            .map(Vec::as_slice)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EdgeKind> {
        self.kinds.keys()
    }

    /// Every `(kind, target, occurrences)` entry.
    pub fn iter(&self) -> impl Iterator<Item = (&EdgeKind, &IdentityKey, &[Record])> {
        self.kinds.iter().flat_map(|(kind, targets)| {
            targets
                .iter()
                .map(move |(target, occurrences)| (kind, target, occurrences.as_slice()))
        })
    }

    /// Distinct target identities across all kinds (may repeat across kinds).
    pub fn target_keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.kinds.values().flat_map(|targets| targets.keys())
    }

    /// Number of `(kind, target)` entries.
    pub fn entry_count(&self) -> usize {
        self.kinds.values().map(IndexMap::len).sum()
    }

    pub fn occurrence_count(&self) -> usize {
        self.kinds
            .values()
            .flat_map(|targets| targets.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Move every entry of `other` onto `self`.
    ///
    /// Existing occurrences stay first; `other`'s follow in their own order.
    pub fn append_from(&mut self, other: Adjacency) -> AppendSummary {
        let mut summary = AppendSummary::default();
        for (kind, targets) in other.kinds {
            let mine = self.kinds.entry(kind).or_default();
            for (target, occurrences) in targets {
                let entry = mine.entry(target).or_insert_with(|| {
                    summary.entries_created += 1;
                    Vec::new()
                });
                summary.occurrences_appended += occurrences.len();
                entry.extend(occurrences);
            }
        }
        summary
    }
}
