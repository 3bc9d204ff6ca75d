//! Change sets: a tree flattened into parent-child-successor relations and
//! content tuples.
//!
//! A PCS relation `(p, c, s)` says "under `p`, `s` immediately follows `c`".
//! Every child list is bracketed by a virtual start and end vertex, so a list
//! of N children becomes N+1 relations and an empty list becomes one. Labels
//! live apart from structure as `(node, content)` tuples.
//!
//! Both sets are ordered maps from the fact to the fact it is in hard conflict
//! with, if any. The key never changes when a conflict is recorded, so
//! membership tests against the base change set keep working on annotated
//! facts.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VirtualKind {
    Root,
    ListStart,
    ListEnd,
}

/// A content-free sentinel vertex, allocated by the
/// [`EncodingContext`](crate::encoder::EncodingContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualNode {
    pub kind: VirtualKind,
    pub index: usize,
}

/// An endpoint of a PCS relation: a class representative or a virtual node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    Node(NodeId),
    Virtual(VirtualNode),
}

impl Vertex {
    pub fn node(self) -> Option<NodeId> {
        match self {
            Vertex::Node(id) => Some(id),
            Vertex::Virtual(_) => None,
        }
    }

    pub fn is_virtual(self, kind: VirtualKind) -> bool {
        matches!(self, Vertex::Virtual(v) if v.kind == kind)
    }
}

impl From<NodeId> for Vertex {
    fn from(id: NodeId) -> Self {
        Vertex::Node(id)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Node(id) => write!(f, "{}", id),
            Vertex::Virtual(v) => match v.kind {
                VirtualKind::Root => write!(f, "root@{}", v.index),
                VirtualKind::ListStart => write!(f, "start@{}", v.index),
                VirtualKind::ListEnd => write!(f, "end@{}", v.index),
            },
        }
    }
}

/// A parent-child-successor triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pcs {
    pub parent: Vertex,
    pub child: Vertex,
    pub successor: Vertex,
}

impl Pcs {
    pub fn new(parent: Vertex, child: Vertex, successor: Vertex) -> Self {
        Self {
            parent,
            child,
            successor,
        }
    }

    pub fn endpoints(&self) -> [Vertex; 3] {
        [self.parent, self.child, self.successor]
    }

    /// Whether both relations cannot hold in the same tree: they disagree on
    /// what follows or precedes a position under the same parent, or they put
    /// one node under two different parents.
    pub fn is_inconsistent_with(&self, other: &Pcs) -> bool {
        if self == other {
            return false;
        }
        if self.parent == other.parent {
            (other.child == self.child && other.successor != self.successor)
                || (other.successor == self.successor && other.child != self.child)
        } else {
            [other.child, other.successor]
                .iter()
                .any(|v| *v == self.child || *v == self.successor)
        }
    }
}

impl fmt::Display for Pcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCS({}, {}, {})", self.parent, self.child, self.successor)
    }
}

/// The content of a labeled node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentTuple {
    pub node: NodeId,
    pub content: String,
}

impl ContentTuple {
    pub fn new(node: NodeId, content: impl Into<String>) -> Self {
        Self {
            node,
            content: content.into(),
        }
    }
}

/// Relation and content counts, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SetSize {
    pub pcs: usize,
    pub content: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pcs: BTreeMap<Pcs, Option<Pcs>>,
    content: BTreeMap<ContentTuple, Option<ContentTuple>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain set union; facts present in several inputs collapse.
    pub fn union(sets: &[&ChangeSet]) -> Self {
        let mut merged = ChangeSet::new();
        for set in sets {
            for (pcs, partner) in &set.pcs {
                merged.pcs.entry(*pcs).or_insert(*partner);
            }
            for (tuple, partner) in &set.content {
                merged
                    .content
                    .entry(tuple.clone())
                    .or_insert_with(|| partner.clone());
            }
        }
        merged
    }

    pub fn size(&self) -> SetSize {
        SetSize {
            pcs: self.pcs.len(),
            content: self.content.len(),
        }
    }

    // PCS relations

    pub fn insert_pcs(&mut self, pcs: Pcs) {
        self.pcs.entry(pcs).or_insert(None);
    }

    pub fn contains_pcs(&self, pcs: &Pcs) -> bool {
        self.pcs.contains_key(pcs)
    }

    pub fn remove_pcs(&mut self, pcs: &Pcs) -> bool {
        self.pcs.remove(pcs).is_some()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Pcs> {
        self.pcs.keys()
    }

    /// The relation `pcs` is in hard conflict with, if any.
    pub fn pcs_partner(&self, pcs: &Pcs) -> Option<Pcs> {
        self.pcs.get(pcs).copied().flatten()
    }

    /// Record that `a` and `b` are in hard conflict. A relation that already
    /// has a partner keeps it.
    pub fn mark_hard_pcs(&mut self, a: Pcs, b: Pcs) {
        if let Some(slot @ None) = self.pcs.get_mut(&a) {
            *slot = Some(b);
        }
        if let Some(slot @ None) = self.pcs.get_mut(&b) {
            *slot = Some(a);
        }
    }

    pub fn hard_pcs(&self) -> impl Iterator<Item = (&Pcs, &Pcs)> {
        self.pcs
            .iter()
            .filter_map(|(pcs, partner)| partner.as_ref().map(|p| (pcs, p)))
    }

    // Content tuples

    pub fn insert_content(&mut self, tuple: ContentTuple) {
        self.content.entry(tuple).or_insert(None);
    }

    pub fn contains_content(&self, tuple: &ContentTuple) -> bool {
        self.content.contains_key(tuple)
    }

    pub fn remove_content(&mut self, tuple: &ContentTuple) -> bool {
        self.content.remove(tuple).is_some()
    }

    pub fn contents(&self) -> impl Iterator<Item = &ContentTuple> {
        self.content.keys()
    }

    /// All content tuples attached to `node`.
    pub fn content_for(&self, node: NodeId) -> Vec<ContentTuple> {
        let from = ContentTuple::new(node, String::new());
        self.content
            .range(from..)
            .take_while(|(tuple, _)| tuple.node == node)
            .map(|(tuple, _)| tuple.clone())
            .collect()
    }

    pub fn content_partner(&self, tuple: &ContentTuple) -> Option<&ContentTuple> {
        self.content.get(tuple).and_then(|p| p.as_ref())
    }

    /// Record that `a` and `b` carry conflicting content for the same node.
    pub fn mark_hard_content(&mut self, a: &ContentTuple, b: &ContentTuple) {
        if let Some(slot) = self.content.get_mut(a) {
            *slot = Some(b.clone());
        }
        if let Some(slot) = self.content.get_mut(b) {
            *slot = Some(a.clone());
        }
    }

    pub fn hard_content(&self) -> impl Iterator<Item = (&ContentTuple, &ContentTuple)> {
        self.content
            .iter()
            .filter_map(|(tuple, partner)| partner.as_ref().map(|p| (tuple, p)))
    }

    pub fn hard_pcs_count(&self) -> usize {
        self.hard_pcs().count()
    }

    pub fn hard_content_count(&self) -> usize {
        self.hard_content().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: usize) -> Vertex {
        Vertex::Node(NodeId(i))
    }

    #[test]
    fn test_union_collapses_duplicates() {
        let mut a = ChangeSet::new();
        a.insert_pcs(Pcs::new(n(0), n(1), n(2)));
        a.insert_content(ContentTuple::new(NodeId(1), "x"));
        let mut b = a.clone();
        b.insert_pcs(Pcs::new(n(0), n(2), n(3)));
        b.insert_content(ContentTuple::new(NodeId(1), "y"));

        let merged = ChangeSet::union(&[&a, &b, &a]);
        assert_eq!(merged.size(), SetSize { pcs: 2, content: 2 });
    }

    #[test]
    fn test_content_for_selects_one_node() {
        let mut set = ChangeSet::new();
        set.insert_content(ContentTuple::new(NodeId(1), "b"));
        set.insert_content(ContentTuple::new(NodeId(2), "a"));
        set.insert_content(ContentTuple::new(NodeId(1), "a"));
        let tuples = set.content_for(NodeId(1));
        assert_eq!(tuples.len(), 2);
        assert!(tuples.iter().all(|t| t.node == NodeId(1)));
        assert!(set.content_for(NodeId(3)).is_empty());
    }

    #[test]
    fn test_mark_hard_pcs_keeps_first_partner() {
        let p = Pcs::new(n(0), n(1), n(2));
        let q = Pcs::new(n(0), n(1), n(3));
        let r = Pcs::new(n(0), n(1), n(4));
        let mut set = ChangeSet::new();
        for pcs in [p, q, r] {
            set.insert_pcs(pcs);
        }
        set.mark_hard_pcs(p, q);
        set.mark_hard_pcs(p, r);
        assert_eq!(set.pcs_partner(&p), Some(q));
        assert_eq!(set.pcs_partner(&q), Some(p));
        assert_eq!(set.pcs_partner(&r), Some(p));
        assert_eq!(set.hard_pcs_count(), 3);
    }

    #[test]
    fn test_mark_hard_content() {
        let a = ContentTuple::new(NodeId(1), "y");
        let b = ContentTuple::new(NodeId(1), "z");
        let mut set = ChangeSet::new();
        set.insert_content(a.clone());
        set.insert_content(b.clone());
        set.mark_hard_content(&a, &b);
        assert_eq!(set.content_partner(&a), Some(&b));
        assert_eq!(set.content_partner(&b), Some(&a));
        assert_eq!(set.hard_content_count(), 2);
    }

    #[test]
    fn test_same_parent_inconsistencies() {
        let p = Pcs::new(n(0), n(1), n(2));
        assert!(p.is_inconsistent_with(&Pcs::new(n(0), n(1), n(3))));
        assert!(p.is_inconsistent_with(&Pcs::new(n(0), n(3), n(2))));
        assert!(!p.is_inconsistent_with(&Pcs::new(n(0), n(2), n(3))));
        assert!(!p.is_inconsistent_with(&p));
    }

    #[test]
    fn test_node_under_two_parents_is_inconsistent() {
        let p = Pcs::new(n(0), n(1), n(2));
        assert!(p.is_inconsistent_with(&Pcs::new(n(9), n(5), n(1))));
        assert!(p.is_inconsistent_with(&Pcs::new(n(9), n(2), n(6))));
        assert!(!p.is_inconsistent_with(&Pcs::new(n(9), n(5), n(6))));
    }

    #[test]
    fn test_vertex_display() {
        let start = Vertex::Virtual(VirtualNode {
            kind: VirtualKind::ListStart,
            index: 3,
        });
        assert_eq!(start.to_string(), "start@3");
        assert!(start.is_virtual(VirtualKind::ListStart));
        assert_eq!(Pcs::new(n(1), start, n(2)).to_string(), "PCS(#1, start@3, #2)");
    }
}
