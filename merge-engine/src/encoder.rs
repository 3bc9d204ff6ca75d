//! Encoding a tree into a [`ChangeSet`].
//!
//! The three revisions are encoded one after another against the same
//! [`EncodingContext`], so a class representative gets the same virtual
//! root and the same child-list sentinels no matter which revision it is
//! reached from. That sharing is what makes identical facts from different
//! revisions compare equal.

use std::collections::BTreeMap;

use crate::changeset::{ChangeSet, ContentTuple, Pcs, Vertex, VirtualKind, VirtualNode};
use crate::error::Result;
use crate::representatives::ClassRepresentatives;
use crate::types::{NodeArena, NodeId};

/// The start and end sentinels bracketing one child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildList {
    pub start: Vertex,
    pub end: Vertex,
}

/// Memo tables for virtual nodes, shared by all encodings of one merge and
/// by the decoder afterwards.
#[derive(Debug, Default)]
pub struct EncodingContext {
    roots: BTreeMap<NodeId, Vertex>,
    lists: BTreeMap<Vertex, ChildList>,
    next: usize,
}

impl EncodingContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: VirtualKind) -> Vertex {
        let index = self.next;
        self.next += 1;
        Vertex::Virtual(VirtualNode { kind, index })
    }

    /// The virtual root anchoring the tree whose root has representative
    /// `rep`, created on first use.
    pub fn virtual_root_for(&mut self, rep: NodeId) -> Vertex {
        if let Some(vr) = self.roots.get(&rep) {
            return *vr;
        }
        let vr = self.alloc(VirtualKind::Root);
        self.roots.insert(rep, vr);
        vr
    }

    /// The child-list sentinels owned by `owner`, created on first use.
    pub fn child_list_for(&mut self, owner: Vertex) -> ChildList {
        if let Some(list) = self.lists.get(&owner) {
            return *list;
        }
        let list = ChildList {
            start: self.alloc(VirtualKind::ListStart),
            end: self.alloc(VirtualKind::ListEnd),
        };
        self.lists.insert(owner, list);
        list
    }

    /// Lookup without allocation.
    pub fn child_list(&self, owner: Vertex) -> Option<ChildList> {
        self.lists.get(&owner).copied()
    }

    pub fn virtual_roots(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.roots.values().copied()
    }

    /// Number of virtual nodes allocated so far.
    pub fn virtual_count(&self) -> usize {
        self.next
    }
}

/// Encode the tree rooted at `root` as PCS relations over representatives
/// plus one content tuple per labeled node.
pub fn encode_tree(
    arena: &NodeArena,
    root: NodeId,
    reps: &ClassRepresentatives,
    ctx: &mut EncodingContext,
) -> Result<ChangeSet> {
    let mut set = ChangeSet::new();

    let root_rep = reps.get(root)?;
    let vr = ctx.virtual_root_for(root_rep);
    let anchor = ctx.child_list_for(vr);
    set.insert_pcs(Pcs::new(vr, anchor.start, Vertex::Node(root_rep)));
    set.insert_pcs(Pcs::new(vr, Vertex::Node(root_rep), anchor.end));

    for node in arena.breadth_first(root) {
        let rep = reps.get(node)?;
        if let Some(label) = &arena.get(node).label {
            set.insert_content(ContentTuple::new(rep, label.clone()));
        }

        let parent = Vertex::Node(rep);
        let list = ctx.child_list_for(parent);
        let mut prev = list.start;
        for child in arena.children(node) {
            let child = Vertex::Node(reps.get(*child)?);
            set.insert_pcs(Pcs::new(parent, prev, child));
            prev = child;
        }
        set.insert_pcs(Pcs::new(parent, prev, list.end));
    }

    tracing::debug!(
        root = %root,
        pcs = set.size().pcs,
        content = set.size().content,
        "encoded tree"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::TriMatching;
    use crate::types::{Branch, MergeScenario};

    /// block(a, b) in every branch, all unmatched.
    fn scenario(arena: &mut NodeArena) -> MergeScenario<NodeId> {
        let mut make = |branch| {
            let root = arena.alloc("block", None, 0..0, branch, None);
            arena.alloc("ident", Some("a".into()), 0..0, branch, Some(root));
            arena.alloc("ident", Some("b".into()), 0..0, branch, Some(root));
            root
        };
        let base = make(Branch::Base);
        let left = make(Branch::Left);
        let right = make(Branch::Right);
        MergeScenario::new(base, left, right)
    }

    #[test]
    fn test_child_list_has_n_plus_one_relations() {
        let mut arena = NodeArena::new();
        let roots = scenario(&mut arena);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &TriMatching::default());
        let mut ctx = EncodingContext::new();
        let set = encode_tree(&arena, roots.base, &reps, &mut ctx).unwrap();

        let block = Vertex::Node(roots.base);
        let under_block = set.relations().filter(|p| p.parent == block).count();
        assert_eq!(under_block, 3);
        // 2 anchor relations + 3 under block + 1 per leaf
        assert_eq!(set.size().pcs, 7);
        assert_eq!(set.size().content, 2);
    }

    #[test]
    fn test_leaf_encodes_start_to_end() {
        let mut arena = NodeArena::new();
        let roots = scenario(&mut arena);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &TriMatching::default());
        let mut ctx = EncodingContext::new();
        let set = encode_tree(&arena, roots.base, &reps, &mut ctx).unwrap();

        let leaf = arena.children(roots.base)[0];
        let list = ctx.child_list(Vertex::Node(leaf)).unwrap();
        let expected = Pcs::new(Vertex::Node(leaf), list.start, list.end);
        assert!(set.contains_pcs(&expected));
    }

    #[test]
    fn test_matched_nodes_share_virtual_nodes() {
        let mut arena = NodeArena::new();
        let roots = scenario(&mut arena);
        let mut tri = TriMatching::default();
        for (b, l) in arena
            .pre_order(roots.base)
            .into_iter()
            .zip(arena.pre_order(roots.left))
        {
            tri.base_left.insert(b, l);
        }
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        let mut ctx = EncodingContext::new();
        let base = encode_tree(&arena, roots.base, &reps, &mut ctx).unwrap();
        let allocated = ctx.virtual_count();
        let left = encode_tree(&arena, roots.left, &reps, &mut ctx).unwrap();

        assert_eq!(ctx.virtual_count(), allocated);
        assert_eq!(base, left);
    }

    #[test]
    fn test_content_uses_own_label_under_representative() {
        let mut arena = NodeArena::new();
        let base = arena.alloc("ident", Some("x".into()), 0..1, Branch::Base, None);
        let left = arena.alloc("ident", Some("x".into()), 0..1, Branch::Left, None);
        let right = arena.alloc("ident", Some("z".into()), 0..1, Branch::Right, None);
        let roots = MergeScenario::new(base, left, right);
        let mut tri = TriMatching::default();
        tri.base_right.insert(base, right);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        let mut ctx = EncodingContext::new();
        let set = encode_tree(&arena, right, &reps, &mut ctx).unwrap();

        assert_eq!(set.content_for(base), vec![ContentTuple::new(base, "z")]);
        assert!(set.content_for(right).is_empty());
    }

    #[test]
    fn test_unmatched_roots_get_distinct_virtual_roots() {
        let mut arena = NodeArena::new();
        let roots = scenario(&mut arena);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &TriMatching::default());
        let mut ctx = EncodingContext::new();
        encode_tree(&arena, roots.base, &reps, &mut ctx).unwrap();
        encode_tree(&arena, roots.left, &reps, &mut ctx).unwrap();
        assert_eq!(ctx.virtual_roots().count(), 2);
    }
}
