//! Class representatives.
//!
//! Nodes that the matchings identify as "the same node" across base, left
//! and right are collapsed onto one canonical node, their class
//! representative. Every later step talks about representatives only, which
//! is what lets the three encodings agree on shared facts.
//!
//! - base nodes represent themselves;
//! - left nodes map to their base match, else to themselves;
//! - right nodes map to their base match; failing that, to their left match
//!   when that left node is new (unmatched to base) and both nodes' parents
//!   already share a representative; otherwise to themselves.
//!
//! Right nodes are visited breadth first so a parent is always resolved before
//! its children are compared against it.

use std::collections::HashMap;

use crate::error::{MergeError, Result};
use crate::matcher::TriMatching;
use crate::types::{MergeScenario, NodeArena, NodeId};

/// Total map from every node of the three trees to its representative.
#[derive(Debug, Clone, Default)]
pub struct ClassRepresentatives {
    map: HashMap<NodeId, NodeId>,
}

impl ClassRepresentatives {
    pub fn resolve(
        arena: &NodeArena,
        roots: &MergeScenario<NodeId>,
        matchings: &TriMatching,
    ) -> Self {
        let mut map = HashMap::new();

        for node in arena.pre_order(roots.base) {
            map.insert(node, node);
        }

        for node in arena.pre_order(roots.left) {
            let rep = matchings.base_left.src_for_dst(node).unwrap_or(node);
            map.insert(node, rep);
        }

        let mut via_left = 0usize;
        for node in arena.breadth_first(roots.right) {
            let rep = match matchings.base_right.src_for_dst(node) {
                Some(base) => base,
                None => match matchings.left_right.src_for_dst(node) {
                    Some(left)
                        if !matchings.base_left.is_dst_matched(left)
                            && parents_agree(arena, &map, left, node) =>
                    {
                        via_left += 1;
                        left
                    }
                    _ => node,
                },
            };
            map.insert(node, rep);
        }

        tracing::debug!(nodes = map.len(), via_left, "resolved class representatives");
        Self { map }
    }

    /// Representative of `node`.
    pub fn get(&self, node: NodeId) -> Result<NodeId> {
        self.map
            .get(&node)
            .copied()
            .ok_or(MergeError::RepresentativeNotFound(node))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Whether the parents of a left node and a right node currently resolve to
/// the same representative. Two roots trivially agree.
fn parents_agree(
    arena: &NodeArena,
    map: &HashMap<NodeId, NodeId>,
    left: NodeId,
    right: NodeId,
) -> bool {
    match (arena.parent(left), arena.parent(right)) {
        (None, None) => true,
        (Some(lp), Some(rp)) => match (map.get(&lp), map.get(&rp)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Branch;

    /// block(stmt) per branch; returns (roots, stmts).
    fn three_blocks(arena: &mut NodeArena) -> (MergeScenario<NodeId>, MergeScenario<NodeId>) {
        let mut make = |branch| {
            let root = arena.alloc("block", None, 0..0, branch, None);
            let stmt = arena.alloc("stmt", None, 0..0, branch, Some(root));
            (root, stmt)
        };
        let (b, bs) = make(Branch::Base);
        let (l, ls) = make(Branch::Left);
        let (r, rs) = make(Branch::Right);
        (MergeScenario::new(b, l, r), MergeScenario::new(bs, ls, rs))
    }

    #[test]
    fn test_base_nodes_map_to_themselves() {
        let mut arena = NodeArena::new();
        let (roots, stmts) = three_blocks(&mut arena);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &TriMatching::default());
        assert_eq!(reps.get(roots.base).unwrap(), roots.base);
        assert_eq!(reps.get(stmts.base).unwrap(), stmts.base);
        assert_eq!(reps.get(stmts.left).unwrap(), stmts.left);
        assert_eq!(reps.len(), 6);
    }

    #[test]
    fn test_branch_nodes_map_to_base_match() {
        let mut arena = NodeArena::new();
        let (roots, stmts) = three_blocks(&mut arena);
        let mut tri = TriMatching::default();
        tri.base_left.insert(roots.base, roots.left);
        tri.base_left.insert(stmts.base, stmts.left);
        tri.base_right.insert(roots.base, roots.right);
        tri.base_right.insert(stmts.base, stmts.right);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        assert_eq!(reps.get(stmts.left).unwrap(), stmts.base);
        assert_eq!(reps.get(stmts.right).unwrap(), stmts.base);
    }

    #[test]
    fn test_right_node_joins_new_left_node_under_shared_parent() {
        let mut arena = NodeArena::new();
        let (roots, stmts) = three_blocks(&mut arena);
        let mut tri = TriMatching::default();
        tri.base_left.insert(roots.base, roots.left);
        tri.base_right.insert(roots.base, roots.right);
        // Both branches inserted the same statement; base has none.
        tri.left_right.insert(roots.left, roots.right);
        tri.left_right.insert(stmts.left, stmts.right);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        assert_eq!(reps.get(stmts.right).unwrap(), stmts.left);
    }

    #[test]
    fn test_right_node_keeps_itself_when_parents_differ() {
        let mut arena = NodeArena::new();
        let (roots, stmts) = three_blocks(&mut arena);
        let mut tri = TriMatching::default();
        tri.base_left.insert(roots.base, roots.left);
        // Right root is unmatched to base, so its parent class differs.
        tri.left_right.insert(stmts.left, stmts.right);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        assert_eq!(reps.get(stmts.right).unwrap(), stmts.right);
    }

    #[test]
    fn test_right_node_ignores_left_node_matched_to_base() {
        let mut arena = NodeArena::new();
        let (roots, stmts) = three_blocks(&mut arena);
        let mut tri = TriMatching::default();
        tri.base_left.insert(roots.base, roots.left);
        tri.base_left.insert(stmts.base, stmts.left);
        tri.base_right.insert(roots.base, roots.right);
        tri.left_right.insert(stmts.left, stmts.right);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        assert_eq!(reps.get(stmts.right).unwrap(), stmts.right);
    }

    #[test]
    fn test_unmatched_roots_can_share_class() {
        let mut arena = NodeArena::new();
        let (roots, _) = three_blocks(&mut arena);
        let mut tri = TriMatching::default();
        tri.left_right.insert(roots.left, roots.right);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &tri);
        assert_eq!(reps.get(roots.right).unwrap(), roots.left);
    }

    #[test]
    fn test_unknown_node_is_an_error() {
        let mut arena = NodeArena::new();
        let (roots, _) = three_blocks(&mut arena);
        let stray = arena.alloc("stray", None, 0..0, Branch::Base, None);
        let reps = ClassRepresentatives::resolve(&arena, &roots, &TriMatching::default());
        assert!(matches!(
            reps.get(stray),
            Err(MergeError::RepresentativeNotFound(id)) if id == stray
        ));
    }
}
