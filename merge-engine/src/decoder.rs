//! Turning a merged change set back into a tree.
//!
//! Each node's children are recovered by walking its sibling chain from the
//! list-start sentinel to the list-end sentinel. Where two hard-inconsistent
//! relations offer competing successors, both runs are followed until they
//! meet again and kept side by side as a [`ListConflict`].

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::changeset::{ChangeSet, Pcs, Vertex, VirtualKind};
use crate::encoder::{ChildList, EncodingContext};
use crate::error::{Malformation, MergeError, Result};
use crate::types::NodeId;

/// One alternative run of children, and the relation that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub relation: Pcs,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConflict {
    pub alternatives: [Alternative; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Node(NodeId),
    Conflict(ListConflict),
}

/// The decoded merge result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTree {
    pub root: NodeId,
    slots: BTreeMap<NodeId, Vec<Slot>>,
}

impl MergedTree {
    pub fn children(&self, node: NodeId) -> &[Slot] {
        self.slots.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.slots.contains_key(&node)
    }

    /// Number of decoded nodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn conflict_count(&self) -> usize {
        self.slots
            .values()
            .flatten()
            .filter(|slot| matches!(slot, Slot::Conflict(_)))
            .count()
    }
}

/// Decode `merged` into a tree, using the sentinels recorded in `ctx`.
pub fn decode(merged: &ChangeSet, ctx: &EncodingContext) -> Result<MergedTree> {
    let decoder = Decoder::new(merged, ctx);
    let root = decoder.find_root()?;

    let mut slots = BTreeMap::new();
    let mut ancestors = HashSet::new();
    decoder.decode_node(root, &mut slots, &mut ancestors)?;

    let tree = MergedTree { root, slots };
    tracing::debug!(
        nodes = tree.len(),
        conflicts = tree.conflict_count(),
        "decoded merged tree"
    );
    Ok(tree)
}

fn malformed(parent: Option<Vertex>, kind: Malformation) -> MergeError {
    MergeError::MalformedRelationSet { parent, kind }
}

struct Decoder<'a> {
    merged: &'a ChangeSet,
    ctx: &'a EncodingContext,
    /// (parent, child) -> relations naming a successor of `child`.
    successors: HashMap<(Vertex, Vertex), Vec<Pcs>>,
}

impl<'a> Decoder<'a> {
    fn new(merged: &'a ChangeSet, ctx: &'a EncodingContext) -> Self {
        let mut successors: HashMap<(Vertex, Vertex), Vec<Pcs>> = HashMap::new();
        for pcs in merged.relations() {
            successors
                .entry((pcs.parent, pcs.child))
                .or_default()
                .push(*pcs);
        }
        Self {
            merged,
            ctx,
            successors,
        }
    }

    fn find_root(&self) -> Result<NodeId> {
        let candidates: Vec<NodeId> = self
            .merged
            .relations()
            .filter(|p| {
                p.parent.is_virtual(VirtualKind::Root)
                    && p.child.is_virtual(VirtualKind::ListStart)
            })
            .filter_map(|p| p.successor.node())
            .collect();

        match candidates.as_slice() {
            [] => Err(malformed(None, Malformation::MissingRoot)),
            [root] => Ok(*root),
            many => Err(malformed(None, Malformation::AmbiguousRoot(many.len()))),
        }
    }

    fn decode_node(
        &self,
        node: NodeId,
        slots: &mut BTreeMap<NodeId, Vec<Slot>>,
        ancestors: &mut HashSet<NodeId>,
    ) -> Result<()> {
        let parent = Vertex::Node(node);
        if !ancestors.insert(node) {
            return Err(malformed(Some(parent), Malformation::Cycle { at: parent }));
        }
        if slots.contains_key(&node) {
            // Reached from a second parent; decoded once.
            ancestors.remove(&node);
            return Ok(());
        }

        let list = self
            .ctx
            .child_list(parent)
            .ok_or_else(|| malformed(Some(parent), Malformation::MissingListStart))?;
        let children = self.child_slots(parent, list)?;
        slots.insert(node, children.clone());

        for slot in &children {
            match slot {
                Slot::Node(child) => self.decode_node(*child, slots, ancestors)?,
                Slot::Conflict(conflict) => {
                    for alt in &conflict.alternatives {
                        for child in &alt.nodes {
                            self.decode_node(*child, slots, ancestors)?;
                        }
                    }
                }
            }
        }

        ancestors.remove(&node);
        Ok(())
    }

    fn next(&self, parent: Vertex, child: Vertex) -> &[Pcs] {
        self.successors
            .get(&(parent, child))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Walk the sibling chain of `parent` from start to end.
    fn child_slots(&self, parent: Vertex, list: ChildList) -> Result<Vec<Slot>> {
        let mut slots = Vec::new();
        let mut visited = HashSet::new();
        let mut current = list.start;

        while current != list.end {
            if !visited.insert(current) {
                return Err(malformed(Some(parent), Malformation::Cycle { at: current }));
            }
            match self.next(parent, current) {
                [one] => {
                    current = one.successor;
                    if let Some(child) = current.node() {
                        slots.push(Slot::Node(child));
                    }
                }
                [] => return Err(self.missing_link(parent, list, current)),
                [a, b] if self.is_hard_pair(a, b) => {
                    let (conflict, join) = self.split_runs(parent, list, *a, *b)?;
                    for node in conflict.alternatives.iter().flat_map(|alt| &alt.nodes) {
                        visited.insert(Vertex::Node(*node));
                    }
                    slots.push(Slot::Conflict(conflict));
                    current = join;
                    if let Some(child) = current.node() {
                        if visited.contains(&current) {
                            return Err(malformed(Some(parent), Malformation::Cycle { at: current }));
                        }
                        slots.push(Slot::Node(child));
                    }
                }
                _ => {
                    return Err(malformed(
                        Some(parent),
                        Malformation::UnresolvedInconsistency { after: current },
                    ));
                }
            }
        }
        Ok(slots)
    }

    fn is_hard_pair(&self, a: &Pcs, b: &Pcs) -> bool {
        self.merged.pcs_partner(a).is_some() && self.merged.pcs_partner(b).is_some()
    }

    fn missing_link(&self, parent: Vertex, list: ChildList, after: Vertex) -> MergeError {
        let reaches_end = self
            .merged
            .relations()
            .any(|p| p.parent == parent && p.successor == list.end);
        if reaches_end {
            malformed(Some(parent), Malformation::MissingLink { after })
        } else {
            malformed(Some(parent), Malformation::MissingListEnd)
        }
    }

    /// Follow the single-successor chain from `from` until the end sentinel,
    /// a branch point, or `stop` says so. The returned run includes the
    /// vertex it stopped on.
    fn run(
        &self,
        parent: Vertex,
        list: ChildList,
        from: Vertex,
        stop: impl Fn(Vertex) -> bool,
    ) -> Result<Vec<Vertex>> {
        let mut run = vec![from];
        let mut seen = HashSet::from([from]);
        let mut current = from;
        while current != list.end && !stop(current) {
            match self.next(parent, current) {
                [one] => {
                    current = one.successor;
                    if !seen.insert(current) {
                        return Err(malformed(Some(parent), Malformation::Cycle { at: current }));
                    }
                    run.push(current);
                }
                [] => return Err(self.missing_link(parent, list, current)),
                _ => break,
            }
        }
        Ok(run)
    }

    /// Split a fork into two runs that end where they meet again.
    fn split_runs(
        &self,
        parent: Vertex,
        list: ChildList,
        a: Pcs,
        b: Pcs,
    ) -> Result<(ListConflict, Vertex)> {
        let first = self.run(parent, list, a.successor, |_| false)?;
        let on_first: HashSet<Vertex> = first.iter().copied().collect();
        let second = self.run(parent, list, b.successor, |v| on_first.contains(&v))?;

        let join = second
            .last()
            .copied()
            .filter(|v| on_first.contains(v))
            .ok_or_else(|| {
                malformed(
                    Some(parent),
                    Malformation::UnresolvedInconsistency { after: a.child },
                )
            })?;

        let nodes_before = |run: &[Vertex]| -> Vec<NodeId> {
            run.iter()
                .take_while(|v| **v != join)
                .filter_map(|v| v.node())
                .collect()
        };

        let conflict = ListConflict {
            alternatives: [
                Alternative {
                    relation: a,
                    nodes: nodes_before(&first),
                },
                Alternative {
                    relation: b,
                    nodes: nodes_before(&second),
                },
            ],
        };
        Ok((conflict, join))
    }
}
