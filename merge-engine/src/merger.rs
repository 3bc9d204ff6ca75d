//! Three-way merge of change sets.
//!
//! The merged set starts as the union of base, left and right and is then
//! cleaned in a single pass. A fact that contradicts another is dropped when
//! it comes from base (the other side changed it: a soft inconsistency) and
//! is kept and paired with its rival when neither is from base (both sides
//! changed it differently: a hard inconsistency).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::changeset::{ChangeSet, Pcs, Vertex};
use crate::error::{MergeError, Result};
use crate::types::NodeId;

/// Relations keyed by the vertices they mention as child or successor.
///
/// Any relation inconsistent with `P` shares a child or successor vertex
/// with `P`, so this is enough to find all candidates.
struct RelationIndex {
    by_vertex: HashMap<Vertex, Vec<Pcs>>,
}

impl RelationIndex {
    fn build(set: &ChangeSet) -> Self {
        let mut by_vertex: HashMap<Vertex, Vec<Pcs>> = HashMap::new();
        for pcs in set.relations() {
            by_vertex.entry(pcs.child).or_default().push(*pcs);
            if pcs.successor != pcs.child {
                by_vertex.entry(pcs.successor).or_default().push(*pcs);
            }
        }
        Self { by_vertex }
    }

    /// Relations still present in `merged` that contradict `pcs`.
    fn inconsistencies(&self, merged: &ChangeSet, pcs: &Pcs) -> BTreeSet<Pcs> {
        [pcs.child, pcs.successor]
            .iter()
            .filter_map(|v| self.by_vertex.get(v))
            .flatten()
            .filter(|other| merged.contains_pcs(other) && pcs.is_inconsistent_with(other))
            .copied()
            .collect()
    }
}

/// Merge three change sets into one whose remaining contradictions are all
/// hard inconsistencies.
pub fn merge(base: &ChangeSet, left: &ChangeSet, right: &ChangeSet) -> Result<ChangeSet> {
    let mut merged = ChangeSet::union(&[base, left, right]);
    let union_size = merged.size();
    tracing::debug!(
        pcs = union_size.pcs,
        content = union_size.content,
        "raw union of change sets"
    );

    let index = RelationIndex::build(&merged);
    let snapshot: Vec<Pcs> = merged.relations().copied().collect();
    let mut content_seen: HashSet<NodeId> = HashSet::new();

    for pcs in &snapshot {
        if merged.contains_pcs(pcs) {
            resolve_structure(&mut merged, base, &index, pcs);
        }
        // Content is settled per endpoint even when the relation was dropped.
        for node in pcs.endpoints().iter().filter_map(|v| v.node()) {
            if content_seen.insert(node) {
                resolve_content(&mut merged, base, node)?;
            }
        }
    }

    let size = merged.size();
    tracing::debug!(pcs = size.pcs, content = size.content, "merged change set");

    let hard_pcs = merged.hard_pcs_count();
    let hard_content = merged.hard_content_count();
    if hard_pcs > 0 || hard_content > 0 {
        tracing::warn!(hard_pcs, hard_content, "merge left hard inconsistencies");
    }
    Ok(merged)
}

fn resolve_structure(merged: &mut ChangeSet, base: &ChangeSet, index: &RelationIndex, pcs: &Pcs) {
    let others = index.inconsistencies(merged, pcs);
    if others.is_empty() {
        return;
    }

    if base.contains_pcs(pcs) {
        merged.remove_pcs(pcs);
        tracing::debug!(relation = %pcs, "dropped base relation");
        return;
    }

    for other in others {
        if base.contains_pcs(&other) {
            merged.remove_pcs(&other);
            tracing::debug!(relation = %other, "dropped base relation");
        } else {
            merged.mark_hard_pcs(*pcs, other);
            tracing::debug!(relation = %pcs, rival = %other, "hard structural inconsistency");
        }
    }
}

fn resolve_content(merged: &mut ChangeSet, base: &ChangeSet, node: NodeId) -> Result<()> {
    let tuples = merged.content_for(node);
    if tuples.len() <= 1 {
        return Ok(());
    }

    for tuple in tuples.iter().filter(|t| base.contains_content(t)) {
        merged.remove_content(tuple);
    }

    let remaining = merged.content_for(node);
    match remaining.as_slice() {
        [] | [_] => Ok(()),
        [a, b] => {
            merged.mark_hard_content(a, b);
            tracing::debug!(%node, left = %a.content, right = %b.content, "hard content inconsistency");
            Ok(())
        }
        _ => Err(MergeError::ContentConflictCardinality {
            node,
            found: remaining.len(),
        }),
    }
}
