//! Tree matching for three-way structured merge.
//!
//! Produces the pairwise node correspondences the class-representative step
//! consumes. Every [`Matching`] is one-to-one and is built in three phases:
//!
//! 1. **Identical subtrees**: inner subtrees with the same shape and labels
//!    are matched wholesale, largest first, wherever they sit in the two
//!    trees. Reordered or moved statements are found here, before any
//!    position-based pairing can mistake them for their neighbours.
//! 2. **Roots**: the two roots correspond whenever their kinds agree, even
//!    when one of them is an empty file.
//! 3. **Recovery**: below every matched pair the children still unmatched
//!    are aligned, exact matches first. With [`Tolerance::Relabel`] a second
//!    pass accepts renamed leaves, and inner nodes that either differ only in
//!    leaf labels or whose leaf tokens are at least [`MIN_INNER_SIMILARITY`]
//!    alike.
//!    - **Ordered children**: Yang's algorithm (dynamic programming, O(n·m)).
//!    - **Unordered children** (imports, class members): bipartite maximum
//!      weight matching via the Hungarian algorithm (O(n³)).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use similar::TextDiff;

use crate::types::{MergeScenario, NodeArena, NodeId};

/// Ordering semantics for a node's child list.
/// Unordered lists (e.g., import blocks, class members) can be freely permuted
/// without changing program semantics, so their children are matched without
/// regard to position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOrdering {
    Ordered,
    Unordered,
}

/// How far recovery may stray from exact equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    /// Renamed leaves and similar inner nodes may match. Used against base,
    /// where such a pair is one node that was edited.
    Relabel,
    /// Only identical subtrees match. Used between left and right, where two
    /// different nodes are two independent insertions.
    Exact,
}

/// Score for two leaves with identical tokens.
const EXACT_LEAF_SCORE: usize = 4;

/// Minimum Dice coefficient of the leaf tokens of two inner nodes for
/// recovery to treat them as the same node.
pub const MIN_INNER_SIMILARITY: f64 = 0.5;

/// A partial one-to-one correspondence between the nodes of a source tree and
/// a destination tree, queryable from either side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matching {
    src_to_dst: HashMap<NodeId, NodeId>,
    dst_to_src: HashMap<NodeId, NodeId>,
}

impl Matching {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `src` corresponds to `dst`. Both sides must be unmatched.
    pub fn insert(&mut self, src: NodeId, dst: NodeId) {
        debug_assert!(!self.src_to_dst.contains_key(&src), "{} already matched", src);
        debug_assert!(!self.dst_to_src.contains_key(&dst), "{} already matched", dst);
        self.src_to_dst.insert(src, dst);
        self.dst_to_src.insert(dst, src);
    }

    pub fn dst_for_src(&self, src: NodeId) -> Option<NodeId> {
        self.src_to_dst.get(&src).copied()
    }

    pub fn src_for_dst(&self, dst: NodeId) -> Option<NodeId> {
        self.dst_to_src.get(&dst).copied()
    }

    pub fn is_src_matched(&self, src: NodeId) -> bool {
        self.src_to_dst.contains_key(&src)
    }

    pub fn is_dst_matched(&self, dst: NodeId) -> bool {
        self.dst_to_src.contains_key(&dst)
    }

    pub fn len(&self) -> usize {
        self.src_to_dst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src_to_dst.is_empty()
    }
}

/// The three pairwise matchings a three-way merge needs.
#[derive(Debug, Clone, Default)]
pub struct TriMatching {
    pub base_left: Matching,
    pub base_right: Matching,
    pub left_right: Matching,
}

impl TriMatching {
    /// Match base→left and base→right tolerating edits, and left→right
    /// exactly.
    pub fn compute(arena: &NodeArena, roots: &MergeScenario<NodeId>) -> Self {
        let tri = Self {
            base_left: match_trees(arena, roots.base, roots.left),
            base_right: match_trees(arena, roots.base, roots.right),
            left_right: match_trees_with(arena, roots.left, roots.right, Tolerance::Exact),
        };
        tracing::debug!(
            base_left = tri.base_left.len(),
            base_right = tri.base_right.len(),
            left_right = tri.left_right.len(),
            "computed matchings"
        );
        tri
    }
}

/// Structural hash and height of every node of one tree. Two subtrees with
/// equal hashes have the same shape, kinds and labels.
struct Signatures {
    hash: HashMap<NodeId, u64>,
    height: HashMap<NodeId, usize>,
}

impl Signatures {
    fn compute(arena: &NodeArena, root: NodeId) -> Self {
        let mut sigs = Self {
            hash: HashMap::new(),
            height: HashMap::new(),
        };
        for node in arena.pre_order(root).into_iter().rev() {
            let data = arena.get(node);
            let mut hasher = DefaultHasher::new();
            data.kind.hash(&mut hasher);
            data.label.hash(&mut hasher);
            let mut height = 1;
            for child in &data.children {
                sigs.hash[child].hash(&mut hasher);
                height = height.max(sigs.height[child] + 1);
            }
            sigs.hash.insert(node, hasher.finish());
            sigs.height.insert(node, height);
        }
        sigs
    }
}

/// The signatures of both trees taking part in one matching.
struct Pair<'a> {
    arena: &'a NodeArena,
    src: Signatures,
    dst: Signatures,
}

impl Pair<'_> {
    fn identical(&self, src: NodeId, dst: NodeId) -> bool {
        match (self.src.hash.get(&src), self.dst.hash.get(&dst)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Match two trees, tolerating renames.
pub fn match_trees(arena: &NodeArena, src: NodeId, dst: NodeId) -> Matching {
    match_trees_with(arena, src, dst, Tolerance::Relabel)
}

pub fn match_trees_with(
    arena: &NodeArena,
    src: NodeId,
    dst: NodeId,
    tolerance: Tolerance,
) -> Matching {
    let pair = Pair {
        arena,
        src: Signatures::compute(arena, src),
        dst: Signatures::compute(arena, dst),
    };
    let mut matching = Matching::new();

    match_identical_subtrees(&pair, src, dst, &mut matching);
    if !matching.is_src_matched(src)
        && !matching.is_dst_matched(dst)
        && arena.get(src).kind == arena.get(dst).kind
    {
        matching.insert(src, dst);
    }
    for node in arena.pre_order(src) {
        if let Some(other) = matching.dst_for_src(node) {
            recover_children(&pair, node, other, tolerance, &mut matching);
        }
    }
    matching
}

/// Greedily match identical inner subtrees, largest first. A subtree that is
/// unique on both sides is matched outright; ambiguous ones go first to
/// candidates whose parents are already matched to each other, then in
/// document order to candidates whose parents have the same kind.
fn match_identical_subtrees(pair: &Pair<'_>, src: NodeId, dst: NodeId, matching: &mut Matching) {
    let arena = pair.arena;
    let groups = |root: NodeId, sigs: &Signatures| {
        let mut groups: HashMap<u64, Vec<NodeId>> = HashMap::new();
        for node in arena.pre_order(root) {
            if sigs.height[&node] >= 2 {
                groups.entry(sigs.hash[&node]).or_default().push(node);
            }
        }
        groups
    };
    let src_groups = groups(src, &pair.src);
    let dst_groups = groups(dst, &pair.dst);

    let mut keys: Vec<(usize, NodeId, u64)> = src_groups
        .iter()
        .filter(|(hash, _)| dst_groups.contains_key(*hash))
        .map(|(hash, nodes)| (arena.size(nodes[0]), nodes[0], *hash))
        .collect();
    keys.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, _, hash) in keys {
        let srcs: Vec<NodeId> = src_groups[&hash]
            .iter()
            .copied()
            .filter(|n| !matching.is_src_matched(*n))
            .collect();
        let dsts: Vec<NodeId> = dst_groups[&hash]
            .iter()
            .copied()
            .filter(|n| !matching.is_dst_matched(*n))
            .collect();

        if let ([s], [d]) = (srcs.as_slice(), dsts.as_slice()) {
            match_subtree(arena, *s, *d, matching);
            continue;
        }

        for s in &srcs {
            let Some(parent) = arena.parent(*s).and_then(|p| matching.dst_for_src(p)) else {
                continue;
            };
            if let Some(d) = dsts
                .iter()
                .find(|d| !matching.is_dst_matched(**d) && arena.parent(**d) == Some(parent))
            {
                match_subtree(arena, *s, *d, matching);
            }
        }

        let parent_kind = |n: NodeId| arena.parent(n).map(|p| arena.get(p).kind.as_str());
        for s in &srcs {
            if matching.is_src_matched(*s) {
                continue;
            }
            if let Some(d) = dsts
                .iter()
                .find(|d| !matching.is_dst_matched(**d) && parent_kind(**d) == parent_kind(*s))
            {
                match_subtree(arena, *s, *d, matching);
            }
        }
    }
}

/// Match two isomorphic subtrees node by node.
fn match_subtree(arena: &NodeArena, src: NodeId, dst: NodeId, matching: &mut Matching) {
    for (s, d) in arena.pre_order(src).into_iter().zip(arena.pre_order(dst)) {
        if !matching.is_src_matched(s) && !matching.is_dst_matched(d) {
            matching.insert(s, d);
        }
    }
}

/// Align the unmatched children of a matched pair.
fn recover_children(
    pair: &Pair<'_>,
    src: NodeId,
    dst: NodeId,
    tolerance: Tolerance,
    matching: &mut Matching,
) {
    let arena = pair.arena;
    let ordering = classify_ordering(&arena.get(src).kind);

    let (src_free, dst_free) = free_children(arena, src, dst, matching);
    if src_free.is_empty() || dst_free.is_empty() {
        return;
    }
    let exact = |a: NodeId, b: NodeId| {
        if pair.identical(a, b) { EXACT_LEAF_SCORE } else { 0 }
    };
    for (s, d) in align(ordering, &src_free, &dst_free, exact) {
        match_subtree(arena, s, d, matching);
    }

    if tolerance == Tolerance::Exact {
        return;
    }
    let (src_free, dst_free) = free_children(arena, src, dst, matching);
    if src_free.is_empty() || dst_free.is_empty() {
        return;
    }
    for (s, d) in align(ordering, &src_free, &dst_free, |a, b| {
        tree_similarity(arena, a, b)
    }) {
        matching.insert(s, d);
    }
}

fn free_children(
    arena: &NodeArena,
    src: NodeId,
    dst: NodeId,
    matching: &Matching,
) -> (Vec<NodeId>, Vec<NodeId>) {
    let src_free = arena
        .children(src)
        .iter()
        .copied()
        .filter(|c| !matching.is_src_matched(*c))
        .collect();
    let dst_free = arena
        .children(dst)
        .iter()
        .copied()
        .filter(|c| !matching.is_dst_matched(*c))
        .collect();
    (src_free, dst_free)
}

fn align(
    ordering: ListOrdering,
    src: &[NodeId],
    dst: &[NodeId],
    score: impl Fn(NodeId, NodeId) -> usize,
) -> Vec<(NodeId, NodeId)> {
    match ordering {
        ListOrdering::Ordered => yang_match(src, dst, score),
        ListOrdering::Unordered => bipartite_match(src, dst, score),
    }
}

/// Determine if a node kind holds an unordered collection.
/// Import blocks and class member lists are unordered because their children
/// can be permuted without affecting semantics.
pub fn classify_ordering(kind: &str) -> ListOrdering {
    match kind {
        "use_declaration_list" | "import_list" | "imports" => ListOrdering::Unordered,
        "class_body" | "enum_body" | "interface_body" | "declaration_list" => {
            ListOrdering::Unordered
        }
        _ => ListOrdering::Ordered,
    }
}

/// Yang's algorithm for ordered sequence matching.
///
/// Dynamic programming over the two child sequences, maximizing the summed
/// score of matched pairs (a weighted LCS). Pairs scoring zero never match.
/// Reference: Yang (1991), "Identifying Syntactic Differences Between Two Programs"
fn yang_match(
    left: &[NodeId],
    right: &[NodeId],
    score: impl Fn(NodeId, NodeId) -> usize,
) -> Vec<(NodeId, NodeId)> {
    let n = left.len();
    let m = right.len();

    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    let mut choice = vec![vec![0u8; m + 1]; n + 1]; // 1=match, 2=skip-left, 3=skip-right

    for i in 1..=n {
        for j in 1..=m {
            let pair_score = score(left[i - 1], right[j - 1]);
            let match_score = if pair_score > 0 { dp[i - 1][j - 1] + pair_score } else { 0 };
            let skip_left = dp[i - 1][j];
            let skip_right = dp[i][j - 1];

            if match_score > 0 && match_score >= skip_left && match_score >= skip_right {
                dp[i][j] = match_score;
                choice[i][j] = 1;
            } else if skip_left >= skip_right {
                dp[i][j] = skip_left;
                choice[i][j] = 2;
            } else {
                dp[i][j] = skip_right;
                choice[i][j] = 3;
            }
        }
    }

    let mut pairs = Vec::new();
    let mut i = n;
    let mut j = m;
    while i > 0 && j > 0 {
        match choice[i][j] {
            1 => {
                pairs.push((left[i - 1], right[j - 1]));
                i -= 1;
                j -= 1;
            }
            2 => i -= 1,
            3 => j -= 1,
            _ => break,
        }
    }

    pairs.reverse();
    pairs
}

/// Bipartite maximum weight matching for unordered children.
///
/// Reference: Kuhn-Munkres; LASTMERGE (2025), JDime (Apel et al.)
fn bipartite_match(
    left: &[NodeId],
    right: &[NodeId],
    score: impl Fn(NodeId, NodeId) -> usize,
) -> Vec<(NodeId, NodeId)> {
    let n = left.len();
    let m = right.len();
    let size = n.max(m);
    let mut weights = vec![vec![0i64; size]; size];

    for (i, l) in left.iter().enumerate() {
        for (j, r) in right.iter().enumerate() {
            weights[i][j] = score(*l, *r) as i64;
        }
    }

    let assignment = hungarian_max(&weights, size);

    let mut pairs: Vec<(NodeId, NodeId)> = assignment
        .iter()
        .enumerate()
        .filter(|&(i, &j)| i < n && j < m && weights[i][j] > 0)
        .map(|(i, &j)| (left[i], right[j]))
        .collect();
    pairs.sort();
    pairs
}

/// Below the roots, nodes are only comparable when they have the same kind
/// and are both leaves or both inner nodes.
fn can_match(arena: &NodeArena, left: NodeId, right: NodeId) -> bool {
    let (l, r) = (arena.get(left), arena.get(right));
    l.is_leaf() == r.is_leaf() && l.kind == r.kind
}

/// Similarity score between two subtrees; zero means "do not match".
///
/// Identical leaves score [`EXACT_LEAF_SCORE`]; a relabelled leaf of the same
/// kind still scores at least one, more the closer the two labels are, so a
/// rename is seen as an update of the same node. Inner nodes score one plus
/// twice the LCS of their leaf tokens, provided they have the same shape or
/// the Dice coefficient of those tokens reaches [`MIN_INNER_SIMILARITY`].
pub fn tree_similarity(arena: &NodeArena, left: NodeId, right: NodeId) -> usize {
    if !can_match(arena, left, right) {
        return 0;
    }

    let (l, r) = (arena.get(left), arena.get(right));
    if l.is_leaf() {
        if l.token() == r.token() {
            EXACT_LEAF_SCORE
        } else {
            let ratio = TextDiff::from_chars(l.token(), r.token()).ratio();
            1 + (ratio * 2.0) as usize
        }
    } else {
        let left_leaves = arena.leaf_tokens(left);
        let right_leaves = arena.leaf_tokens(right);
        let common = lcs_length(&left_leaves, &right_leaves);
        let dice = 2.0 * common as f64 / (left_leaves.len() + right_leaves.len()) as f64;
        if dice >= MIN_INNER_SIMILARITY || same_shape(arena, left, right) {
            1 + 2 * common
        } else {
            0
        }
    }
}

/// Same kinds and child counts everywhere, labels aside.
fn same_shape(arena: &NodeArena, left: NodeId, right: NodeId) -> bool {
    let (a, b) = (arena.pre_order(left), arena.pre_order(right));
    a.len() == b.len()
        && a.iter().zip(&b).all(|(x, y)| {
            let (x, y) = (arena.get(*x), arena.get(*y));
            x.kind == y.kind && x.children.len() == y.children.len()
        })
}

/// Compute LCS length between two sequences.
fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let n = a.len();
    let m = b.len();
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in 1..=n {
        for j in 1..=m {
            dp[i][j] = if a[i - 1] == b[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    dp[n][m]
}

/// Simple Hungarian algorithm for maximum weight matching.
/// Converts to minimum cost by negating, then uses the standard algorithm.
fn hungarian_max(weights: &[Vec<i64>], n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }

    let max_w = weights
        .iter()
        .flat_map(|row| row.iter())
        .copied()
        .max()
        .unwrap_or(0);

    let mut cost = vec![vec![0i64; n]; n];
    for i in 0..n {
        for j in 0..n {
            cost[i][j] = max_w - weights[i][j];
        }
    }

    // Kuhn-Munkres algorithm
    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut p = vec![0usize; n + 1]; // p[j] = row assigned to col j
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![i64::MAX; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = i64::MAX;
            let mut j1 = 0usize;

            for j in 1..=n {
                if !used[j] {
                    let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    // result[i] = column assigned to row i
    let mut result = vec![0usize; n];
    for j in 1..=n {
        if p[j] > 0 {
            result[p[j] - 1] = j - 1;
        }
    }
    result
}
