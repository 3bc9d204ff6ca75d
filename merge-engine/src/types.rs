//! Core types for the merge engine.
//!
//! All three revisions of a file (base, left, right) are parsed into a single
//! [`NodeArena`]. A node is identified by its arena index, and that index is
//! the only notion of equality the merge algorithm uses: two nodes with the
//! same kind and text are still different nodes unless a matching says they
//! correspond.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Unique identifier for a tree node within a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which revision a node was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Base,
    Left,
    Right,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Base => write!(f, "base"),
            Branch::Left => write!(f, "left"),
            Branch::Right => write!(f, "right"),
        }
    }
}

/// A syntax tree node.
///
/// `label` is only present for nodes whose text is not implied by their kind
/// (identifiers, literals, comments). Punctuation and keywords have no label.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: String,
    pub label: Option<String>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub range: Range<usize>,
    pub branch: Branch,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The text used when comparing leaves: the label, or the kind for
    /// anonymous tokens.
    pub fn token(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.kind)
    }
}

/// Arena holding the nodes of every tree taking part in a merge.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and, when `parent` is given, append it to the
    /// parent's children.
    pub fn alloc(
        &mut self,
        kind: impl Into<String>,
        label: Option<String>,
        range: Range<usize>,
        branch: Branch,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: kind.into(),
            label,
            children: Vec::new(),
            parent,
            range,
            branch,
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes of the subtree rooted at `root`, parents before children,
    /// level by level.
    pub fn breadth_first(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.children(id).iter().copied());
        }
        order
    }

    /// Nodes of the subtree rooted at `root` in document (pre-)order.
    pub fn pre_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Leaves of the subtree rooted at `root`, left to right.
    pub fn leaves(&self, root: NodeId) -> Vec<NodeId> {
        self.pre_order(root)
            .into_iter()
            .filter(|id| self.get(*id).is_leaf())
            .collect()
    }

    /// Leaf tokens of a subtree, used for similarity scoring.
    pub fn leaf_tokens(&self, root: NodeId) -> Vec<&str> {
        self.leaves(root)
            .into_iter()
            .map(|id| self.get(id).token())
            .collect()
    }

    /// Total number of nodes in the subtree rooted at `root`.
    pub fn size(&self, root: NodeId) -> usize {
        1 + self
            .children(root)
            .iter()
            .map(|c| self.size(*c))
            .sum::<usize>()
    }
}

/// The three-way merge scenario: base, left, and right revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeScenario<T> {
    pub base: T,
    pub left: T,
    pub right: T,
}

impl<T> MergeScenario<T> {
    pub fn new(base: T, left: T, right: T) -> Self {
        Self { base, left, right }
    }

    pub fn get(&self, branch: Branch) -> &T {
        match branch {
            Branch::Base => &self.base,
            Branch::Left => &self.left,
            Branch::Right => &self.right,
        }
    }

    pub fn as_ref(&self) -> MergeScenario<&T> {
        MergeScenario::new(&self.base, &self.left, &self.right)
    }

    pub fn map<U>(self, mut f: impl FnMut(Branch, T) -> U) -> MergeScenario<U> {
        MergeScenario {
            base: f(Branch::Base, self.base),
            left: f(Branch::Left, self.left),
            right: f(Branch::Right, self.right),
        }
    }
}

/// Supported programming languages for tree-sitter parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    JavaScript,
    TypeScript,
    Python,
    Java,
    Go,
    C,
    Cpp,
}

impl Language {
    /// Infer language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(Language::Rust),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" => Some(Language::TypeScript),
            "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            "go" => Some(Language::Go),
            "c" | "h" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Parse a language name as written in settings or on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rust" => Some(Language::Rust),
            "javascript" | "js" => Some(Language::JavaScript),
            "typescript" | "ts" => Some(Language::TypeScript),
            "python" | "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            "go" => Some(Language::Go),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// block(a, inner(b, c), d)
    fn sample(arena: &mut NodeArena) -> NodeId {
        let root = arena.alloc("block", None, 0..10, Branch::Base, None);
        arena.alloc("ident", Some("a".into()), 0..1, Branch::Base, Some(root));
        let inner = arena.alloc("inner", None, 2..6, Branch::Base, Some(root));
        arena.alloc("ident", Some("b".into()), 2..3, Branch::Base, Some(inner));
        arena.alloc("ident", Some("c".into()), 4..5, Branch::Base, Some(inner));
        arena.alloc(";", None, 9..10, Branch::Base, Some(root));
        root
    }

    #[test]
    fn test_alloc_links_parent_and_children() {
        let mut arena = NodeArena::new();
        let root = sample(&mut arena);
        assert_eq!(arena.children(root).len(), 3);
        let inner = arena.children(root)[1];
        assert_eq!(arena.parent(inner), Some(root));
        assert_eq!(arena.parent(root), None);
    }

    #[test]
    fn test_breadth_first_visits_parents_first() {
        let mut arena = NodeArena::new();
        let root = sample(&mut arena);
        let kinds: Vec<&str> = arena
            .breadth_first(root)
            .into_iter()
            .map(|id| arena.get(id).token())
            .collect();
        assert_eq!(kinds, vec!["block", "a", "inner", ";", "b", "c"]);
    }

    #[test]
    fn test_pre_order_and_leaves() {
        let mut arena = NodeArena::new();
        let root = sample(&mut arena);
        assert_eq!(arena.pre_order(root).len(), 6);
        assert_eq!(arena.leaf_tokens(root), vec!["a", "b", "c", ";"]);
        assert_eq!(arena.size(root), 6);
    }

    #[test]
    fn test_language_lookup() {
        assert_eq!(Language::from_extension("java"), Some(Language::Java));
        assert_eq!(Language::from_name("C++"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("txt"), None);
    }
}
