//! Rendering a [`MergedTree`] back to source text.
//!
//! The merged tree mixes nodes from all three revisions, so whitespace is
//! taken from wherever each leaf came from: every leaf carries the text that
//! preceded it in its own revision. Labeled leaves print their merged
//! content; everything else prints its source slice verbatim.
//!
//! A content conflict covers the whole line it sits on: each side of the
//! block is that line as it reads with one side's content.

use std::cell::Cell;
use std::collections::HashMap;
use std::ops::Range;

use crate::changeset::ChangeSet;
use crate::decoder::{ListConflict, MergedTree, Slot};
use crate::types::{Branch, MergeScenario, NodeArena, NodeId};

/// Conflict marker labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterConfig {
    pub left_label: String,
    pub right_label: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            left_label: "LEFT".to_string(),
            right_label: "RIGHT".to_string(),
        }
    }
}

pub struct Printer<'a> {
    arena: &'a NodeArena,
    sources: MergeScenario<&'a str>,
    /// Text between the previous leaf of the same revision and this leaf.
    gaps: HashMap<NodeId, Range<usize>>,
    /// Text after the last leaf of each revision.
    trailing: MergeScenario<Range<usize>>,
    config: PrinterConfig,
}

/// Per-print state shared by the recursive walk.
struct Render<'p> {
    tree: &'p MergedTree,
    merged: &'p ChangeSet,
    left: &'p ChangeSet,
    /// Set right after a list conflict block, which already ends its line.
    after_block: Cell<bool>,
    /// Revision of the leaf printed last.
    last_branch: Cell<Option<Branch>>,
}

/// Text printed so far. Content conflicts stay apart until the line they
/// sit on is complete.
#[derive(Debug, Default)]
struct Output {
    chunks: Vec<Chunk>,
}

#[derive(Debug)]
enum Chunk {
    Text(String),
    Choice { left: String, right: String },
}

impl Output {
    fn push_str(&mut self, text: &str) {
        match self.chunks.last_mut() {
            Some(Chunk::Text(last)) => last.push_str(text),
            _ => self.chunks.push(Chunk::Text(text.to_string())),
        }
    }

    fn push_choice(&mut self, left: &str, right: &str) {
        self.chunks.push(Chunk::Choice {
            left: left.to_string(),
            right: right.to_string(),
        });
    }

    /// Drop trailing blanks and end the current line, unless at its start.
    fn break_line(&mut self) {
        while let Some(Chunk::Text(last)) = self.chunks.last_mut() {
            let kept = last.trim_end_matches([' ', '\t']).len();
            last.truncate(kept);
            if !last.is_empty() {
                break;
            }
            self.chunks.pop();
        }
        let open_line = match self.chunks.last() {
            Some(Chunk::Text(last)) => !last.ends_with('\n'),
            Some(Chunk::Choice { .. }) => true,
            None => false,
        };
        if open_line {
            self.push_str("\n");
        }
    }
}

impl<'a> Printer<'a> {
    pub fn new(
        arena: &'a NodeArena,
        roots: &MergeScenario<NodeId>,
        sources: MergeScenario<&'a str>,
        config: PrinterConfig,
    ) -> Self {
        let mut gaps = HashMap::new();
        let trailing = roots.clone().map(|branch, root| {
            let source = sources.get(branch);
            let mut prev_end = 0;
            for leaf in arena.leaves(root) {
                let range = &arena.get(leaf).range;
                let start = range.start.max(prev_end);
                gaps.insert(leaf, prev_end..start);
                prev_end = range.end.max(prev_end);
            }
            prev_end.min(source.len())..source.len()
        });

        Self {
            arena,
            sources,
            gaps,
            trailing,
            config,
        }
    }

    /// Render the merged tree. `change_sets` decides which side of a
    /// conflict is shown as left.
    pub fn print(
        &self,
        tree: &MergedTree,
        merged: &ChangeSet,
        change_sets: &MergeScenario<ChangeSet>,
    ) -> String {
        let render = Render {
            tree,
            merged,
            left: &change_sets.left,
            after_block: Cell::new(false),
            last_branch: Cell::new(None),
        };
        let mut out = Output::default();
        self.print_node(tree.root, &render, &mut out);

        // The file ends the way the revision of its last leaf ends.
        let branch = render
            .last_branch
            .get()
            .unwrap_or(self.arena.get(tree.root).branch);
        let trailing = self.slice(branch, self.trailing.get(branch));
        if render.after_block.get() {
            out.push_str(trailing.strip_prefix('\n').unwrap_or(trailing));
        } else {
            out.push_str(trailing);
        }
        self.lay_out(out)
    }

    fn slice(&self, branch: Branch, range: &Range<usize>) -> &'a str {
        self.sources.get(branch).get(range.clone()).unwrap_or("")
    }

    fn print_node(&self, node: NodeId, render: &Render<'_>, out: &mut Output) {
        let slots = render.tree.children(node);
        // An empty root can gain children in the merge.
        if slots.is_empty() && self.arena.get(node).is_leaf() {
            self.print_leaf(node, render, out);
            return;
        }
        for slot in slots {
            match slot {
                Slot::Node(child) => self.print_node(*child, render, out),
                Slot::Conflict(conflict) => self.print_list_conflict(conflict, render, out),
            }
        }
    }

    fn print_leaf(&self, node: NodeId, render: &Render<'_>, out: &mut Output) {
        let data = self.arena.get(node);
        render.last_branch.set(Some(data.branch));
        if let Some(gap) = self.gaps.get(&node) {
            let gap = self.slice(data.branch, gap);
            if render.after_block.replace(false) {
                out.push_str(gap.strip_prefix('\n').unwrap_or(gap));
            } else {
                out.push_str(gap);
            }
        }

        let own_text = self.slice(data.branch, &data.range);
        if data.label.is_none() {
            out.push_str(own_text);
            return;
        }

        match render.merged.content_for(node).first() {
            Some(tuple) => match render.merged.content_partner(tuple) {
                Some(rival) => {
                    let (left, right) = if render.left.contains_content(tuple) {
                        (tuple, rival)
                    } else {
                        (rival, tuple)
                    };
                    out.push_choice(&left.content, &right.content);
                }
                None => out.push_str(&tuple.content),
            },
            None => out.push_str(own_text),
        }
    }

    fn print_list_conflict(&self, conflict: &ListConflict, render: &Render<'_>, out: &mut Output) {
        let [first, second] = &conflict.alternatives;
        let (left, right) = if render.left.contains_pcs(&first.relation) {
            (first, second)
        } else {
            (second, first)
        };

        let side = |nodes: &[NodeId]| {
            let mut side = Output::default();
            for node in nodes {
                self.print_node(*node, render, &mut side);
            }
            self.lay_out(side)
        };
        let left_text = side(&left.nodes);
        let right_text = side(&right.nodes);

        out.break_line();
        let mut block = String::new();
        self.write_block(&mut block, &left_text, &right_text);
        out.push_str(&block);
        render.after_block.set(true);
    }

    /// Flatten printed text, turning every line that holds a content
    /// conflict into a conflict block of two whole lines.
    fn lay_out(&self, output: Output) -> String {
        let mut out = String::new();
        let mut open: Option<(String, String)> = None;
        for chunk in output.chunks {
            match chunk {
                Chunk::Choice { left, right } => {
                    let (l, r) = open.get_or_insert_with(|| {
                        let line_start = out.rfind('\n').map_or(0, |i| i + 1);
                        let prefix = out.split_off(line_start);
                        (prefix.clone(), prefix)
                    });
                    l.push_str(&left);
                    r.push_str(&right);
                }
                Chunk::Text(text) => match open.take() {
                    None => out.push_str(&text),
                    Some((mut l, mut r)) => match text.split_once('\n') {
                        Some((line_end, rest)) => {
                            l.push_str(line_end);
                            r.push_str(line_end);
                            self.write_block(&mut out, &l, &r);
                            out.push_str(rest);
                        }
                        None => {
                            l.push_str(&text);
                            r.push_str(&text);
                            open = Some((l, r));
                        }
                    },
                },
            }
        }
        if let Some((l, r)) = open {
            self.write_block(&mut out, &l, &r);
        }
        out
    }

    /// Append a conflict block; `out` must be at the start of a line.
    fn write_block(&self, out: &mut String, left: &str, right: &str) {
        out.push_str("<<<<<<< ");
        out.push_str(&self.config.left_label);
        out.push('\n');
        push_side(out, left);
        out.push_str("=======\n");
        push_side(out, right);
        out.push_str(">>>>>>> ");
        out.push_str(&self.config.right_label);
        out.push('\n');
    }
}

fn push_side(out: &mut String, text: &str) {
    let text = text.trim_start_matches(['\n', '\r']);
    if text.is_empty() {
        return;
    }
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::structured_merge;
    use crate::matcher::TriMatching;
    use crate::parser::parse_into;
    use crate::types::Language;

    fn merge_java(base: &str, left: &str, right: &str, config: PrinterConfig) -> String {
        let mut arena = NodeArena::new();
        let sources = MergeScenario::new(base, left, right);
        let roots = MergeScenario::new(
            parse_into(&mut arena, base, Language::Java, Branch::Base).unwrap(),
            parse_into(&mut arena, left, Language::Java, Branch::Left).unwrap(),
            parse_into(&mut arena, right, Language::Java, Branch::Right).unwrap(),
        );
        let matchings = TriMatching::compute(&arena, &roots);
        let result = structured_merge(&arena, &roots, &matchings).unwrap();
        let printer = Printer::new(&arena, &roots, sources, config);
        printer.print(&result.tree, &result.merged, &result.change_sets)
    }

    #[test]
    fn test_unchanged_file_prints_verbatim() {
        let src = "// header\npackage a;\n\nclass A {\n    int x = 1;   // note\n\n    void f() { g(x, 2); }\n}\n";
        assert_eq!(merge_java(src, src, src, PrinterConfig::default()), src);
    }

    #[test]
    fn test_rename_in_one_branch_is_printed() {
        let base = "class A {\n    int x;\n}\n";
        let right = "class A {\n    int z;\n}\n";
        let out = merge_java(base, base, right, PrinterConfig::default());
        assert_eq!(out, right);
    }

    #[test]
    fn test_conflicting_renames_cover_the_whole_line() {
        let out = merge_java(
            "class A { int x; }",
            "class A { int y; }",
            "class A { int z; }",
            PrinterConfig::default(),
        );
        assert_eq!(
            out,
            "<<<<<<< LEFT\nclass A { int y; }\n=======\nclass A { int z; }\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn test_content_conflict_keeps_surrounding_lines() {
        let base = "class A {\n    int x;\n    int w;\n}\n";
        let left = "class A {\n    int y;\n    int w;\n}\n";
        let right = "class A {\n    int z;\n    int w;\n}\n";
        let out = merge_java(base, left, right, PrinterConfig::default());
        assert_eq!(
            out,
            "class A {\n<<<<<<< LEFT\n    int y;\n=======\n    int z;\n>>>>>>> RIGHT\n    int w;\n}\n"
        );
    }

    #[test]
    fn test_lay_out_joins_conflicts_on_one_line() {
        let mut arena = NodeArena::new();
        let root = arena.alloc("module", None, 0..0, Branch::Base, None);
        let printer = Printer::new(
            &arena,
            &MergeScenario::new(root, root, root),
            MergeScenario::new("", "", ""),
            PrinterConfig::default(),
        );
        let mut out = Output::default();
        out.push_str("a\n  g(");
        out.push_choice("x", "y");
        out.push_str(", ");
        out.push_choice("1", "2");
        out.push_str(");\nb\n");
        assert_eq!(
            printer.lay_out(out),
            "a\n<<<<<<< LEFT\n  g(x, 1);\n=======\n  g(y, 2);\n>>>>>>> RIGHT\nb\n"
        );
    }

    #[test]
    fn test_break_line_trims_blanks() {
        let mut out = Output::default();
        out.push_str("x;   ");
        out.break_line();
        out.push_str("next");
        let mut at_start = Output::default();
        at_start.push_str("x;\n    ");
        at_start.break_line();
        let text = |o: Output| match o.chunks.as_slice() {
            [Chunk::Text(t)] => t.clone(),
            other => panic!("unexpected chunks {:?}", other),
        };
        assert_eq!(text(out), "x;\nnext");
        assert_eq!(text(at_start), "x;\n");
    }

    #[test]
    fn test_marker_labels_are_configurable() {
        let config = PrinterConfig {
            left_label: "ours".to_string(),
            right_label: "theirs".to_string(),
        };
        let out = merge_java(
            "class A { int x; }",
            "class A { int y; }",
            "class A { int z; }",
            config,
        );
        assert!(out.contains("<<<<<<< ours\n"));
        assert!(out.contains(">>>>>>> theirs\n"));
    }

    #[test]
    fn test_push_side_normalizes_newlines() {
        let mut out = String::new();
        push_side(&mut out, "\n    int y;");
        push_side(&mut out, "");
        assert_eq!(out, "    int y;\n");
    }
}
