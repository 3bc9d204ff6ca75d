//! Tree-sitter CST parser integration.
//!
//! Source code is parsed with tree-sitter and copied into the shared
//! [`NodeArena`]. Every node is kept, named or anonymous, so punctuation and
//! keywords (commas, semicolons, braces) are ordinary children. That way an
//! inserted list element brings its own separator along and the printer never
//! has to synthesize one.
//!
//! Named leaves (identifiers, literals, comments) carry their source text as a
//! label; that label is what the merge treats as node content. Anonymous
//! tokens are fully described by their kind and have no label.

use thiserror::Error;

use crate::types::{Branch, Language, NodeArena, NodeId};

/// Parse source code into the arena, returning the root of the new tree.
pub fn parse_into(
    arena: &mut NodeArena,
    source: &str,
    lang: Language,
    branch: Branch,
) -> Result<NodeId, ParseError> {
    let ts_lang = get_tree_sitter_language(lang);
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&ts_lang)
        .map_err(|e| ParseError::LanguageError(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or(ParseError::ParseFailed)?;

    let root = tree.root_node();
    if root.has_error() {
        let at = first_error(&root).unwrap_or(root);
        let pos = at.start_position();
        return Err(ParseError::Syntax {
            branch,
            row: pos.row + 1,
            column: pos.column + 1,
        });
    }

    let id = ts_node_to_arena(arena, &root, source.as_bytes(), branch, None);
    tracing::debug!(%branch, nodes = arena.size(id), "parsed tree");
    Ok(id)
}

/// Recursively copy a tree-sitter node and its children into the arena.
fn ts_node_to_arena(
    arena: &mut NodeArena,
    node: &tree_sitter::Node,
    source: &[u8],
    branch: Branch,
    parent: Option<NodeId>,
) -> NodeId {
    // An empty file's root is a childless named node but has no content.
    let label = if node.child_count() == 0 && node.is_named() && parent.is_some() {
        Some(node.utf8_text(source).unwrap_or("").to_string())
    } else {
        None
    };

    let id = arena.alloc(node.kind(), label, node.byte_range(), branch, parent);

    let mut cursor = node.walk();
    let children: Vec<tree_sitter::Node> = node.children(&mut cursor).collect();
    for child in &children {
        ts_node_to_arena(arena, child, source, branch, Some(id));
    }
    id
}

/// Locate the first ERROR or MISSING node for error reporting.
fn first_error<'t>(node: &tree_sitter::Node<'t>) -> Option<tree_sitter::Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(*node);
    }
    let mut cursor = node.walk();
    let children: Vec<tree_sitter::Node<'t>> = node.children(&mut cursor).collect();
    children
        .iter()
        .filter(|c| c.has_error())
        .find_map(|c| first_error(c))
}

/// Get the tree-sitter Language object for a given language.
fn get_tree_sitter_language(lang: Language) -> tree_sitter::Language {
    let lang_ref = match lang {
        Language::Rust => tree_sitter_rust::LANGUAGE,
        Language::JavaScript => tree_sitter_javascript::LANGUAGE,
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
        Language::Python => tree_sitter_python::LANGUAGE,
        Language::Java => tree_sitter_java::LANGUAGE,
        Language::Go => tree_sitter_go::LANGUAGE,
        Language::C => tree_sitter_c::LANGUAGE,
        Language::Cpp => tree_sitter_cpp::LANGUAGE,
    };
    lang_ref.into()
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("language error: {0}")]
    LanguageError(String),
    #[error("parse failed")]
    ParseFailed,
    #[error("syntax error in {branch} at line {row}, column {column}")]
    Syntax {
        branch: Branch,
        row: usize,
        column: usize,
    },
}
