//! Error types for the merge engine.
//!
//! These are invariant violations and input failures. Hard conflicts between
//! the two branches are not errors: they are recorded in the merged
//! [`ChangeSet`](crate::changeset::ChangeSet) and rendered by the printer.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::changeset::Vertex;
use crate::parser::ParseError;
use crate::types::NodeId;

/// Result type alias for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Debug, Error)]
pub enum MergeError {
    /// A node was looked up that the representative map does not cover.
    #[error("no class representative for node {0}")]
    RepresentativeNotFound(NodeId),

    /// The merged relation set cannot be turned back into a tree. `parent`
    /// is absent when the root itself cannot be determined.
    #[error(
        "malformed relation set{}: {kind}",
        .parent.map(|p| format!(" under {}", p)).unwrap_or_default()
    )]
    MalformedRelationSet {
        parent: Option<Vertex>,
        kind: Malformation,
    },

    /// More than one content tuple survived for a node, but not exactly two.
    #[error("node {node} has {found} competing content tuples, expected 2")]
    ContentConflictCardinality { node: NodeId, found: usize },

    #[error("merge case is missing {0}")]
    MissingCaseFile(PathBuf),

    #[error("no grammar for {0:?}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What exactly is wrong with a relation set that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformation {
    MissingRoot,
    AmbiguousRoot(usize),
    MissingListStart,
    MissingLink { after: Vertex },
    MissingListEnd,
    UnresolvedInconsistency { after: Vertex },
    Cycle { at: Vertex },
}

impl fmt::Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformation::MissingRoot => write!(f, "no root relation"),
            Malformation::AmbiguousRoot(n) => write!(f, "{} candidate root relations", n),
            Malformation::MissingListStart => write!(f, "no child-list start relation"),
            Malformation::MissingLink { after } => write!(f, "no relation following {}", after),
            Malformation::MissingListEnd => write!(f, "child list never reaches its end"),
            Malformation::UnresolvedInconsistency { after } => {
                write!(f, "unresolved competing successors of {}", after)
            }
            Malformation::Cycle { at } => write!(f, "cycle through {}", at),
        }
    }
}
