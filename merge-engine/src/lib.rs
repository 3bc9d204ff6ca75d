//! # pcsmerge-engine
//!
//! Three-way structured merge of syntax trees.
//!
//! ## Approach
//!
//! The base, left and right revisions of a file are parsed with tree-sitter
//! into one [`NodeArena`] and matched pairwise. From there the merge works
//! on sets of facts instead of trees:
//!
//! 1. **Class representatives**: nodes the matchings identify across
//!    revisions collapse onto one canonical node
//!    ([`representatives`]).
//! 2. **Encoding**: each tree becomes a [`ChangeSet`]: parent-child-successor
//!    relations describing every sibling chain, plus content tuples for
//!    labeled nodes ([`encoder`]).
//! 3. **Merging**: the three sets are united; contradictions where one side
//!    still holds the base fact are resolved in favour of the change, the
//!    rest are kept as annotated hard conflicts ([`merger`]).
//! 4. **Decoding and printing**: the merged set is read back as a tree and
//!    rendered with conflict markers where needed ([`decoder`], [`printer`]).
//!
//! *Based on: Larsén, Falleri, Baudry, Monperrus, "Spork: Structured Merge
//! for Java with Formatting Preservation", IEEE TSE 2022; Lindholm, "A
//! three-way merge for XML documents", DocEng 2004*
//!
//! ## Supported Languages
//!
//! Rust, JavaScript, TypeScript, Python, Java, Go, C, C++.
//!
//! ## Example
//!
//! ```rust
//! use pcsmerge_engine::{DriverConfig, Language, MergeDriver, MergeScenario};
//!
//! let driver = MergeDriver::new(DriverConfig::default());
//! let output = driver
//!     .merge_sources(
//!         MergeScenario::new(
//!             "class A {\n    int x;\n}\n",
//!             "class A {\n    int x;\n    int y;\n}\n",
//!             "class A {\n    int z;\n}\n",
//!         ),
//!         Language::Java,
//!     )
//!     .unwrap();
//!
//! println!("Conflicts: {}", output.has_conflicts());
//! println!("Merged:\n{}", output.content);
//! ```

pub mod changeset;
pub mod decoder;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod matcher;
pub mod merger;
pub mod parser;
pub mod printer;
pub mod representatives;
pub mod types;

// Re-export primary public API
pub use changeset::{ChangeSet, ContentTuple, Pcs, SetSize, Vertex};
pub use decoder::{MergedTree, Slot, decode};
pub use driver::{
    CaseLayout, DriverConfig, MergeCase, MergeDriver, MergeOutput, MergeStats, StructuredMerge,
    structured_merge,
};
pub use encoder::{EncodingContext, encode_tree};
pub use error::{MergeError, Result};
pub use matcher::{Matching, Tolerance, TriMatching};
pub use merger::merge;
pub use printer::{Printer, PrinterConfig};
pub use representatives::ClassRepresentatives;
pub use types::{Branch, Language, MergeScenario, NodeArena, NodeId};
