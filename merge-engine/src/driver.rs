//! End-to-end merge pipeline: files in, merged file out.
//!
//! Parsing and matching produce three trees and their pairwise matchings;
//! [`structured_merge`] runs representatives, encoding, merging and decoding;
//! the [`Printer`] turns the result back into text.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::changeset::{ChangeSet, SetSize};
use crate::decoder::{MergedTree, decode};
use crate::encoder::{EncodingContext, encode_tree};
use crate::error::{MergeError, Result};
use crate::matcher::TriMatching;
use crate::merger::merge;
use crate::parser::parse_into;
use crate::printer::{Printer, PrinterConfig};
use crate::representatives::ClassRepresentatives;
use crate::types::{Branch, Language, MergeScenario, NodeArena, NodeId};

/// File name stems of a merge case directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseLayout {
    pub base_stem: String,
    pub left_stem: String,
    pub right_stem: String,
    pub merged_stem: String,
}

impl Default for CaseLayout {
    fn default() -> Self {
        Self {
            base_stem: "file_base".to_string(),
            left_stem: "file_left".to_string(),
            right_stem: "file_right".to_string(),
            merged_stem: "file_merged".to_string(),
        }
    }
}

/// The files of one merge, located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCase {
    pub inputs: MergeScenario<PathBuf>,
    pub merged: PathBuf,
    pub language: Language,
}

impl MergeCase {
    /// Locate the base, left and right files in `dir`. The language comes
    /// from the base file's extension unless `language` is given.
    pub fn discover(dir: &Path, layout: &CaseLayout, language: Option<Language>) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        let find = |stem: &str| -> Result<PathBuf> {
            files
                .iter()
                .find(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem))
                .cloned()
                .ok_or_else(|| MergeError::MissingCaseFile(dir.join(stem)))
        };

        let base = find(&layout.base_stem)?;
        let left = find(&layout.left_stem)?;
        let right = find(&layout.right_stem)?;

        let ext = base
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        let language = match language {
            Some(lang) => lang,
            None => Language::from_extension(&ext)
                .ok_or_else(|| MergeError::UnsupportedLanguage(ext.clone()))?,
        };

        let merged = if ext.is_empty() {
            dir.join(&layout.merged_stem)
        } else {
            dir.join(format!("{}.{}", layout.merged_stem, ext))
        };

        Ok(Self {
            inputs: MergeScenario::new(base, left, right),
            merged,
            language,
        })
    }
}

/// Relation and conflict counts for one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub base: SetSize,
    pub left: SetSize,
    pub right: SetSize,
    pub union: SetSize,
    pub merged: SetSize,
    pub hard_pcs: usize,
    pub hard_content: usize,
    pub list_conflicts: usize,
    pub merged_nodes: usize,
}

impl MergeStats {
    pub fn has_conflicts(&self) -> bool {
        self.hard_pcs > 0 || self.hard_content > 0
    }
}

/// Everything the structured merge computed, for printing and inspection.
#[derive(Debug)]
pub struct StructuredMerge {
    pub change_sets: MergeScenario<ChangeSet>,
    pub merged: ChangeSet,
    pub tree: MergedTree,
    pub context: EncodingContext,
    pub stats: MergeStats,
}

/// Merge three parsed trees given their pairwise matchings.
pub fn structured_merge(
    arena: &NodeArena,
    roots: &MergeScenario<NodeId>,
    matchings: &TriMatching,
) -> Result<StructuredMerge> {
    let reps = ClassRepresentatives::resolve(arena, roots, matchings);
    let mut context = EncodingContext::new();

    let base = encode_tree(arena, roots.base, &reps, &mut context)?;
    let left = encode_tree(arena, roots.left, &reps, &mut context)?;
    let right = encode_tree(arena, roots.right, &reps, &mut context)?;

    let merged = merge(&base, &left, &right)?;
    let tree = decode(&merged, &context)?;

    let stats = MergeStats {
        base: base.size(),
        left: left.size(),
        right: right.size(),
        union: ChangeSet::union(&[&base, &left, &right]).size(),
        merged: merged.size(),
        hard_pcs: merged.hard_pcs_count(),
        hard_content: merged.hard_content_count(),
        list_conflicts: tree.conflict_count(),
        merged_nodes: tree.len(),
    };

    for (state, size) in [
        ("base", stats.base),
        ("left", stats.left),
        ("right", stats.right),
        ("union", stats.union),
        ("merged", stats.merged),
    ] {
        tracing::info!(state, pcs = size.pcs, content = size.content, "change set");
    }

    Ok(StructuredMerge {
        change_sets: MergeScenario::new(base, left, right),
        merged,
        tree,
        context,
        stats,
    })
}

/// Options for [`MergeDriver`].
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Overrides the language inferred from file extensions.
    pub language: Option<Language>,
    pub layout: CaseLayout,
    pub printer: PrinterConfig,
}

/// The merged text and what it took to produce it.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub content: String,
    pub stats: MergeStats,
}

impl MergeOutput {
    pub fn has_conflicts(&self) -> bool {
        self.stats.has_conflicts()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.content)?;
        tracing::info!(path = %path.display(), bytes = self.content.len(), "wrote merged file");
        Ok(())
    }
}

pub struct MergeDriver {
    config: DriverConfig,
}

impl MergeDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    pub fn discover(&self, dir: &Path) -> Result<MergeCase> {
        MergeCase::discover(dir, &self.config.layout, self.config.language)
    }

    /// Parse, match, merge and print three revisions of a source file.
    pub fn merge_sources(
        &self,
        sources: MergeScenario<&str>,
        language: Language,
    ) -> Result<MergeOutput> {
        let mut arena = NodeArena::new();
        let base = parse_into(&mut arena, sources.base, language, Branch::Base)?;
        let left = parse_into(&mut arena, sources.left, language, Branch::Left)?;
        let right = parse_into(&mut arena, sources.right, language, Branch::Right)?;
        let roots = MergeScenario::new(base, left, right);
        tracing::info!(nodes = arena.len(), ?language, "parsed revisions");

        let matchings = TriMatching::compute(&arena, &roots);
        tracing::info!(
            base_left = matchings.base_left.len(),
            base_right = matchings.base_right.len(),
            left_right = matchings.left_right.len(),
            "matched trees"
        );

        let result = structured_merge(&arena, &roots, &matchings)?;
        if result.stats.has_conflicts() {
            tracing::warn!(
                hard_pcs = result.stats.hard_pcs,
                hard_content = result.stats.hard_content,
                "merge has conflicts"
            );
        }

        let printer = Printer::new(&arena, &roots, sources, self.config.printer.clone());
        let content = printer.print(&result.tree, &result.merged, &result.change_sets);
        Ok(MergeOutput {
            content,
            stats: result.stats,
        })
    }

    /// Read the case's files and merge them.
    pub fn merge_case(&self, case: &MergeCase) -> Result<MergeOutput> {
        let texts = case
            .inputs
            .as_ref()
            .map(|_, path| fs::read_to_string(path));
        let base = texts.base?;
        let left = texts.left?;
        let right = texts.right?;
        tracing::info!(case = %case.merged.display(), language = ?case.language, "merging case");
        self.merge_sources(
            MergeScenario::new(base.as_str(), left.as_str(), right.as_str()),
            case.language,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_case(dir: &Path, ext: &str, base: &str, left: &str, right: &str) {
        fs::write(dir.join(format!("file_base.{}", ext)), base).unwrap();
        fs::write(dir.join(format!("file_left.{}", ext)), left).unwrap();
        fs::write(dir.join(format!("file_right.{}", ext)), right).unwrap();
    }

    #[test]
    fn test_discover_infers_language_and_output() {
        let dir = tempfile::tempdir().unwrap();
        write_case(dir.path(), "java", "class A {}", "class A {}", "class A {}");
        let case = MergeCase::discover(dir.path(), &CaseLayout::default(), None).unwrap();
        assert_eq!(case.language, Language::Java);
        assert_eq!(case.merged, dir.path().join("file_merged.java"));
        assert_eq!(case.inputs.left, dir.path().join("file_left.java"));
    }

    #[test]
    fn test_discover_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file_base.java"), "class A {}").unwrap();
        fs::write(dir.path().join("file_left.java"), "class A {}").unwrap();
        let err = MergeCase::discover(dir.path(), &CaseLayout::default(), None).unwrap_err();
        assert!(matches!(err, MergeError::MissingCaseFile(path) if path.ends_with("file_right")));
    }

    #[test]
    fn test_discover_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_case(dir.path(), "txt", "a", "a", "a");
        let err = MergeCase::discover(dir.path(), &CaseLayout::default(), None).unwrap_err();
        assert!(matches!(err, MergeError::UnsupportedLanguage(ext) if ext == "txt"));

        let case =
            MergeCase::discover(dir.path(), &CaseLayout::default(), Some(Language::Python)).unwrap();
        assert_eq!(case.language, Language::Python);
    }

    #[test]
    fn test_stats_for_identical_revisions() {
        let driver = MergeDriver::new(DriverConfig::default());
        let src = "class A { int x; }";
        let out = driver
            .merge_sources(MergeScenario::new(src, src, src), Language::Java)
            .unwrap();
        assert_eq!(out.content, src);
        assert!(!out.has_conflicts());
        assert_eq!(out.stats.base, out.stats.merged);
        assert_eq!(out.stats.union, out.stats.base);
        assert_eq!(out.stats.list_conflicts, 0);
    }

    #[test]
    fn test_parse_error_aborts_merge() {
        let driver = MergeDriver::new(DriverConfig::default());
        let result = driver.merge_sources(
            MergeScenario::new("class A {}", "class A { int }", "class A {}"),
            Language::Java,
        );
        assert!(matches!(result, Err(MergeError::Parse(_))));
    }
}
