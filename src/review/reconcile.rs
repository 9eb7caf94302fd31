use super::manifest::Manifest;
use crate::git::VcsError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The two version-control queries a review needs
pub trait VersionControl {
    /// Paths changed between `base` (exclusive) and `head` (inclusive)
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, VcsError>;

    /// Content of `path` at `rev`; empty when the path does not exist there
    fn file_at_ref(&self, rev: &str, path: &str) -> Result<String, VcsError>;
}

/// Manifest vs actual diff. Recomputed from scratch on every load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// In the diff, referenced by no group or flag (diff order)
    pub missing_files: Vec<String>,
    /// Referenced by the manifest, absent from the diff (first-reference order)
    pub phantom_files: Vec<String>,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.missing_files.is_empty() && self.phantom_files.is_empty()
    }

    pub fn is_phantom(&self, path: &str) -> bool {
        self.phantom_files.iter().any(|p| p == path)
    }

    /// e.g. "1 file missing from review, 2 phantom files"; None when clean
    pub fn mismatch_summary(&self) -> Option<String> {
        let missing = self.missing_files.len();
        let phantom = self.phantom_files.len();
        let mut parts = Vec::new();
        if missing > 0 {
            parts.push(format!(
                "{} file{} missing from review",
                missing,
                if missing == 1 { "" } else { "s" }
            ));
        }
        if phantom > 0 {
            parts.push(format!(
                "{} phantom file{}",
                phantom,
                if phantom == 1 { "" } else { "s" }
            ));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Every file the manifest points at: group files first, then flag files,
/// deduplicated in order of first appearance.
pub fn referenced_files(manifest: &Manifest) -> Vec<String> {
    let mut seen = HashSet::new();
    manifest
        .groups
        .iter()
        .flat_map(|g| g.files.iter())
        .chain(manifest.flags.iter().map(|f| &f.file))
        .filter(|path| seen.insert(path.as_str()))
        .cloned()
        .collect()
}

/// Compare the manifest's files against the diff between its refs.
///
/// Validation is advisory: when the diff cannot be listed the result is
/// empty rather than an error, and the review still loads.
pub fn reconcile<V: VersionControl + ?Sized>(manifest: &Manifest, vcs: &V) -> ValidationResult {
    let changed = match vcs.changed_files(&manifest.meta.base, &manifest.meta.head) {
        Ok(files) => files,
        Err(e) => {
            log::warn!(
                "Could not list changes {}..{}, skipping validation: {}",
                manifest.meta.base,
                manifest.meta.head,
                e
            );
            return ValidationResult::default();
        }
    };

    let referenced = referenced_files(manifest);
    let referenced_set: HashSet<&str> = referenced.iter().map(String::as_str).collect();
    let changed_set: HashSet<&str> = changed.iter().map(String::as_str).collect();

    let missing_files = changed
        .iter()
        .filter(|f| !referenced_set.contains(f.as_str()))
        .cloned()
        .collect();
    let phantom_files = referenced
        .iter()
        .filter(|f| !changed_set.contains(f.as_str()))
        .cloned()
        .collect();

    ValidationResult {
        missing_files,
        phantom_files,
    }
}
