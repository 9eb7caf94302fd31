use super::host::PickItem;
use crate::config::PickerConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Every `.json` file under `root`, hidden directories included.
///
/// Directories named in `skip_dirs` are not entered, recursion stops below
/// `max_depth`, and a directory reached twice through symlinks is scanned
/// once. Unreadable directories are skipped.
pub fn find_json_files(root: &Path, options: &PickerConfig) -> Vec<PathBuf> {
    let mut visited = HashSet::new();
    let mut results = Vec::new();
    scan(root, 0, options, &mut visited, &mut results);
    results
}

fn scan(
    dir: &Path,
    depth: usize,
    options: &PickerConfig,
    visited: &mut HashSet<PathBuf>,
    results: &mut Vec<PathBuf>,
) {
    if depth > options.max_depth {
        return;
    }
    let Ok(real) = dir.canonicalize() else {
        return;
    };
    if !visited.insert(real) {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Skipping {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // metadata() follows symlinks, so linked directories are entered
        let is_dir = std::fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false);
        if is_dir {
            if !options.skip_dirs.iter().any(|s| s == name.as_ref()) {
                scan(&path, depth + 1, options, visited, results);
            }
        } else if name.ends_with(".json") {
            results.push(path);
        }
    }
}

/// Picker entries for `files`: file name as label, workspace-relative path as
/// description, sorted by that description.
pub fn pick_items(root: &Path, files: Vec<PathBuf>) -> Vec<PickItem> {
    let mut items: Vec<PickItem> = files
        .into_iter()
        .map(|path| {
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let description = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            PickItem {
                label,
                description,
                path,
            }
        })
        .collect();
    items.sort_by(|a, b| a.description.cmp(&b.description));
    items
}
