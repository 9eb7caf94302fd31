use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Per-file navigation failures. Each one skips a single file; the rest of
/// the batch still opens.
#[derive(Debug, Error, PartialEq)]
pub enum NavError {
    #[error("{path} resolves outside the workspace")]
    PathEscapesWorkspace { path: String },

    #[error("Failed to open diff for {path}: {reason}")]
    DiffOpen { path: String, reason: String },
}

/// Resolve a manifest path against the workspace root.
///
/// Resolution is lexical: absolute paths are rejected and `..` may not climb
/// above the root. When the target exists it is also canonicalized so a
/// symlink cannot lead out of the workspace.
pub fn resolve_in_workspace(root: &Path, relative: &str) -> Result<PathBuf, NavError> {
    let escapes = || NavError::PathEscapesWorkspace {
        path: relative.to_string(),
    };

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop().ok_or_else(escapes)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(escapes()),
        }
    }

    let resolved = parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p));

    if resolved.exists() {
        let root_canon = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let target_canon = resolved.canonicalize().map_err(|_| escapes())?;
        if !target_canon.starts_with(&root_canon) {
            return Err(escapes());
        }
    }

    Ok(resolved)
}
