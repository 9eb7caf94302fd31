use super::runner::{run_bounded, run_checked, CommandSpec, Limits, VcsError};
use crate::review::VersionControl;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

// ── Repo Info ──

/// Get the repository root directory for a specific path
pub fn get_repo_root_in(dir: &Path) -> Result<PathBuf> {
    let spec = CommandSpec::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .cwd(dir);
    let stdout = run_checked(&spec, Limits::default())
        .with_context(|| format!("Not a git repository: {}", dir.display()))?;

    Ok(PathBuf::from(String::from_utf8_lossy(&stdout).trim()))
}

// ── Repository handle ──

/// Git commands bound to one working tree. Every call is an argument vector
/// run under the same time and output bounds.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    limits: Limits,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>, limits: Limits) -> Self {
        Self {
            root: root.into(),
            limits,
        }
    }

    fn git<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        CommandSpec::new("git").args(args).cwd(&self.root)
    }

    /// Paths changed between `base` and `head`, in git's order
    pub fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, VcsError> {
        let range = format!("{}..{}", base, head);
        let spec = self.git(["diff", "--name-only", "-z", "--no-color", &range, "--"]);
        let stdout = run_checked(&spec, self.limits)?;
        Ok(parse_name_list(&stdout))
    }

    /// Content of `path` at `rev`. A path that does not exist at `rev`
    /// (typically a file added since then) is empty content, not an error.
    pub fn file_at_ref(&self, rev: &str, path: &str) -> Result<String, VcsError> {
        let object = format!("{}:{}", rev, path);
        let spec = self.git(["show", "--no-color", &object]);
        let output = run_bounded(&spec, self.limits)?;
        if output.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }

        let stderr = output.stderr_string();
        if is_missing_object(&stderr) {
            log::debug!("{} not present at {}: {}", path, rev, stderr);
            return Ok(String::new());
        }
        Err(VcsError::Failed {
            program: "git show".to_string(),
            code: output.exit_code,
            stderr,
        })
    }

    /// Unified diff of `path` at `rev` against the working tree copy.
    ///
    /// Untracked files have no diff against `rev`; for those the working
    /// copy is diffed against the null device instead.
    pub fn diff_against_ref(&self, rev: &str, path: &str) -> Result<String, VcsError> {
        let spec = self.git([
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--unified=3",
            rev,
            "--",
            path,
        ]);
        let stdout = run_checked(&spec, self.limits)?;
        if !stdout.is_empty() || !self.root.join(path).is_file() {
            return Ok(String::from_utf8_lossy(&stdout).to_string());
        }

        if !self.file_at_ref(rev, path)?.is_empty() {
            // Tracked and unchanged
            return Ok(String::new());
        }

        let null_device = if cfg!(windows) { "NUL" } else { "/dev/null" };
        let spec = self.git([
            "diff",
            "--no-index",
            "--no-color",
            "--no-ext-diff",
            "--",
            null_device,
            path,
        ]);
        // --no-index exits 1 when the inputs differ
        let output = run_bounded(&spec, self.limits)?;
        match output.exit_code {
            Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).to_string()),
            code => Err(VcsError::Failed {
                program: "git diff --no-index".to_string(),
                code,
                stderr: output.stderr_string(),
            }),
        }
    }
}

impl VersionControl for GitRepo {
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>, VcsError> {
        GitRepo::changed_files(self, base, head)
    }

    fn file_at_ref(&self, rev: &str, path: &str) -> Result<String, VcsError> {
        GitRepo::file_at_ref(self, rev, path)
    }
}

/// Split `-z` name output into paths
fn parse_name_list(stdout: &[u8]) -> Vec<String> {
    stdout
        .split(|b| *b == 0)
        .filter(|p| !p.is_empty())
        .map(|p| String::from_utf8_lossy(p).to_string())
        .collect()
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("does not exist") || stderr.contains("exists on disk, but not in")
}
