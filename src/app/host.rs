use super::message::Outbound;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Views the navigator opens and later closes as a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Diff,
    Explanation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// One diff view: `path` at `base_ref` on the left, the live file on the right
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRequest {
    /// Workspace-relative path as written in the manifest
    pub path: String,
    pub base_ref: String,
    /// Content at `base_ref`; empty when the file is new since then
    pub base_content: String,
    /// Resolved location of the working copy, inside the workspace
    pub head_path: PathBuf,
    pub title: String,
}

/// A manifest candidate offered by the file picker
#[derive(Debug, Clone, PartialEq)]
pub struct PickItem {
    pub label: String,
    pub description: String,
    pub path: PathBuf,
}

/// Editor-side capabilities the navigator drives
pub trait Host {
    fn open_diff(&self, request: &DiffRequest) -> Result<()>;

    /// Close every view of `kind` that the navigator opened
    fn close_views(&self, kind: ViewKind);

    fn show_markdown(&self, content: &str) -> Result<()>;

    /// Offer manifest candidates. The choice comes back through
    /// `NavigationController::load_manifest`.
    fn pick(&self, title: &str, items: Vec<PickItem>);

    fn write_clipboard(&self, text: &str) -> Result<()>;

    fn notify(&self, level: NoticeLevel, message: &str);

    /// Short-lived status text, e.g. after a clipboard copy
    fn status(&self, message: &str);

    /// Block until the diff for `path` is the active view, at most `timeout`
    fn wait_for_active_diff(&self, path: &str, timeout: Duration) -> bool;

    /// Move the cursor of the active diff to 1-based `line`
    fn reveal_line(&self, path: &str, line: u32);
}

/// A rendering surface that can be torn down and recreated at any time.
/// On recreation it sends `Inbound::Ready` and receives the full state.
pub trait Sidebar {
    fn post(&self, message: &Outbound);
}
