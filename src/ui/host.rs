use anyhow::{Context, Result};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::app::{DiffRequest, Host, NoticeLevel, PickItem, ViewKind};
use crate::git::{parse_diff, DiffFile, GitRepo};

/// Ticks (≈100ms each) a notice stays on screen
const NOTICE_TICKS: u16 = 40;
const STATUS_TICKS: u16 = 15;
/// Notices stacked on screen at once; the oldest is dropped past this
const MAX_NOTICES: usize = 5;

/// One open diff view
#[derive(Debug, Clone)]
pub struct DiffTab {
    pub title: String,
    pub path: String,
    pub file: DiffFile,
    /// First visible row of the rendered diff
    pub scroll: usize,
    /// New-side line last revealed, highlighted while set
    pub revealed: Option<u32>,
}

impl DiffTab {
    /// Rendered row of `(hunk, line)`: a file header and a blank, then per
    /// hunk its header, its lines and a blank
    fn row_of(&self, hunk: usize, line: usize) -> usize {
        let before: usize = self.file.hunks[..hunk].iter().map(|h| h.lines.len() + 2).sum();
        2 + before + 1 + line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MainView {
    #[default]
    Diff,
    Explanation,
}

#[derive(Debug, Clone)]
pub struct Picker {
    pub title: String,
    pub items: Vec<PickItem>,
    pub selected: usize,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    ticks_left: u16,
    /// Transient status line, replaced by the next status
    status: bool,
}

#[derive(Debug, Default)]
pub struct HostState {
    pub tabs: Vec<DiffTab>,
    pub active_tab: usize,
    pub explanation: Option<String>,
    pub explanation_scroll: usize,
    pub main: MainView,
    pub picker: Option<Picker>,
    /// Oldest first
    pub notices: VecDeque<Notice>,
}

impl HostState {
    pub fn active(&self) -> Option<&DiffTab> {
        self.tabs.get(self.active_tab)
    }

    fn active_mut(&mut self) -> Option<&mut DiffTab> {
        self.tabs.get_mut(self.active_tab)
    }
}

/// The terminal as the navigator's host: diff tabs, an explanation pane, a
/// picker overlay and a notice line. Everything is drawn from `HostState`.
pub struct TerminalHost {
    repo: GitRepo,
    state: RefCell<HostState>,
}

impl TerminalHost {
    pub fn new(repo: GitRepo) -> Self {
        Self {
            repo,
            state: RefCell::new(HostState::default()),
        }
    }

    pub fn state(&self) -> Ref<'_, HostState> {
        self.state.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, HostState> {
        self.state.borrow_mut()
    }

    fn push_notice(&self, notice: Notice) {
        let mut state = self.state_mut();
        if notice.status {
            state.notices.retain(|n| !n.status);
        }
        state.notices.push_back(notice);
        while state.notices.len() > MAX_NOTICES {
            state.notices.pop_front();
        }
    }

    /// Called once per event-loop iteration; expires notices
    pub fn tick(&self) {
        let mut state = self.state_mut();
        for notice in state.notices.iter_mut() {
            notice.ticks_left = notice.ticks_left.saturating_sub(1);
        }
        state.notices.retain(|n| n.ticks_left > 0);
    }

    pub fn next_tab(&self) {
        let mut state = self.state_mut();
        if state.main == MainView::Explanation && !state.tabs.is_empty() {
            state.main = MainView::Diff;
            return;
        }
        if !state.tabs.is_empty() {
            state.active_tab = (state.active_tab + 1) % state.tabs.len();
        }
    }

    pub fn scroll(&self, delta: isize) {
        let mut state = self.state_mut();
        match state.main {
            MainView::Explanation => {
                state.explanation_scroll = state.explanation_scroll.saturating_add_signed(delta);
            }
            MainView::Diff => {
                if let Some(tab) = state.active_mut() {
                    tab.scroll = tab.scroll.saturating_add_signed(delta);
                }
            }
        }
    }

    pub fn has_picker(&self) -> bool {
        self.state().picker.is_some()
    }

    pub fn picker_move(&self, down: bool) {
        let mut state = self.state_mut();
        if let Some(picker) = state.picker.as_mut() {
            picker.selected = if down {
                (picker.selected + 1).min(picker.items.len().saturating_sub(1))
            } else {
                picker.selected.saturating_sub(1)
            };
        }
    }

    /// Close the picker, returning the chosen file
    pub fn picker_take(&self) -> Option<PathBuf> {
        let picker = self.state_mut().picker.take()?;
        picker.items.into_iter().nth(picker.selected).map(|i| i.path)
    }

    pub fn picker_close(&self) {
        self.state_mut().picker = None;
    }

    fn load_diff(&self, request: &DiffRequest) -> Result<DiffFile> {
        let raw = self
            .repo
            .diff_against_ref(&request.base_ref, &request.path)
            .with_context(|| format!("git diff {} -- {}", request.base_ref, request.path))?;
        let file = parse_diff(&raw)
            .into_iter()
            .next()
            .unwrap_or_else(|| DiffFile::unchanged(&request.path, &request.base_content));
        Ok(file)
    }
}

impl Host for TerminalHost {
    fn open_diff(&self, request: &DiffRequest) -> Result<()> {
        if !request.head_path.exists() && request.base_content.is_empty() {
            anyhow::bail!("{} exists on neither side", request.path);
        }
        let file = self.load_diff(request)?;
        let mut state = self.state_mut();
        state.tabs.push(DiffTab {
            title: request.title.clone(),
            path: request.path.clone(),
            file,
            scroll: 0,
            revealed: None,
        });
        state.active_tab = state.tabs.len() - 1;
        state.main = MainView::Diff;
        Ok(())
    }

    fn close_views(&self, kind: ViewKind) {
        let mut state = self.state_mut();
        match kind {
            ViewKind::Diff => {
                state.tabs.clear();
                state.active_tab = 0;
            }
            ViewKind::Explanation => {
                state.explanation = None;
                state.explanation_scroll = 0;
                state.main = MainView::Diff;
            }
        }
    }

    fn show_markdown(&self, content: &str) -> Result<()> {
        let mut state = self.state_mut();
        state.explanation = Some(content.to_string());
        state.explanation_scroll = 0;
        state.main = MainView::Explanation;
        Ok(())
    }

    fn pick(&self, title: &str, items: Vec<PickItem>) {
        self.state_mut().picker = Some(Picker {
            title: title.to_string(),
            items,
            selected: 0,
        });
    }

    fn write_clipboard(&self, text: &str) -> Result<()> {
        copy_to_clipboard(text)
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => log::info!("{}", message),
            NoticeLevel::Warning => log::warn!("{}", message),
            NoticeLevel::Error => log::error!("{}", message),
        }
        self.push_notice(Notice {
            level,
            message: message.to_string(),
            ticks_left: NOTICE_TICKS,
            status: false,
        });
    }

    fn status(&self, message: &str) {
        self.push_notice(Notice {
            level: NoticeLevel::Info,
            message: message.to_string(),
            ticks_left: STATUS_TICKS,
            status: true,
        });
    }

    /// Diffs open synchronously here, so the wait is a check of the active tab
    fn wait_for_active_diff(&self, path: &str, _timeout: Duration) -> bool {
        let state = self.state();
        state.main == MainView::Diff && state.active().is_some_and(|t| t.path == path)
    }

    fn reveal_line(&self, path: &str, line: u32) {
        let mut state = self.state_mut();
        let Some(tab) = state.active_mut().filter(|t| t.path == path) else {
            return;
        };
        tab.revealed = Some(line);
        if let Some((hunk, idx)) = tab.file.locate_new_line(line as usize) {
            // Keep a few rows of context above the target
            tab.scroll = tab.row_of(hunk, idx).saturating_sub(3);
        }
    }
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let (cmd, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("pbcopy", vec![])
    } else if cfg!(target_os = "windows") {
        ("clip", vec![])
    } else if std::process::Command::new("which")
        .arg("xclip")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
    {
        ("xclip", vec!["-selection", "clipboard"])
    } else {
        ("xsel", vec!["--clipboard", "--input"])
    };

    let mut child = std::process::Command::new(cmd)
        .args(&args)
        .stdin(std::process::Stdio::piped())
        .spawn()
        .context("Failed to open clipboard command")?;

    if let Some(ref mut stdin) = child.stdin {
        stdin.write_all(text.as_bytes())?;
    }
    // Close stdin so the command sees EOF
    drop(child.stdin.take());

    child.wait().context("Clipboard command failed")?;
    Ok(())
}
