use super::host::{DiffRequest, Host, NoticeLevel, Sidebar, ViewKind};
use super::message::{Inbound, Outbound, Selection};
use super::picker::{find_json_files, pick_items};
use super::workspace::{resolve_in_workspace, NavError};
use crate::config::{GrvConfig, PickerConfig};
use crate::review::{reconcile, validate, Manifest, ValidationResult, VersionControl};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

/// Tunables the controller reads from config
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    pub reveal_timeout: Duration,
    pub picker: PickerConfig,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self::from(&GrvConfig::default())
    }
}

impl From<&GrvConfig> for NavigationOptions {
    fn from(config: &GrvConfig) -> Self {
        Self {
            reveal_timeout: config.navigation.reveal_timeout(),
            picker: config.picker.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Same file, same modification time as the loaded review
    Unchanged,
    Loaded,
    /// Reported to the user; the previous state is untouched
    Failed,
}

struct LoadedReview {
    manifest: Rc<Manifest>,
    validation: Rc<ValidationResult>,
    path: PathBuf,
    mtime: Option<SystemTime>,
}

#[derive(Default)]
struct NavigationState {
    loaded: Option<LoadedReview>,
    selection: Selection,
}

/// Clears the in-flight flag on every exit path
struct NavigationGuard<'a>(&'a Cell<bool>);

impl<'a> NavigationGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for NavigationGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Owns the loaded review and the current selection, and serializes diff
/// opening.
///
/// Every method takes `&self`: collaborators may call back into the
/// controller while it is waiting on them, so state lives in cells and no
/// borrow is held across a host or VCS call.
pub struct NavigationController<H: Host, V: VersionControl> {
    host: Rc<H>,
    vcs: V,
    workspace: PathBuf,
    options: NavigationOptions,
    state: RefCell<NavigationState>,
    navigating: Cell<bool>,
    view: RefCell<Option<Rc<dyn Sidebar>>>,
}

impl<H: Host, V: VersionControl> NavigationController<H, V> {
    pub fn new(host: Rc<H>, vcs: V, workspace: impl Into<PathBuf>, options: NavigationOptions) -> Self {
        Self {
            host,
            vcs,
            workspace: workspace.into(),
            options,
            state: RefCell::new(NavigationState::default()),
            navigating: Cell::new(false),
            view: RefCell::new(None),
        }
    }

    // ── Accessors ──

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn is_loaded(&self) -> bool {
        self.state.borrow().loaded.is_some()
    }

    pub fn selection(&self) -> Selection {
        self.state.borrow().selection
    }

    pub fn manifest(&self) -> Option<Rc<Manifest>> {
        self.state.borrow().loaded.as_ref().map(|l| Rc::clone(&l.manifest))
    }

    #[cfg(test)]
    pub fn validation(&self) -> Option<Rc<ValidationResult>> {
        self.state.borrow().loaded.as_ref().map(|l| Rc::clone(&l.validation))
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.state.borrow().loaded.as_ref().map(|l| l.path.clone())
    }

    #[cfg(test)]
    pub fn is_navigating(&self) -> bool {
        self.navigating.get()
    }

    // ── Sidebar surface ──

    /// Connect a (new) rendering surface. It is expected to send `Ready`.
    pub fn attach_view(&self, view: Rc<dyn Sidebar>) {
        *self.view.borrow_mut() = Some(view);
    }

    pub fn detach_view(&self) {
        self.view.borrow_mut().take();
    }

    fn post(&self, message: Outbound) {
        let view = self.view.borrow().clone();
        if let Some(view) = view {
            view.post(&message);
        }
    }

    fn broadcast_update(&self) {
        let message = {
            let state = self.state.borrow();
            let Some(loaded) = state.loaded.as_ref() else {
                return;
            };
            Outbound::Update {
                review: Manifest::clone(&loaded.manifest),
                mtime: loaded.mtime,
                validation: ValidationResult::clone(&loaded.validation),
                selection: state.selection,
            }
        };
        self.post(message);
    }

    fn select(&self, selection: Selection) {
        self.state.borrow_mut().selection = selection;
        self.post(match selection {
            Selection::Group(index) => Outbound::SelectGroup { index },
            Selection::Flag(index) => Outbound::SelectFlag { index },
            Selection::None => Outbound::ClearSelection,
        });
    }

    fn snapshot(&self) -> Option<(Rc<Manifest>, Rc<ValidationResult>)> {
        let state = self.state.borrow();
        state
            .loaded
            .as_ref()
            .map(|l| (Rc::clone(&l.manifest), Rc::clone(&l.validation)))
    }

    /// Dispatch one intent from the sidebar
    pub fn handle_message(&self, message: Inbound) {
        match message {
            Inbound::Ready => self.resync(),
            Inbound::OpenGroup { index } => self.open_group(index),
            Inbound::OpenFlag {
                index,
                file,
                line,
                clip_text,
            } => {
                match self.host.write_clipboard(&clip_text) {
                    Ok(()) => self.host.status("Copied to clipboard"),
                    Err(e) => log::warn!("Clipboard write failed: {:#}", e),
                }
                match index.filter(|&i| self.flag_matches(i, &file, line)) {
                    Some(i) => self.open_flag(i),
                    None => self.open_flag_at(&file, line),
                }
            }
            Inbound::OpenExplanation => self.open_explanation(),
            Inbound::SelectFile => self.prompt_select_file(),
            Inbound::UnloadReview => self.unload(),
            Inbound::OpenFile { path } => self.open_file(&path),
        }
    }

    /// Push the full state to a freshly created surface
    pub fn resync(&self) {
        if self.is_loaded() {
            self.broadcast_update();
        } else {
            self.post(Outbound::Reset);
        }
    }

    // ── Loading ──

    /// Load (or reload) the review at `path`.
    ///
    /// A repeat call for the same file with an unchanged modification time
    /// does nothing. An invalid file is reported and leaves the current
    /// review in place.
    pub fn load_manifest(&self, path: &Path) -> LoadOutcome {
        let path = canonical_or_lexical(path);
        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

        let unchanged = {
            let state = self.state.borrow();
            state
                .loaded
                .as_ref()
                .is_some_and(|l| l.path == path && mtime.is_some() && l.mtime == mtime)
        };
        if unchanged {
            log::debug!("{} unchanged, skipping reload", path.display());
            return LoadOutcome::Unchanged;
        }

        let manifest = match std::fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| validate(&raw).map_err(|e| e.to_string()))
        {
            Ok(manifest) => manifest,
            Err(e) => {
                log::warn!("Rejected {}: {}", path.display(), e);
                self.host
                    .notify(NoticeLevel::Error, &format!("Failed to load review: {}", e));
                return LoadOutcome::Failed;
            }
        };

        let validation = reconcile(&manifest, &self.vcs);
        self.host.close_views(ViewKind::Diff);

        let manifest = Rc::new(manifest);
        let validation = Rc::new(validation);
        {
            let mut state = self.state.borrow_mut();
            state.loaded = Some(LoadedReview {
                manifest: Rc::clone(&manifest),
                validation: Rc::clone(&validation),
                path: path.clone(),
                mtime,
            });
            state.selection = Selection::None;
        }
        log::info!(
            "Loaded {} ({} groups, {} flags)",
            path.display(),
            manifest.groups.len(),
            manifest.flags.len()
        );
        self.broadcast_update();

        if let Some(explanation) = manifest.explanation.as_deref() {
            if let Err(e) = self.host.show_markdown(explanation) {
                log::warn!("Could not show explanation: {:#}", e);
            }
        }

        match validation.mismatch_summary() {
            Some(summary) => self
                .host
                .notify(NoticeLevel::Warning, &format!("Review mismatch: {}", summary)),
            None => self.host.notify(
                NoticeLevel::Info,
                &format!("Loaded review: {} groups", manifest.groups.len()),
            ),
        }
        LoadOutcome::Loaded
    }

    /// The watcher saw `path` disappear. Unload if it was the loaded review.
    pub fn manifest_removed(&self, path: &Path) {
        let path = canonical_or_lexical(path);
        if self.loaded_path().as_deref() == Some(path.as_path()) {
            log::info!("{} was removed, unloading", path.display());
            self.unload();
        }
    }

    /// Forget the review, close every view this tool opened and reset the surface
    pub fn unload(&self) {
        *self.state.borrow_mut() = NavigationState::default();
        self.host.close_views(ViewKind::Explanation);
        self.host.close_views(ViewKind::Diff);
        self.post(Outbound::Reset);
    }

    /// Close views and disconnect the surface. The controller stays usable.
    pub fn dispose(&self) {
        self.host.close_views(ViewKind::Explanation);
        self.host.close_views(ViewKind::Diff);
        self.detach_view();
    }

    /// Offer the JSON files in the workspace; the host loads the choice
    pub fn prompt_select_file(&self) {
        let files = find_json_files(&self.workspace, &self.options.picker);
        if files.is_empty() {
            self.host
                .notify(NoticeLevel::Info, "No JSON files found in workspace");
            return;
        }
        self.host
            .pick("Open Review File", pick_items(&self.workspace, files));
    }

    // ── Navigation ──

    /// Open a diff for every non-phantom file in group `index`.
    ///
    /// Dropped while another open is in flight, when nothing is loaded or when
    /// `index` is out of range.
    pub fn open_group(&self, index: usize) {
        let Some((manifest, validation)) = self.snapshot() else {
            return;
        };
        let Some(group) = manifest.groups.get(index) else {
            return;
        };
        let Some(_guard) = NavigationGuard::acquire(&self.navigating) else {
            log::debug!("Diffs still opening, dropping group {}", index);
            return;
        };

        self.select(Selection::Group(index));
        if group.files.is_empty() {
            self.host.notify(NoticeLevel::Warning, "No files in this group");
            return;
        }

        let mut targets = Vec::with_capacity(group.files.len());
        for path in group.files.iter().filter(|f| !validation.is_phantom(f)) {
            match resolve_in_workspace(&self.workspace, path) {
                Ok(head_path) => targets.push((path, head_path)),
                Err(e) => {
                    log::warn!("{}", e);
                    self.host.notify(
                        NoticeLevel::Warning,
                        &format!("Skipping file outside workspace: {}", path),
                    );
                }
            }
        }

        self.host.close_views(ViewKind::Diff);
        for (path, head_path) in targets {
            let title = format!("{} — {}", path, group.title);
            if let Err(e) = self.open_diff(&manifest.meta.base, path, head_path, title) {
                self.host.notify(NoticeLevel::Error, &e.to_string());
            }
        }
    }

    /// Open flag `index` and reveal its line
    pub fn open_flag(&self, index: usize) {
        let Some(manifest) = self.manifest() else {
            return;
        };
        let Some(flag) = manifest.flags.get(index) else {
            return;
        };
        self.open_flag_target(Some(index), &flag.file, flag.line);
    }

    /// Open `file` at `line`, selecting the matching flag when there is one
    pub fn open_flag_at(&self, file: &str, line: u32) {
        let index = self.find_flag(file, line);
        self.open_flag_target(index, file, line);
    }

    fn find_flag(&self, file: &str, line: u32) -> Option<usize> {
        let manifest = self.manifest()?;
        manifest
            .flags
            .iter()
            .position(|f| f.file == file && f.line == line)
    }

    fn flag_matches(&self, index: usize, file: &str, line: u32) -> bool {
        self.manifest()
            .and_then(|m| m.flags.get(index).map(|f| f.file == file && f.line == line))
            .unwrap_or(false)
    }

    fn open_flag_target(&self, index: Option<usize>, file: &str, line: u32) {
        let Some((manifest, validation)) = self.snapshot() else {
            return;
        };
        let Some(_guard) = NavigationGuard::acquire(&self.navigating) else {
            log::debug!("Diffs still opening, dropping flag {}:{}", file, line);
            return;
        };
        let Some(head_path) = self.checked_target(&validation, file) else {
            return;
        };

        self.select(index.map_or(Selection::None, Selection::Flag));
        self.host.close_views(ViewKind::Diff);
        let title = format!("{} — Flag", file);
        if let Err(e) = self.open_diff(&manifest.meta.base, file, head_path, title) {
            self.host.notify(NoticeLevel::Error, &e.to_string());
            return;
        }

        if self
            .host
            .wait_for_active_diff(file, self.options.reveal_timeout)
        {
            self.host.reveal_line(file, line);
        } else {
            log::debug!("Diff for {} never became active, not revealing", file);
        }
    }

    /// Open a single file's diff without touching the selection
    pub fn open_file(&self, file: &str) {
        let Some((manifest, validation)) = self.snapshot() else {
            return;
        };
        let Some(_guard) = NavigationGuard::acquire(&self.navigating) else {
            return;
        };
        let Some(head_path) = self.checked_target(&validation, file) else {
            return;
        };

        self.host.close_views(ViewKind::Diff);
        if let Err(e) = self.open_diff(&manifest.meta.base, file, head_path, file.to_string()) {
            self.host.notify(NoticeLevel::Error, &e.to_string());
        }
    }

    /// Phantom and boundary checks for single-file opens. Reports and
    /// returns None when the file must not be opened.
    fn checked_target(&self, validation: &ValidationResult, file: &str) -> Option<PathBuf> {
        if validation.is_phantom(file) {
            self.host.notify(
                NoticeLevel::Warning,
                &format!("Cannot open diff: {} is not in the git diff", file),
            );
            return None;
        }
        match resolve_in_workspace(&self.workspace, file) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("{}", e);
                self.host.notify(
                    NoticeLevel::Warning,
                    &format!("Cannot open file outside workspace: {}", file),
                );
                None
            }
        }
    }

    fn open_diff(
        &self,
        base: &str,
        path: &str,
        head_path: PathBuf,
        title: String,
    ) -> Result<(), NavError> {
        let diff_error = |reason: String| NavError::DiffOpen {
            path: path.to_string(),
            reason,
        };
        let base_content = self
            .vcs
            .file_at_ref(base, path)
            .map_err(|e| diff_error(e.to_string()))?;
        let request = DiffRequest {
            path: path.to_string(),
            base_ref: base.to_string(),
            base_content,
            head_path,
            title,
        };
        self.host
            .open_diff(&request)
            .map_err(|e| diff_error(format!("{:#}", e)))
    }

    /// Show the review's explanation, replacing any earlier one
    pub fn open_explanation(&self) {
        let Some(manifest) = self.manifest() else {
            return;
        };
        let Some(explanation) = manifest.explanation.as_deref() else {
            return;
        };
        if let Err(e) = self.host.show_markdown(explanation) {
            self.host.notify(
                NoticeLevel::Error,
                &format!("Failed to open explanation: {:#}", e),
            );
        }
    }

    /// Open the group after the selected one, or the first when none is selected
    pub fn next_group(&self) {
        let Some(count) = self.manifest().map(|m| m.groups.len()) else {
            return;
        };
        if count == 0 {
            return;
        }
        let target = match self.selection().group() {
            Some(i) => (i + 1).min(count - 1),
            None => 0,
        };
        self.open_group(target);
    }

    /// Open the group before the selected one, or the last when none is selected
    pub fn prev_group(&self) {
        let Some(count) = self.manifest().map(|m| m.groups.len()) else {
            return;
        };
        if count == 0 {
            return;
        }
        let target = match self.selection().group() {
            Some(i) => i.saturating_sub(1),
            None => count - 1,
        };
        self.open_group(target);
    }
}

/// Canonical form of `path`; for a deleted file, its canonical parent joined
/// with the file name.
fn canonical_or_lexical(path: &Path) -> PathBuf {
    if let Ok(canon) = path.canonicalize() {
        return canon;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::host::PickItem;
    use crate::git::VcsError;
    use crate::review::ManifestError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::rc::Weak;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        OpenDiff { path: String, title: String },
        Close(ViewKind),
        Markdown(String),
        Pick(Vec<String>),
        Clipboard(String),
        Notice(NoticeLevel, String),
        Status(String),
        Reveal(String, u32),
    }

    type Reenter = Box<dyn Fn()>;

    #[derive(Default)]
    struct StubHost {
        events: RefCell<Vec<Event>>,
        requests: RefCell<Vec<DiffRequest>>,
        failing: RefCell<Vec<String>>,
        inactive: Cell<bool>,
        /// Runs once, from inside the first `open_diff`
        reenter: RefCell<Option<Reenter>>,
    }

    impl StubHost {
        fn record(&self, event: Event) {
            self.events.borrow_mut().push(event);
        }

        fn events(&self) -> Vec<Event> {
            self.events.borrow().clone()
        }

        fn opened(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::OpenDiff { path, .. } => Some(path),
                    _ => None,
                })
                .collect()
        }

        fn notices(&self) -> Vec<(NoticeLevel, String)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Notice(level, msg) => Some((level, msg)),
                    _ => None,
                })
                .collect()
        }

        fn clear(&self) {
            self.events.borrow_mut().clear();
        }
    }

    impl Host for StubHost {
        fn open_diff(&self, request: &DiffRequest) -> anyhow::Result<()> {
            let hook = self.reenter.borrow_mut().take();
            if let Some(hook) = hook {
                hook();
            }
            if self.failing.borrow().contains(&request.path) {
                anyhow::bail!("editor refused");
            }
            self.requests.borrow_mut().push(request.clone());
            self.record(Event::OpenDiff {
                path: request.path.clone(),
                title: request.title.clone(),
            });
            Ok(())
        }

        fn close_views(&self, kind: ViewKind) {
            self.record(Event::Close(kind));
        }

        fn show_markdown(&self, content: &str) -> anyhow::Result<()> {
            self.record(Event::Markdown(content.to_string()));
            Ok(())
        }

        fn pick(&self, _title: &str, items: Vec<PickItem>) {
            self.record(Event::Pick(items.into_iter().map(|i| i.description).collect()));
        }

        fn write_clipboard(&self, text: &str) -> anyhow::Result<()> {
            self.record(Event::Clipboard(text.to_string()));
            Ok(())
        }

        fn notify(&self, level: NoticeLevel, message: &str) {
            self.record(Event::Notice(level, message.to_string()));
        }

        fn status(&self, message: &str) {
            self.record(Event::Status(message.to_string()));
        }

        fn wait_for_active_diff(&self, _path: &str, _timeout: Duration) -> bool {
            !self.inactive.get()
        }

        fn reveal_line(&self, path: &str, line: u32) {
            self.record(Event::Reveal(path.to_string(), line));
        }
    }

    struct StubVcs {
        changed: Option<Vec<String>>,
        contents: HashMap<String, String>,
        diff_calls: Cell<usize>,
    }

    impl StubVcs {
        fn new(changed: &[&str]) -> Self {
            Self {
                changed: Some(changed.iter().map(|s| s.to_string()).collect()),
                contents: HashMap::new(),
                diff_calls: Cell::new(0),
            }
        }
    }

    impl VersionControl for StubVcs {
        fn changed_files(&self, _base: &str, _head: &str) -> Result<Vec<String>, VcsError> {
            self.diff_calls.set(self.diff_calls.get() + 1);
            self.changed.clone().ok_or_else(|| VcsError::Failed {
                program: "git".into(),
                code: Some(128),
                stderr: "not a git repository".into(),
            })
        }

        fn file_at_ref(&self, _rev: &str, path: &str) -> Result<String, VcsError> {
            Ok(self.contents.get(path).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingSidebar {
        posts: RefCell<Vec<Outbound>>,
    }

    impl Sidebar for RecordingSidebar {
        fn post(&self, message: &Outbound) {
            self.posts.borrow_mut().push(message.clone());
        }
    }

    impl RecordingSidebar {
        fn updates(&self) -> usize {
            self.posts
                .borrow()
                .iter()
                .filter(|m| matches!(m, Outbound::Update { .. }))
                .count()
        }

        fn last(&self) -> Option<Outbound> {
            self.posts.borrow().last().cloned()
        }
    }

    type Controller = NavigationController<StubHost, StubVcs>;

    struct Fixture {
        dir: tempfile::TempDir,
        host: Rc<StubHost>,
        sidebar: Rc<RecordingSidebar>,
        controller: Rc<Controller>,
    }

    impl Fixture {
        fn new(vcs: StubVcs) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let host = Rc::new(StubHost::default());
            let sidebar = Rc::new(RecordingSidebar::default());
            let controller = Rc::new(NavigationController::new(
                Rc::clone(&host),
                vcs,
                dir.path(),
                NavigationOptions::default(),
            ));
            controller.attach_view(sidebar.clone());
            Self {
                dir,
                host,
                sidebar,
                controller,
            }
        }

        fn manifest_path(&self) -> PathBuf {
            self.dir.path().join(".review/review.json")
        }

        fn write(&self, value: &serde_json::Value) -> PathBuf {
            let path = self.manifest_path();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
            path
        }

        fn load(&self, value: &serde_json::Value) -> LoadOutcome {
            let path = self.write(value);
            self.controller.load_manifest(&path)
        }
    }

    fn review(groups: serde_json::Value, flags: serde_json::Value) -> serde_json::Value {
        json!({
            "meta": { "base": "main", "head": "feature" },
            "groups": groups,
            "flags": flags,
        })
    }

    fn two_file_review() -> serde_json::Value {
        review(
            json!([{ "title": "Core", "files": ["a.ts", "b.ts"] }]),
            json!([]),
        )
    }

    // ── End-to-end scenarios ──

    #[test]
    fn scenario_matching_diff_loads_clean() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        assert_eq!(fx.load(&two_file_review()), LoadOutcome::Loaded);

        let validation = fx.controller.validation().unwrap();
        assert!(validation.missing_files.is_empty());
        assert!(validation.phantom_files.is_empty());
        assert_eq!(
            fx.host.notices(),
            vec![(NoticeLevel::Info, "Loaded review: 1 groups".to_string())]
        );
    }

    #[test]
    fn scenario_unreferenced_diff_file_warns_mismatch() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts", "extra.ts"]));
        fx.load(&two_file_review());

        let validation = fx.controller.validation().unwrap();
        assert_eq!(validation.missing_files, vec!["extra.ts"]);
        assert!(validation.phantom_files.is_empty());
        let notices = fx.host.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeLevel::Warning);
        assert!(notices[0].1.contains("1 file missing from review"));
    }

    #[test]
    fn scenario_phantom_file_dropped_from_group() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&review(
            json!([{ "title": "Core", "files": ["a.ts", "ghost.ts"] }]),
            json!([]),
        ));
        assert_eq!(fx.controller.validation().unwrap().phantom_files, vec!["ghost.ts"]);

        fx.host.clear();
        fx.controller.open_group(0);
        assert_eq!(fx.host.opened(), vec!["a.ts"]);
    }

    #[test]
    fn scenario_unsafe_ref_never_reaches_vcs() {
        let fx = Fixture::new(StubVcs::new(&["a.ts"]));
        let outcome = fx.load(&json!({
            "meta": { "base": "-rf", "head": "feature" },
            "groups": [],
        }));

        assert_eq!(outcome, LoadOutcome::Failed);
        assert_eq!(fx.controller.vcs.diff_calls.get(), 0);
        assert!(!fx.controller.is_loaded());
        let notices = fx.host.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, NoticeLevel::Error);
        assert!(notices[0].1.starts_with("Failed to load review:"));

        let raw = std::fs::read(fx.manifest_path()).unwrap();
        assert!(matches!(validate(&raw), Err(ManifestError::UnsafeRef { .. })));
    }

    // ── Loading ──

    #[test]
    fn load_manifest_twice_without_change_is_noop() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        let path = fx.write(&two_file_review());

        assert_eq!(fx.controller.load_manifest(&path), LoadOutcome::Loaded);
        assert_eq!(fx.controller.load_manifest(&path), LoadOutcome::Unchanged);
        assert_eq!(fx.controller.vcs.diff_calls.get(), 1);
        assert_eq!(fx.sidebar.updates(), 1);
    }

    #[test]
    fn load_manifest_reloads_after_mtime_change() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        let path = fx.write(&two_file_review());
        fx.controller.load_manifest(&path);

        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        drop(file);

        assert_eq!(fx.controller.load_manifest(&path), LoadOutcome::Loaded);
        assert_eq!(fx.controller.vcs.diff_calls.get(), 2);
        assert_eq!(fx.sidebar.updates(), 2);
    }

    #[test]
    fn load_manifest_invalid_keeps_prior_review() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&two_file_review());
        fx.controller.open_group(0);
        let before = fx.controller.manifest().unwrap();

        let path = fx.manifest_path();
        std::fs::write(&path, b"{ not json").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        drop(file);

        assert_eq!(fx.controller.load_manifest(&path), LoadOutcome::Failed);
        assert_eq!(fx.controller.manifest().unwrap(), before);
        assert_eq!(fx.controller.selection(), Selection::Group(0));
        assert_eq!(fx.sidebar.updates(), 1);
    }

    #[test]
    fn load_manifest_missing_file_fails() {
        let fx = Fixture::new(StubVcs::new(&[]));
        let outcome = fx.controller.load_manifest(&fx.dir.path().join("nope.json"));
        assert_eq!(outcome, LoadOutcome::Failed);
        assert_eq!(fx.host.notices()[0].0, NoticeLevel::Error);
    }

    #[test]
    fn load_manifest_vcs_failure_still_loads() {
        let vcs = StubVcs {
            changed: None,
            ..StubVcs::new(&[])
        };
        let fx = Fixture::new(vcs);
        assert_eq!(fx.load(&two_file_review()), LoadOutcome::Loaded);
        assert!(fx.controller.validation().unwrap().is_clean());
    }

    #[test]
    fn load_manifest_resets_selection_and_closes_diffs() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        let path = fx.write(&two_file_review());
        fx.controller.load_manifest(&path);
        fx.controller.open_group(0);

        let mut other = two_file_review();
        other["groups"][0]["title"] = json!("Renamed");
        let second = fx.dir.path().join("other.json");
        std::fs::write(&second, serde_json::to_vec(&other).unwrap()).unwrap();
        fx.host.clear();

        fx.controller.load_manifest(&second);
        assert_eq!(fx.controller.selection(), Selection::None);
        assert!(fx.host.events().contains(&Event::Close(ViewKind::Diff)));
        match fx.sidebar.last() {
            Some(Outbound::Update { selection, review, .. }) => {
                assert_eq!(selection, Selection::None);
                assert_eq!(review.groups[0].title, "Renamed");
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn load_manifest_shows_explanation() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        let mut value = two_file_review();
        value["explanation"] = json!("# Why");
        fx.load(&value);
        assert!(fx.host.events().contains(&Event::Markdown("# Why".into())));
    }

    // ── Navigation ──

    #[test]
    fn open_group_titles_and_base_content() {
        let mut vcs = StubVcs::new(&["a.ts", "b.ts"]);
        vcs.contents.insert("a.ts".into(), "old a".into());
        let fx = Fixture::new(vcs);
        fx.load(&two_file_review());
        fx.controller.open_group(0);

        let requests = fx.host.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].title, "a.ts — Core");
        assert_eq!(requests[0].base_ref, "main");
        assert_eq!(requests[0].base_content, "old a");
        assert_eq!(requests[1].base_content, "");
        assert_eq!(requests[0].head_path, fx.dir.path().join("a.ts"));
    }

    #[test]
    fn open_group_path_traversal_never_reaches_host() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "../../etc/passwd", "b.ts"]));
        fx.load(&review(
            json!([{ "title": "Core", "files": ["a.ts", "../../etc/passwd", "b.ts"] }]),
            json!([]),
        ));
        fx.host.clear();
        fx.controller.open_group(0);

        assert_eq!(fx.host.opened(), vec!["a.ts", "b.ts"]);
        assert!(fx.host.notices().contains(&(
            NoticeLevel::Warning,
            "Skipping file outside workspace: ../../etc/passwd".to_string()
        )));
    }

    #[test]
    fn open_group_reentry_is_dropped() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts", "c.ts"]));
        fx.load(&review(
            json!([
                { "title": "One", "files": ["a.ts", "b.ts"] },
                { "title": "Two", "files": ["c.ts"] },
            ]),
            json!([]),
        ));

        let weak: Weak<Controller> = Rc::downgrade(&fx.controller);
        *fx.host.reenter.borrow_mut() = Some(Box::new(move || {
            if let Some(controller) = weak.upgrade() {
                assert!(controller.is_navigating());
                controller.open_group(1);
                controller.open_flag_at("c.ts", 1);
            }
        }));
        fx.host.clear();
        fx.controller.open_group(0);

        assert_eq!(fx.host.opened(), vec!["a.ts", "b.ts"]);
        assert_eq!(fx.controller.selection(), Selection::Group(0));
        assert!(!fx.controller.is_navigating());

        // The guard is released, so the next open goes through
        fx.controller.open_group(1);
        assert_eq!(fx.host.opened(), vec!["a.ts", "b.ts", "c.ts"]);
    }

    #[test]
    fn open_group_guard_released_after_empty_group() {
        let fx = Fixture::new(StubVcs::new(&["a.ts"]));
        fx.load(&review(
            json!([{ "title": "Empty", "files": [] }, { "title": "A", "files": ["a.ts"] }]),
            json!([]),
        ));
        fx.host.clear();
        fx.controller.open_group(0);
        assert_eq!(
            fx.host.notices(),
            vec![(NoticeLevel::Warning, "No files in this group".to_string())]
        );
        assert!(!fx.controller.is_navigating());
        fx.controller.open_group(1);
        assert_eq!(fx.host.opened(), vec!["a.ts"]);
    }

    #[test]
    fn open_group_out_of_range_or_empty_state_is_noop() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.controller.open_group(0);
        assert!(fx.host.events().is_empty());

        fx.load(&two_file_review());
        fx.host.clear();
        fx.controller.open_group(5);
        assert!(fx.host.events().is_empty());
        assert_eq!(fx.controller.selection(), Selection::None);
    }

    #[test]
    fn open_group_failed_file_does_not_stop_batch() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.host.failing.borrow_mut().push("a.ts".into());
        fx.load(&two_file_review());
        fx.host.clear();
        fx.controller.open_group(0);

        assert_eq!(fx.host.opened(), vec!["b.ts"]);
        assert_eq!(
            fx.host.notices(),
            vec![(
                NoticeLevel::Error,
                "Failed to open diff for a.ts: editor refused".to_string()
            )]
        );
    }

    #[test]
    fn open_group_closes_prior_diffs_before_opening() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&two_file_review());
        fx.host.clear();
        fx.controller.open_group(0);
        let events = fx.host.events();
        assert_eq!(events[0], Event::Close(ViewKind::Diff));
        assert!(matches!(events[1], Event::OpenDiff { .. }));
    }

    #[test]
    fn open_flag_reveals_line_once_active() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&review(
            json!([{ "title": "Core", "files": ["a.ts", "b.ts"] }]),
            json!([{ "severity": "error", "title": "Leak", "file": "b.ts", "line": 42 }]),
        ));
        fx.host.clear();
        fx.controller.open_flag(0);

        assert_eq!(
            fx.host.events(),
            vec![
                Event::Close(ViewKind::Diff),
                Event::OpenDiff {
                    path: "b.ts".into(),
                    title: "b.ts — Flag".into()
                },
                Event::Reveal("b.ts".into(), 42),
            ]
        );
        assert_eq!(fx.controller.selection(), Selection::Flag(0));
    }

    #[test]
    fn open_flag_inactive_diff_skips_reveal() {
        let fx = Fixture::new(StubVcs::new(&["a.ts"]));
        fx.load(&review(
            json!([]),
            json!([{ "severity": "info", "title": "Note", "file": "a.ts", "line": 3 }]),
        ));
        fx.host.inactive.set(true);
        fx.host.clear();
        fx.controller.open_flag(0);

        assert_eq!(fx.host.opened(), vec!["a.ts"]);
        assert!(!fx
            .host
            .events()
            .iter()
            .any(|e| matches!(e, Event::Reveal(..))));
        assert!(fx.host.notices().is_empty());
    }

    #[test]
    fn open_flag_phantom_aborts() {
        let fx = Fixture::new(StubVcs::new(&["a.ts"]));
        fx.load(&review(
            json!([{ "title": "Core", "files": ["a.ts"] }]),
            json!([{ "severity": "warning", "title": "Gone", "file": "ghost.ts", "line": 1 }]),
        ));
        fx.controller.open_group(0);
        fx.host.clear();
        fx.controller.open_flag(0);

        assert!(fx.host.opened().is_empty());
        assert_eq!(
            fx.host.notices(),
            vec![(
                NoticeLevel::Warning,
                "Cannot open diff: ghost.ts is not in the git diff".to_string()
            )]
        );
        // Nothing opened, so the group selection stands
        assert_eq!(fx.controller.selection(), Selection::Group(0));
    }

    #[test]
    fn open_flag_outside_workspace_aborts() {
        let fx = Fixture::new(StubVcs::new(&["../x.ts"]));
        fx.load(&review(
            json!([]),
            json!([{ "severity": "warning", "title": "Out", "file": "../x.ts", "line": 1 }]),
        ));
        fx.host.clear();
        fx.controller.open_flag(0);
        assert!(fx.host.opened().is_empty());
        assert_eq!(
            fx.host.notices(),
            vec![(
                NoticeLevel::Warning,
                "Cannot open file outside workspace: ../x.ts".to_string()
            )]
        );
    }

    #[test]
    fn selection_group_and_flag_are_exclusive() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&review(
            json!([{ "title": "Core", "files": ["a.ts", "b.ts"] }]),
            json!([{ "severity": "info", "title": "Look", "file": "a.ts", "line": 1 }]),
        ));

        fx.controller.open_group(0);
        assert!(fx
            .sidebar
            .posts
            .borrow()
            .contains(&Outbound::SelectGroup { index: 0 }));
        assert_eq!(fx.controller.selection().flag(), None);

        fx.controller.open_flag(0);
        assert_eq!(fx.controller.selection().group(), None);
        assert_eq!(fx.controller.selection().flag(), Some(0));

        fx.controller.open_group(0);
        assert_eq!(fx.controller.selection().flag(), None);

        fx.controller.handle_message(Inbound::Ready);
        match fx.sidebar.last() {
            Some(Outbound::Update { selection, .. }) => {
                assert_eq!(selection, Selection::Group(0))
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn open_file_keeps_selection_and_uses_path_title() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&two_file_review());
        fx.controller.open_group(0);
        fx.host.clear();
        fx.controller.handle_message(Inbound::OpenFile { path: "b.ts".into() });

        assert_eq!(
            fx.host.events(),
            vec![
                Event::Close(ViewKind::Diff),
                Event::OpenDiff {
                    path: "b.ts".into(),
                    title: "b.ts".into()
                },
            ]
        );
        assert_eq!(fx.controller.selection(), Selection::Group(0));
    }

    #[test]
    fn next_and_prev_group_clamp_at_ends() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts", "c.ts"]));
        fx.load(&review(
            json!([
                { "title": "A", "files": ["a.ts"] },
                { "title": "B", "files": ["b.ts"] },
                { "title": "C", "files": ["c.ts"] },
            ]),
            json!([]),
        ));

        fx.controller.next_group();
        assert_eq!(fx.controller.selection(), Selection::Group(0));
        fx.controller.next_group();
        fx.controller.next_group();
        fx.controller.next_group();
        assert_eq!(fx.controller.selection(), Selection::Group(2));
        fx.controller.prev_group();
        assert_eq!(fx.controller.selection(), Selection::Group(1));

        fx.controller.unload();
        fx.load(&review(
            json!([{ "title": "A", "files": ["a.ts"] }, { "title": "B", "files": ["b.ts"] }]),
            json!([]),
        ));
        fx.controller.prev_group();
        assert_eq!(fx.controller.selection(), Selection::Group(1));
    }

    // ── Messages and lifecycle ──

    #[test]
    fn handle_open_flag_copies_clip_text_first() {
        let fx = Fixture::new(StubVcs::new(&["a.ts"]));
        fx.load(&review(
            json!([]),
            json!([{ "severity": "error", "title": "Bug", "summary": "off by one", "file": "a.ts", "line": 9 }]),
        ));
        fx.host.clear();
        fx.controller.handle_message(Inbound::OpenFlag {
            index: None,
            file: "a.ts".into(),
            line: 9,
            clip_text: "Bug | off by one".into(),
        });

        let events = fx.host.events();
        assert_eq!(events[0], Event::Clipboard("Bug | off by one".into()));
        assert_eq!(events[1], Event::Status("Copied to clipboard".into()));
        assert!(events.contains(&Event::Reveal("a.ts".into(), 9)));
        assert_eq!(fx.controller.selection(), Selection::Flag(0));
    }

    #[test]
    fn handle_ready_resyncs_state() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.controller.handle_message(Inbound::Ready);
        assert_eq!(fx.sidebar.last(), Some(Outbound::Reset));

        fx.load(&two_file_review());
        // A recreated surface replaces the old one and asks again
        let fresh = Rc::new(RecordingSidebar::default());
        fx.controller.attach_view(fresh.clone());
        fx.controller.handle_message(Inbound::Ready);
        assert_eq!(fresh.updates(), 1);
    }

    #[test]
    fn unload_closes_explanation_then_diffs_then_resets() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&two_file_review());
        fx.controller.open_group(0);
        fx.host.clear();

        fx.controller.handle_message(Inbound::UnloadReview);
        assert_eq!(
            fx.host.events(),
            vec![
                Event::Close(ViewKind::Explanation),
                Event::Close(ViewKind::Diff),
            ]
        );
        assert_eq!(fx.sidebar.last(), Some(Outbound::Reset));
        assert!(!fx.controller.is_loaded());
        assert_eq!(fx.controller.selection(), Selection::None);
    }

    #[test]
    fn unload_then_same_file_loads_again() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        let path = fx.write(&two_file_review());
        fx.controller.load_manifest(&path);
        fx.controller.unload();
        assert_eq!(fx.controller.load_manifest(&path), LoadOutcome::Loaded);
    }

    #[test]
    fn manifest_removed_unloads_only_the_loaded_file() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        let path = fx.write(&two_file_review());
        fx.controller.load_manifest(&path);

        fx.controller.manifest_removed(&fx.dir.path().join("other.json"));
        assert!(fx.controller.is_loaded());

        std::fs::remove_file(&path).unwrap();
        fx.controller.manifest_removed(&path);
        assert!(!fx.controller.is_loaded());
        assert_eq!(fx.sidebar.last(), Some(Outbound::Reset));
    }

    #[test]
    fn open_explanation_without_one_is_noop() {
        let fx = Fixture::new(StubVcs::new(&["a.ts", "b.ts"]));
        fx.load(&two_file_review());
        fx.host.clear();
        fx.controller.handle_message(Inbound::OpenExplanation);
        assert!(fx.host.events().is_empty());
    }

    #[test]
    fn select_file_offers_workspace_json() {
        let fx = Fixture::new(StubVcs::new(&[]));
        fx.write(&two_file_review());
        std::fs::write(fx.dir.path().join("alt.json"), "{}").unwrap();
        fx.controller.handle_message(Inbound::SelectFile);
        assert_eq!(
            fx.host.events(),
            vec![Event::Pick(vec![
                ".review/review.json".into(),
                "alt.json".into()
            ])]
        );
    }

    #[test]
    fn select_file_with_no_candidates_informs() {
        let fx = Fixture::new(StubVcs::new(&[]));
        fx.controller.prompt_select_file();
        assert_eq!(
            fx.host.notices(),
            vec![(NoticeLevel::Info, "No JSON files found in workspace".to_string())]
        );
    }
}
