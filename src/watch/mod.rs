use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Events emitted by the manifest watcher
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A manifest was created or written
    ManifestChanged(PathBuf),
    /// A manifest no longer exists
    ManifestRemoved(PathBuf),
}

/// A debounced recursive watcher that reports only manifest files
pub struct ManifestWatcher {
    _watcher: notify_debouncer_mini::Debouncer<RecommendedWatcher>,
}

impl ManifestWatcher {
    /// Start watching `root`. Paths matching `glob` (relative to `root`) are
    /// sent to `tx` once events have been quiet for `debounce`.
    pub fn new(
        root: &Path,
        glob: &str,
        debounce: Duration,
        tx: mpsc::Sender<WatchEvent>,
    ) -> Result<Self> {
        let pattern = glob::Pattern::new(glob)
            .with_context(|| format!("Invalid manifest glob {:?}", glob))?;
        let base = root.to_path_buf();

        let mut debouncer = new_debouncer(
            debounce,
            move |result: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match result {
                    Ok(events) => events,
                    Err(e) => {
                        log::warn!("File watcher error: {}", e);
                        return;
                    }
                };
                let mut seen = Vec::new();
                for event in events.iter().filter(|e| e.kind == DebouncedEventKind::Any) {
                    if seen.contains(&event.path) {
                        continue;
                    }
                    seen.push(event.path.clone());
                    if let Some(watch_event) = classify(&base, &pattern, &event.path) {
                        log::debug!("{:?}", watch_event);
                        if tx.send(watch_event).is_err() {
                            // Receiver gone: the app is shutting down
                            return;
                        }
                    }
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        Ok(ManifestWatcher {
            _watcher: debouncer,
        })
    }
}

/// Map a raw change under `root` to a manifest event, or None for anything
/// that is not a manifest (git internals included).
fn classify(root: &Path, pattern: &glob::Pattern, path: &Path) -> Option<WatchEvent> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.components().any(|c| c.as_os_str() == ".git") {
        return None;
    }
    let options = glob::MatchOptions {
        require_literal_separator: true,
        require_literal_leading_dot: false,
        ..glob::MatchOptions::new()
    };
    if !pattern.matches_path_with(relative, options) {
        return None;
    }
    Some(if path.exists() {
        WatchEvent::ManifestChanged(path.to_path_buf())
    } else {
        WatchEvent::ManifestRemoved(path.to_path_buf())
    })
}
