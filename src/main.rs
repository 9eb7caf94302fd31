mod app;
mod config;
mod git;
mod review;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::{Inbound, NavigationController, NavigationOptions};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use git::GitRepo;
use ratatui::prelude::*;
use review::VersionControl;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::{mpsc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ui::{StatusInfo, TerminalHost, TerminalSidebar};
use watch::{ManifestWatcher, WatchEvent};

/// Rows moved by PgUp/PgDn
const PAGE: isize = 20;

/// Terminal navigator for grouped change-set review manifests
#[derive(Parser)]
#[command(name = "grv", version, about)]
struct Cli {
    /// Review manifest to open (JSON)
    manifest: Option<PathBuf>,

    /// Workspace root (defaults to the git top-level of the current directory)
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Validate and reconcile the manifest, print the result and exit
    #[arg(long)]
    check: bool,

    /// Do not follow manifest files on disk
    #[arg(long)]
    no_watch: bool,
}

type Controller = NavigationController<TerminalHost, GitRepo>;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.check);

    let workspace = resolve_workspace(cli.workspace.as_deref())?;
    let config = config::load_config(&workspace);
    log::debug!("Workspace {} with {:?}", workspace.display(), config);

    if cli.check {
        let path = cli
            .manifest
            .as_deref()
            .context("--check needs a MANIFEST argument")?;
        return run_check(path, &workspace, &config);
    }

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &cli, &workspace, &config);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        eprintln!("Error: {:?}", err);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// `GRV_LOG` filters (default `warn`). The TUI owns the terminal, so it logs
/// to a file in the cache dir; `--check` logs to stderr.
fn init_logging(to_stderr: bool) {
    let filter = EnvFilter::try_from_env("GRV_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if to_stderr {
        let _ = builder.with_writer(io::stderr).try_init();
        return;
    }

    let Some(dir) = dirs::cache_dir().map(|d| d.join("grv")) else {
        return;
    };
    let file = std::fs::create_dir_all(&dir).and_then(|_| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("grv.log"))
    });
    if let Ok(file) = file {
        let _ = builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    }
}

fn resolve_workspace(explicit: Option<&Path>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => {
            let cwd = std::env::current_dir().context("Cannot read current directory")?;
            match git::get_repo_root_in(&cwd) {
                Ok(root) => root,
                Err(e) => {
                    log::warn!("Not in a git repository ({:#}), using {}", e, cwd.display());
                    cwd
                }
            }
        }
    };
    dir.canonicalize()
        .with_context(|| format!("Workspace {} does not exist", dir.display()))
}

/// Headless validate + reconcile. Exit 1 on a load error or any mismatch.
fn run_check(path: &Path, workspace: &Path, config: &config::GrvConfig) -> Result<ExitCode> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let repo = GitRepo::new(workspace, config.vcs.limits());
    let clean = check_manifest(&raw, &repo, &mut io::stdout().lock())?;
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Writes the check report to `out`. True when the manifest loads and
/// matches the diff.
fn check_manifest(
    raw: &[u8],
    vcs: &impl VersionControl,
    out: &mut impl Write,
) -> io::Result<bool> {
    let manifest = match review::validate(raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            writeln!(out, "Failed to load review: {}", e)?;
            return Ok(false);
        }
    };

    let validation = review::reconcile(&manifest, vcs);

    writeln!(
        out,
        "{}..{}: {} groups, {} flags",
        manifest.meta.base,
        manifest.meta.head,
        manifest.groups.len(),
        manifest.flags.len()
    )?;
    for path in &validation.missing_files {
        writeln!(out, "  missing  {}", path)?;
    }
    for path in &validation.phantom_files {
        writeln!(out, "  phantom  {}", path)?;
    }

    match validation.mismatch_summary() {
        Some(summary) => {
            writeln!(out, "Review mismatch: {}", summary)?;
            Ok(false)
        }
        None => {
            writeln!(out, "Review matches the diff")?;
            Ok(true)
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    cli: &Cli,
    workspace: &Path,
    config: &config::GrvConfig,
) -> Result<()> {
    let repo = GitRepo::new(workspace, config.vcs.limits());
    let host = Rc::new(TerminalHost::new(repo.clone()));
    let sidebar = Rc::new(TerminalSidebar::default());
    let controller: Controller = NavigationController::new(
        Rc::clone(&host),
        repo,
        workspace,
        NavigationOptions::from(config),
    );
    controller.attach_view(sidebar.clone());
    controller.handle_message(Inbound::Ready);

    if let Some(path) = &cli.manifest {
        controller.load_manifest(path);
    }

    // Channel for manifest watch events
    let (watch_tx, watch_rx) = mpsc::channel::<WatchEvent>();
    let watcher = if cli.no_watch {
        None
    } else {
        match ManifestWatcher::new(
            workspace,
            &config.watch.manifest_glob,
            config.watch.debounce(),
            watch_tx,
        ) {
            Ok(w) => Some(w),
            Err(e) => {
                log::warn!("Manifest watching disabled: {:#}", e);
                None
            }
        }
    };
    let watching = watcher.is_some();

    loop {
        let info = StatusInfo {
            manifest: controller.loaded_path().map(|p| {
                p.strip_prefix(controller.workspace())
                    .unwrap_or(&p)
                    .display()
                    .to_string()
            }),
            watching,
        };
        terminal.draw(|f| ui::draw(f, &host, &sidebar, &info))?;

        // Poll for events with a timeout (lets us process watch events too)
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let quit = if host.has_picker() {
                        handle_picker_input(&controller, &host, key);
                        false
                    } else {
                        handle_normal_input(&controller, &host, &sidebar, key)
                    };
                    if quit {
                        break;
                    }
                }
            }
        }

        while let Ok(event) = watch_rx.try_recv() {
            match event {
                WatchEvent::ManifestChanged(path) => {
                    controller.load_manifest(&path);
                }
                WatchEvent::ManifestRemoved(path) => controller.manifest_removed(&path),
            }
        }

        // Tick: expires notices
        host.tick();
    }

    controller.dispose();
    Ok(())
}

fn handle_picker_input(controller: &Controller, host: &TerminalHost, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => host.picker_move(true),
        KeyCode::Char('k') | KeyCode::Up => host.picker_move(false),
        KeyCode::Enter => {
            if let Some(path) = host.picker_take() {
                controller.load_manifest(&path);
            }
        }
        KeyCode::Esc | KeyCode::Char('q') => host.picker_close(),
        _ => {}
    }
}

/// Returns true when the user asked to quit
fn handle_normal_input(
    controller: &Controller,
    host: &TerminalHost,
    sidebar: &TerminalSidebar,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('j') | KeyCode::Down => sidebar.model_mut().move_down(),
        KeyCode::Char('k') | KeyCode::Up => sidebar.model_mut().move_up(),
        KeyCode::Char(' ') => sidebar.model_mut().toggle(),
        KeyCode::Enter => {
            // The sidebar borrow ends before the controller posts back to it
            let intent = sidebar.model_mut().activate();
            if let Some(message) = intent {
                controller.handle_message(message);
            }
        }
        KeyCode::Tab => host.next_tab(),
        KeyCode::Char('n') => controller.next_group(),
        KeyCode::Char('p') => controller.prev_group(),
        KeyCode::Char('e') => controller.handle_message(Inbound::OpenExplanation),
        KeyCode::Char('o') => controller.handle_message(Inbound::SelectFile),
        KeyCode::Char('u') => controller.handle_message(Inbound::UnloadReview),
        KeyCode::PageDown => host.scroll(PAGE),
        KeyCode::PageUp => host.scroll(-PAGE),
        _ => {}
    }
    false
}
