mod app;
mod cache;
mod config;
mod diff;
mod error;
mod git;
mod lfm;
mod ui;
mod watch;

use anyhow::{Context, Result};
use app::{App, InputMode, SessionRequest};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use git::{DiffPreflightStats, DiffSide};
use lfm::{LfmDecision, LfmThresholds, OverrideMode, Preset};
use ratatui::prelude::*;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use watch::{FileWatcher, WatchEvent};

/// Terminal git diff viewer that streams large diffs
#[derive(Parser)]
#[command(name = "streamdiff", version, about)]
struct Cli {
    /// Limit the diff to one file (defaults to the whole working tree)
    path: Option<String>,

    /// Diff the index against HEAD instead of the working tree against the index
    #[arg(long)]
    staged: bool,

    /// Repository directory
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Threshold preset: default, conservative or aggressive
    #[arg(long)]
    preset: Option<String>,

    /// Always use large file mode
    #[arg(long, conflicts_with = "no_lfm")]
    force_lfm: bool,

    /// Never use large file mode
    #[arg(long)]
    no_lfm: bool,

    /// Skip the preflight size check and parse in full
    #[arg(long, conflicts_with = "preflight")]
    no_preflight: bool,

    /// Print preflight stats and the large file mode decision as JSON, then exit
    #[arg(long)]
    preflight: bool,
}

impl Cli {
    fn override_mode(&self) -> OverrideMode {
        if self.force_lfm {
            OverrideMode::On
        } else if self.no_lfm {
            OverrideMode::Off
        } else {
            OverrideMode::Auto
        }
    }
}

#[derive(Serialize)]
struct PreflightReport {
    stats: DiffPreflightStats,
    thresholds: LfmThresholds,
    decision: LfmDecision,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let repo_root = git::get_repo_root_in(&cli.repo)?;
    let config = config::load_config(&repo_root);
    let preset = match &cli.preset {
        Some(name) => Preset::parse(name)
            .with_context(|| format!("Unknown preset '{}' (expected default, conservative or aggressive)", name))?,
        None => config.lfm.preset,
    };
    let path = cli.path.as_deref().map(|p| repo_relative(&repo_root, p));
    let side = DiffSide::from_staged(cli.staged);

    let request = SessionRequest {
        repo_root,
        path,
        side,
        cli_override: cli.override_mode(),
        preset,
        run_preflight: !cli.no_preflight,
    };

    if cli.preflight {
        let thresholds = config.lfm.thresholds_for(preset);
        // Full scan: the report shows every figure
        let stats = git::collect_preflight(&request.repo_root, request.path.as_deref(), side, None)?;
        let report = PreflightReport {
            stats,
            thresholds,
            decision: lfm::decide(Some(&stats), thresholds, app::override_for(&request, &config)),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut app = App::new(request, config);
    app.start_session();

    // Load syntax highlighting (once, reused for all files)
    let mut highlighter = ui::highlight::Highlighter::new();

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &mut highlighter);

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        eprintln!("Error: {:?}", err);
    }
    Ok(())
}

/// Log to the file named by STREAMDIFF_LOG; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let Ok(path) = std::env::var("STREAMDIFF_LOG") else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

/// Accept paths relative to the current directory as well as to the repo root
fn repo_relative(repo_root: &Path, path: &str) -> String {
    std::fs::canonicalize(path)
        .ok()
        .and_then(|abs| {
            let root = std::fs::canonicalize(repo_root).unwrap_or_else(|_| repo_root.to_path_buf());
            abs.strip_prefix(root).ok().map(|p| p.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| path.to_string())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    hl: &mut ui::highlight::Highlighter,
) -> Result<()> {
    // Channel for file watch events
    let (watch_tx, watch_rx) = mpsc::channel::<WatchEvent>();

    // Debounce state for file watcher refreshes
    let mut pending_paths: Vec<String> = Vec::new();
    let mut refresh_deadline = Instant::now();

    // Start watching by default
    let mut watcher: Option<FileWatcher> = match FileWatcher::new(&app.request.repo_root, 500, watch_tx.clone()) {
        Ok(w) => {
            app.watching = true;
            Some(w)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not start file watcher");
            None
        }
    };

    loop {
        let size = terminal.size()?;
        app.viewport_height = ui::diff_area_height(app, Rect::new(0, 0, size.width, size.height));
        app.ensure_layout();

        terminal.draw(|f| ui::draw(f, app, hl))?;

        // Poll for events with a timeout (lets us pump the stream and watch events too)
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match app.input_mode {
                    InputMode::Search => handle_search_input(app, key),
                    InputMode::Normal => handle_normal_input(app, key, &watch_tx, &mut watcher),
                }
            }
        }

        // Collect file watch events; refresh once they settle
        while let Ok(WatchEvent::FilesChanged(paths)) = watch_rx.try_recv() {
            pending_paths.extend(paths);
            refresh_deadline = Instant::now() + Duration::from_millis(200);
        }
        if !pending_paths.is_empty() && Instant::now() >= refresh_deadline {
            let paths = std::mem::take(&mut pending_paths);
            app.files_changed(&paths);
        }

        app.tick();

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_normal_input(
    app: &mut App,
    key: KeyEvent,
    watch_tx: &mpsc::Sender<WatchEvent>,
    watcher: &mut Option<FileWatcher>,
) {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.should_quit = true,
        KeyCode::Char('q') => app.should_quit = true,

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => app.page_down(),
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => app.page_up(),
        KeyCode::PageDown | KeyCode::Char(' ') => app.page_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_bottom(),
        KeyCode::Right => app.scroll_right(4),
        KeyCode::Left => app.scroll_left(4),

        // Hunks
        KeyCode::Char(']') => app.next_hunk(),
        KeyCode::Char('[') => app.prev_hunk(),
        KeyCode::Char('c') | KeyCode::Enter => app.toggle_collapse(),
        KeyCode::Char('s') => app.toggle_split(),

        // Search
        KeyCode::Char('/') => {
            app.input_mode = InputMode::Search;
            app.search_input.clear();
        }
        KeyCode::Char('n') => app.next_match(),
        KeyCode::Char('N') => app.prev_match(),
        KeyCode::Esc => {
            if app.search.take().is_some() {
                app.notify("Search cleared");
            }
        }

        // Session
        KeyCode::Char('r') => app.retry(),
        KeyCode::Char('x') => app.cancel_stream(),
        KeyCode::Char('l') => app.cycle_lfm_override(),
        KeyCode::Char('p') => app.cycle_preset(),
        KeyCode::Char('1') => app.set_side(DiffSide::Unstaged),
        KeyCode::Char('2') => app.set_side(DiffSide::Staged),

        // Toggle watch mode
        KeyCode::Char('w') => {
            if app.watching {
                *watcher = None;
                app.watching = false;
                app.notify("Watch stopped");
            } else {
                match FileWatcher::new(&app.request.repo_root, 500, watch_tx.clone()) {
                    Ok(w) => {
                        *watcher = Some(w);
                        app.watching = true;
                        app.notify("Watching for changes");
                    }
                    Err(e) => app.notify(&format!("Watch failed: {}", e)),
                }
            }
        }
        _ => {}
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            app.start_search();
        }
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
            app.search_input.clear();
        }
        KeyCode::Char(c) => app.search_input.push(c),
        KeyCode::Backspace => {
            app.search_input.pop();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfm_flags_map_to_override() {
        let cli = Cli::parse_from(["streamdiff", "--force-lfm"]);
        assert_eq!(cli.override_mode(), OverrideMode::On);
        let cli = Cli::parse_from(["streamdiff", "--no-lfm", "src/a.rs"]);
        assert_eq!(cli.override_mode(), OverrideMode::Off);
        assert_eq!(cli.path.as_deref(), Some("src/a.rs"));
        let cli = Cli::parse_from(["streamdiff"]);
        assert_eq!(cli.override_mode(), OverrideMode::Auto);
    }

    #[test]
    fn conflicting_lfm_flags_are_rejected() {
        assert!(Cli::try_parse_from(["streamdiff", "--force-lfm", "--no-lfm"]).is_err());
    }

    #[test]
    fn unknown_paths_pass_through() {
        assert_eq!(repo_relative(Path::new("/repo"), "does/not/exist.rs"), "does/not/exist.rs");
    }
}
