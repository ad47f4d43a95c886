use super::search::{SearchHit, SearchJob, SearchTarget};
use super::session::{DiffSession, SessionPhase, SessionRequest, SessionSnapshot};
use crate::cache::DiffCache;
use crate::config::{save_preset, StreamdiffConfig};
use crate::diff::pair_rows;
use crate::git::{self, DiffSide};
use crate::lfm::Preset;
use crate::ui::viewport::{DiffLayout, Row};
use std::path::Path;
use std::sync::Arc;

/// Whether we're navigating or typing a search query
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct App {
    pub config: StreamdiffConfig,

    /// Shared by the session, the renderer and the search worker
    pub cache: Arc<DiffCache>,

    /// Template for the next session; flags toggled at runtime land here
    pub request: SessionRequest,

    pub session: Option<DiffSession>,

    /// Set when the diff could not be produced; the view shows it with a retry hint
    pub error: Option<String>,

    /// Fingerprint and hunk counts of the last finished session
    previous: Option<SessionSnapshot>,

    pub layout: DiffLayout,
    layout_dirty: bool,

    /// Scroll position to return to once a restarted diff has enough rows
    restore_scroll: Option<usize>,

    /// User wants side-by-side; only honoured when the session allows it
    pub split: bool,

    /// First visible row
    pub scroll: usize,
    pub h_scroll: u16,

    /// Rows available to the diff view, updated from the terminal size
    pub viewport_height: usize,

    pub input_mode: InputMode,
    pub search_input: String,
    pub search: Option<SearchJob>,
    pub search_cursor: usize,

    pub branch: String,

    pub should_quit: bool,

    /// Whether watch mode is active
    pub watching: bool,

    /// Last notification message
    pub message: Option<String>,

    /// Ticks since last notification (for auto-clearing)
    pub message_ticks: u8,
}

impl App {
    pub fn new(request: SessionRequest, config: StreamdiffConfig) -> Self {
        let cache = Arc::new(DiffCache::new(config.cache.limits()));
        let branch = git::current_branch_in(&request.repo_root).unwrap_or_default();
        Self {
            config,
            cache,
            request,
            session: None,
            error: None,
            previous: None,
            layout: DiffLayout::default(),
            layout_dirty: true,
            restore_scroll: None,
            split: false,
            scroll: 0,
            h_scroll: 0,
            viewport_height: 20,
            input_mode: InputMode::Normal,
            search_input: String::new(),
            search: None,
            search_cursor: 0,
            branch,
            should_quit: false,
            watching: false,
            message: None,
            message_ticks: 0,
        }
    }

    /// Start (or restart) the diff session. Errors end up in `self.error`.
    pub fn start_session(&mut self) {
        if let Some(mut old) = self.session.take() {
            old.cancel();
            if old.phase == SessionPhase::Complete {
                self.previous = Some(old.snapshot());
            }
        }
        self.search = None;
        self.error = None;
        self.restore_scroll = Some(self.scroll);

        match DiffSession::start(self.request.clone(), &self.config) {
            Ok(session) => {
                if let Some(warning) = &session.preflight_error {
                    self.notify(&format!("Preflight failed, full parse: {warning}"));
                }
                self.session = Some(session);
            }
            Err(e) => {
                if e.is_not_found() {
                    tracing::info!(error = %e, "nothing to diff");
                    self.error = Some(format!("{e}\nCheck the repository and path, then retry."));
                } else {
                    tracing::warn!(error = %e, "could not start diff");
                    self.error = Some(e.to_string());
                }
            }
        }
        self.layout_dirty = true;
        self.ensure_layout();
    }

    pub fn retry(&mut self) {
        self.start_session();
        if self.error.is_none() {
            self.notify("Refreshing");
        }
    }

    pub fn set_side(&mut self, side: DiffSide) {
        if self.request.side != side {
            self.request.side = side;
            self.scroll = 0;
            self.start_session();
        }
        self.notify(side.label());
    }

    /// Cycle the LFM override (auto → on → off) and re-run the diff
    pub fn cycle_lfm_override(&mut self) {
        self.request.cli_override = self.request.cli_override.cycle();
        self.start_session();
        self.notify(&format!("Large file mode: {}", self.request.cli_override.label()));
    }

    /// Cycle the threshold preset, persist it and re-run the diff
    pub fn cycle_preset(&mut self) {
        let next = match self.request.preset {
            Preset::Default => Preset::Conservative,
            Preset::Conservative => Preset::Aggressive,
            Preset::Aggressive => Preset::Default,
        };
        self.request.preset = next;
        self.config.lfm.preset = next;
        let saved = save_preset(next);
        self.start_session();
        match saved {
            Ok(_) => self.notify(&format!("Preset: {next:?} (saved)")),
            Err(e) => self.notify(&format!("Preset: {next:?} (not saved: {e})")),
        }
    }

    pub fn cancel_stream(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.is_streaming() {
                session.cancel();
                self.notify("Diff cancelled");
            }
        }
    }

    /// Per-iteration work: take parsed hunks, collect search hits, expire notifications.
    pub fn tick(&mut self) {
        let budget = self.config.stream.pending_hunks.max(1);
        if let Some(session) = self.session.as_mut() {
            let was_streaming = session.is_streaming();
            if session.pump(&self.cache, budget) > 0 {
                self.layout_dirty = true;
            }
            if was_streaming && !session.is_streaming() {
                self.layout_dirty = true;
                if let SessionPhase::Failed(msg) = &session.phase {
                    self.error = Some(msg.clone());
                }
                if let Some(previous) = self.previous.take() {
                    session.reconcile_cache(&previous, &self.cache);
                }
            }
        }

        if let Some(job) = self.search.as_mut() {
            if job.poll() && job.hits.len() == 1 && self.search_cursor == 0 {
                self.jump_to_hit(0);
            }
        }

        self.ensure_layout();

        if self.message.is_some() {
            self.message_ticks += 1;
            if self.message_ticks > 20 {
                self.message = None;
                self.message_ticks = 0;
            }
        }
    }

    pub fn notify(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_ticks = 0;
    }

    /// Side-by-side only when asked for and not degraded away
    pub fn split_active(&self) -> bool {
        self.split
            && self
                .session
                .as_ref()
                .map(|s| s.features().side_by_side)
                .unwrap_or(false)
    }

    pub fn ensure_layout(&mut self) {
        if !self.layout_dirty {
            return;
        }
        let split = self.split_active();
        self.layout = match &self.session {
            Some(session) => DiffLayout::build(&session.files, split),
            None => DiffLayout::default(),
        };
        self.layout_dirty = false;
        if let Some(target) = self.restore_scroll {
            let streaming = self.session.as_ref().map(|s| s.is_streaming()).unwrap_or(false);
            if self.max_scroll() >= target || !streaming {
                self.scroll = target;
                self.restore_scroll = None;
            }
        }
        self.clamp_scroll();
    }

    // ── Scrolling ──

    fn max_scroll(&self) -> usize {
        self.layout.total_rows().saturating_sub(self.viewport_height.max(1))
    }

    fn clamp_scroll(&mut self) {
        self.scroll = self.scroll.min(self.max_scroll());
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.restore_scroll = None;
        self.scroll = (self.scroll + amount).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.restore_scroll = None;
        self.scroll = self.scroll.saturating_sub(amount);
    }

    pub fn page_down(&mut self) {
        self.scroll_down(self.viewport_height.saturating_sub(2).max(1));
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.viewport_height.saturating_sub(2).max(1));
    }

    pub fn scroll_top(&mut self) {
        self.restore_scroll = None;
        self.scroll = 0;
    }

    pub fn scroll_bottom(&mut self) {
        self.restore_scroll = None;
        self.scroll = self.max_scroll();
    }

    pub fn scroll_right(&mut self, amount: u16) {
        self.h_scroll = self.h_scroll.saturating_add(amount);
    }

    pub fn scroll_left(&mut self, amount: u16) {
        self.h_scroll = self.h_scroll.saturating_sub(amount);
    }

    fn scroll_to_row(&mut self, row: usize) {
        // Keep a little context above the target
        self.scroll = row.saturating_sub(2).min(self.max_scroll());
    }

    // ── Hunk navigation ──

    /// File and hunk under the top row
    pub fn current_hunk(&self) -> Option<(usize, usize)> {
        match self.layout.row(self.scroll)? {
            Row::FileHeader { file } => self
                .layout
                .hunk_row(file, 0)
                .map(|_| (file, 0)),
            Row::HunkHeader { file, hunk } | Row::Body { file, hunk, .. } => Some((file, hunk)),
        }
    }

    pub fn next_hunk(&mut self) {
        let scroll = self.scroll;
        if let Some((row, _, _)) = self.layout.hunk_rows().find(|&(row, _, _)| row > scroll) {
            self.scroll = row.min(self.max_scroll());
        }
    }

    pub fn prev_hunk(&mut self) {
        let scroll = self.scroll;
        if let Some((row, _, _)) = self.layout.hunk_rows().filter(|&(row, _, _)| row < scroll).last() {
            self.scroll = row;
        }
    }

    pub fn toggle_collapse(&mut self) {
        let Some((file, hunk)) = self.current_hunk() else {
            return;
        };
        let Some(slot) = self
            .session
            .as_mut()
            .and_then(|s| s.files.get_mut(file))
            .and_then(|f| f.hunks.get_mut(hunk))
        else {
            return;
        };
        slot.is_collapsed = !slot.is_collapsed;
        self.layout_dirty = true;
        self.ensure_layout();
        if let Some(row) = self.layout.hunk_row(file, hunk) {
            self.scroll = row.min(self.max_scroll());
        }
    }

    pub fn toggle_split(&mut self) {
        let allowed = self
            .session
            .as_ref()
            .map(|s| s.features().side_by_side)
            .unwrap_or(false);
        if !allowed {
            self.notify("Side-by-side is off in large file mode");
            return;
        }
        self.split = !self.split;
        self.layout_dirty = true;
        self.ensure_layout();
        self.notify(if self.split { "Split view" } else { "Unified view" });
    }

    // ── Search ──

    pub fn start_search(&mut self) {
        let query = self.search_input.trim().to_string();
        self.search = None;
        self.search_cursor = 0;
        if query.is_empty() {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let targets = session
            .files
            .iter()
            .enumerate()
            .flat_map(|(file, f)| {
                f.hunks.iter().map(move |slot| SearchTarget {
                    file,
                    slot: slot.clone(),
                })
            })
            .collect();
        let provider = session.provider(self.cache.clone());
        self.search = Some(SearchJob::spawn(&query, targets, provider));
    }

    pub fn next_match(&mut self) {
        let count = self.search.as_ref().map(|s| s.hits.len()).unwrap_or(0);
        if count == 0 {
            self.notify("No matches");
            return;
        }
        let next = (self.search_cursor + 1) % count;
        self.jump_to_hit(next);
    }

    pub fn prev_match(&mut self) {
        let count = self.search.as_ref().map(|s| s.hits.len()).unwrap_or(0);
        if count == 0 {
            self.notify("No matches");
            return;
        }
        let prev = (self.search_cursor + count - 1) % count;
        self.jump_to_hit(prev);
    }

    fn jump_to_hit(&mut self, index: usize) {
        let Some(hit) = self.search.as_ref().and_then(|s| s.hits.get(index)).copied() else {
            return;
        };
        self.search_cursor = index;

        // A hit inside a collapsed hunk opens it
        if let Some(slot) = self
            .session
            .as_mut()
            .and_then(|s| s.files.get_mut(hit.file))
            .and_then(|f| f.hunks.get_mut(hit.hunk))
        {
            if slot.is_collapsed {
                slot.is_collapsed = false;
                self.layout_dirty = true;
                self.ensure_layout();
            }
        }

        if let Some(header) = self.layout.hunk_row(hit.file, hit.hunk) {
            let body_row = self.body_row_for_line(hit).unwrap_or(hit.line);
            self.scroll_to_row(header + 1 + body_row);
        }
    }

    /// Body row of a hit's line; differs from the line index in split view
    fn body_row_for_line(&self, hit: SearchHit) -> Option<usize> {
        if !self.split_active() {
            return Some(hit.line);
        }
        let session = self.session.as_ref()?;
        let slot = session.files.get(hit.file)?.hunks.get(hit.hunk)?;
        let hunk = session.provider(self.cache.clone()).hunk(slot).ok()?;
        pair_rows(hunk.lines()?)
            .iter()
            .position(|pair| pair.left == Some(hit.line) || pair.right == Some(hit.line))
    }

    // ── File watching ──

    /// React to changed paths: evict their cache entries and re-run the diff
    /// if it covers any of them.
    pub fn files_changed(&mut self, paths: &[String]) {
        let root = self.request.repo_root.clone();
        let mut relevant = false;
        let mut count = 0;
        for path in paths {
            let rel = relative_path(&root, path);
            if rel.starts_with(".git/") {
                // Index or refs moved; both sides compare against the index
                relevant = true;
                continue;
            }
            count += 1;
            self.cache.remove_file(&rel);
            relevant |= match &self.request.path {
                Some(target) => *target == rel,
                None => true,
            };
        }
        if relevant {
            self.start_session();
            if count == 0 {
                self.notify("Index changed");
            } else {
                self.notify(&format!(
                    "{} file{} changed",
                    count,
                    if count == 1 { "" } else { "s" }
                ));
            }
        }
    }
}

fn relative_path(root: &Path, path: &str) -> String {
    Path::new(path)
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lfm::OverrideMode;
    use std::path::PathBuf;

    fn make_app() -> App {
        let request = SessionRequest {
            repo_root: PathBuf::from("/definitely/not/a/repo"),
            path: None,
            side: DiffSide::Unstaged,
            cli_override: OverrideMode::Auto,
            preset: Preset::Default,
            run_preflight: false,
        };
        App::new(request, StreamdiffConfig::default())
    }

    #[test]
    fn failed_start_sets_inline_error() {
        let mut app = make_app();
        app.start_session();
        assert!(app.session.is_none());
        assert!(app.error.as_deref().unwrap_or("").contains("not a git repository"));
    }

    #[test]
    fn notifications_expire() {
        let mut app = make_app();
        app.notify("hello");
        for _ in 0..21 {
            app.tick();
        }
        assert!(app.message.is_none());
    }

    #[test]
    fn scrolling_is_clamped_without_content() {
        let mut app = make_app();
        app.ensure_layout();
        app.scroll_down(10);
        assert_eq!(app.scroll, 0);
        app.scroll_up(3);
        assert_eq!(app.scroll, 0);
    }

    #[test]
    fn split_needs_a_session() {
        let mut app = make_app();
        app.toggle_split();
        assert!(!app.split);
    }

    #[test]
    fn index_change_restarts_unstaged_diff() {
        let mut app = make_app();
        assert!(app.error.is_none());
        app.files_changed(&["/definitely/not/a/repo/.git/index".to_string()]);
        // The restart ran and failed on the missing repo
        assert!(app.error.is_some());
    }

    #[test]
    fn index_change_restarts_staged_diff() {
        let mut app = make_app();
        app.request.side = DiffSide::Staged;
        app.files_changed(&["/definitely/not/a/repo/.git/refs/heads/main".to_string()]);
        assert!(app.error.is_some());
    }

    #[test]
    fn unrelated_file_is_ignored_for_single_path_diff() {
        let mut app = make_app();
        app.request.path = Some("src/a.rs".to_string());
        app.files_changed(&["/definitely/not/a/repo/src/b.rs".to_string()]);
        assert!(app.error.is_none());
    }

    #[test]
    fn relative_paths_strip_root() {
        assert_eq!(relative_path(Path::new("/repo"), "/repo/src/a.rs"), "src/a.rs");
        assert_eq!(relative_path(Path::new("/repo"), "/elsewhere/x"), "/elsewhere/x");
    }
}
