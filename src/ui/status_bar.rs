use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::styles;
use crate::app::{App, InputMode, SessionPhase};
use crate::git::DiffSide;
use crate::lfm::DecisionReason;

/// Compute the display width of a list of spans
fn spans_width(spans: &[Span]) -> usize {
    spans.iter().map(|s| s.content.chars().count()).sum()
}

pub fn top_bar_height() -> u16 {
    2
}

fn megabytes(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Render the top status bar
///
///   Row 1: repo · branch · path                      streaming progress
///   Row 2: 1 UNSTAGED  2 STAGED  LFM badge           cache stats  WATCHING
pub fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let bar_width = area.width as usize;
    let panel_bg = styles::panel_style();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    // ── Info row ──
    let repo_name = app
        .request
        .repo_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| app.request.repo_root.display().to_string());
    let mut info: Vec<Span> = vec![
        Span::styled(format!(" {}", repo_name), styles::bold(styles::CYAN)),
        Span::styled(" · ", styles::fg(styles::BORDER)),
        Span::styled(app.branch.clone(), styles::fg(styles::GREEN)),
    ];
    if let Some(path) = &app.request.path {
        info.push(Span::styled(" · ", styles::fg(styles::BORDER)));
        info.push(Span::styled(path.clone(), styles::fg(styles::TEXT)));
    }

    let mut progress: Vec<Span> = Vec::new();
    if let Some(session) = &app.session {
        let files = session.files.len();
        let mut label = format!(
            "{} file{} · {} hunk{}",
            files,
            if files == 1 { "" } else { "s" },
            session.hunks_received,
            if session.hunks_received == 1 { "" } else { "s" },
        );
        label.push_str(&format!(" · {}", megabytes(session.spool_bytes())));
        if session.spool_on_disk() {
            label.push_str(" on disk");
        }
        let queued = session.queued();
        if queued > 0 {
            label.push_str(&format!(" · {} queued", queued));
        }
        if session.malformed > 0 {
            label.push_str(&format!(" · {} skipped", session.malformed));
        }
        let (suffix, color) = match &session.phase {
            SessionPhase::Streaming => (" · streaming…".to_string(), styles::YELLOW),
            SessionPhase::Complete => (
                session
                    .elapsed
                    .map(|d| format!(" · {}ms", d.as_millis()))
                    .unwrap_or_default(),
                styles::MUTED,
            ),
            SessionPhase::Cancelled => (" · cancelled".to_string(), styles::ORANGE),
            SessionPhase::Failed(_) => (" · failed".to_string(), styles::RED),
        };
        progress.push(Span::styled(label, styles::muted()));
        progress.push(Span::styled(suffix, styles::fg(color)));
        progress.push(Span::raw(" "));
    }
    let gap = bar_width.saturating_sub(spans_width(&info) + spans_width(&progress));
    info.push(Span::raw(" ".repeat(gap)));
    info.extend(progress);
    f.render_widget(Paragraph::new(Line::from(info)).style(panel_bg), rows[0]);

    // ── Modes row ──
    let mode_style = |side: DiffSide| {
        if side == app.request.side {
            styles::badge_style(styles::BLUE)
        } else {
            styles::muted()
        }
    };
    let mut modes: Vec<Span> = vec![
        Span::raw(" "),
        Span::styled(" 1 ", mode_style(DiffSide::Unstaged)),
        Span::styled(" UNSTAGED ", mode_style(DiffSide::Unstaged)),
        Span::raw(" "),
        Span::styled(" 2 ", mode_style(DiffSide::Staged)),
        Span::styled(" STAGED ", mode_style(DiffSide::Staged)),
        Span::raw("  "),
    ];

    if let Some(session) = &app.session {
        let decision = &session.decision;
        if decision.active {
            let reason = match decision.reason {
                DecisionReason::Forced => "forced",
                _ => "auto",
            };
            modes.push(Span::styled(format!(" LFM {} ", reason), styles::badge_style(styles::ORANGE)));
            let degraded: Vec<&str> = decision.degradations.iter().map(|d| d.label()).collect();
            modes.push(Span::styled(
                format!(" {}", degraded.join(" · ")),
                styles::fg(styles::ORANGE),
            ));
            if !decision.exceeded.is_empty() {
                let limits: Vec<&str> = decision.exceeded.iter().map(|l| l.label()).collect();
                modes.push(Span::styled(
                    format!(" (over {})", limits.join(", ")),
                    styles::dim(),
                ));
            }
        } else if decision.reason == DecisionReason::NoPreflight {
            modes.push(Span::styled(" no preflight ", styles::dim()));
        }
    }
    modes.push(Span::styled(
        format!("  override:{} preset:{}", app.request.cli_override.label(), app.request.preset.name()),
        styles::dim(),
    ));

    let mut right: Vec<Span> = Vec::new();
    let stats = app.cache.stats();
    right.push(Span::styled(
        format!(
            "cache {} hit · {} miss · {} evicted · {}",
            stats.hit_count,
            stats.miss_count,
            stats.eviction_count,
            megabytes(stats.total_bytes as u64),
        ),
        styles::dim(),
    ));
    if app.watching {
        right.push(Span::raw("  "));
        right.push(Span::styled(
            "\u{25cf} WATCHING",
            styles::bold(styles::GREEN),
        ));
    }
    right.push(Span::raw(" "));

    let gap = bar_width.saturating_sub(spans_width(&modes) + spans_width(&right));
    modes.push(Span::raw(" ".repeat(gap)));
    modes.extend(right);
    f.render_widget(Paragraph::new(Line::from(modes)).style(panel_bg), rows[1]);
}

/// A key-label hint pair, e.g. ("s", " split ")
struct Hint {
    key: String,
    label: String,
}

impl Hint {
    fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }

    fn indicator(label: String) -> Self {
        Self {
            key: String::new(),
            label,
        }
    }

    fn width(&self) -> usize {
        self.key.chars().count() + self.label.chars().count()
    }
}

fn build_hints(app: &App) -> Vec<Hint> {
    let mut hints = vec![
        Hint::new("j/k", " scroll "),
        Hint::new("]/[", " hunks "),
        Hint::new("c", " collapse "),
        Hint::new("/", " search "),
    ];
    let split_allowed = app.session.as_ref().map(|s| s.features().side_by_side).unwrap_or(false);
    if split_allowed {
        hints.push(Hint::new("s", " split "));
    }
    if app.session.as_ref().map(|s| s.is_streaming()).unwrap_or(false) {
        hints.push(Hint::new("x", " cancel "));
    }
    hints.push(Hint::new("r", " refresh "));
    hints.push(Hint::new("l", " lfm "));
    hints.push(Hint::new("p", " preset "));
    hints.push(Hint::new("w", " watch "));
    hints.push(Hint::new("q", " quit "));

    if let Some(job) = &app.search {
        let label = if job.hits.is_empty() {
            format!(" \"{}\": {} ", job.query, if job.done { "no matches" } else { "searching…" })
        } else {
            format!(" \"{}\": {}/{} ", job.query, app.search_cursor + 1, job.hits.len())
        };
        hints.push(Hint::new("n/N", " next/prev "));
        hints.push(Hint::indicator(label));
    }
    hints
}

/// Pack hints into rows that fit within `width`, returns vec of Lines
fn pack_hint_lines(hints: &[Hint], width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current_spans: Vec<Span<'static>> = Vec::new();
    let mut current_w: usize = 1; // leading space

    for hint in hints {
        let hw = hint.width();
        if current_w + hw > width && !current_spans.is_empty() {
            lines.push(Line::from(current_spans));
            current_spans = Vec::new();
            current_w = 1;
        }
        if current_spans.is_empty() {
            current_spans.push(Span::raw(" "));
        }
        if !hint.key.is_empty() {
            current_spans.push(Span::styled(hint.key.clone(), styles::key_hint_style()));
        }
        let label_style = if hint.key.is_empty() {
            styles::fg(styles::YELLOW)
        } else {
            styles::dim()
        };
        current_spans.push(Span::styled(hint.label.clone(), label_style));
        current_w += hw;
    }
    if !current_spans.is_empty() {
        lines.push(Line::from(current_spans));
    }
    if lines.is_empty() {
        lines.push(Line::from(vec![Span::raw(" ")]));
    }
    lines
}

/// Calculate how many rows the bottom bar needs
pub fn bottom_bar_height(app: &App, width: u16) -> u16 {
    match app.input_mode {
        InputMode::Search => 1,
        InputMode::Normal => {
            let lines = pack_hint_lines(&build_hints(app), width as usize);
            (lines.len() as u16).max(1)
        }
    }
}

/// Render the bottom keybinding hints bar
pub fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let panel_bg = styles::panel_style();

    match app.input_mode {
        InputMode::Search => {
            let spans = vec![
                Span::styled(" /", styles::key_hint_style()),
                Span::styled(format!(" {}", app.search_input), styles::fg(styles::TEXT)),
                Span::styled("█", styles::fg(styles::BLUE)),
                Span::raw("  "),
                Span::styled("Enter", styles::key_hint_style()),
                Span::styled(" search  ", styles::dim()),
                Span::styled("Esc", styles::key_hint_style()),
                Span::styled(" cancel", styles::dim()),
            ];
            f.render_widget(Paragraph::new(Line::from(spans)).style(panel_bg), area);
        }
        InputMode::Normal => {
            let lines = pack_hint_lines(&build_hints(app), area.width as usize);
            let constraints: Vec<Constraint> = lines.iter().map(|_| Constraint::Length(1)).collect();
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints(constraints)
                .split(area);
            for (line, row) in lines.into_iter().zip(rows.iter()) {
                f.render_widget(Paragraph::new(line).style(panel_bg), *row);
            }
        }
    }
}

/// Render watch notification overlay
pub fn render_watch_notification(f: &mut Frame, area: Rect, message: &str) {
    let notif_width = message.chars().count() as u16 + 4;
    let notif_area = Rect {
        x: area.x + area.width.saturating_sub(notif_width + 2),
        y: area.y + 2,
        width: notif_width.min(area.width),
        height: 1,
    };

    let notif = Paragraph::new(Line::from(vec![
        Span::styled(" ● ", styles::fg(styles::GREEN)),
        Span::styled(message.to_string(), styles::fg(styles::TEXT)),
        Span::raw(" "),
    ]))
    .style(styles::panel_style().fg(styles::TEXT));

    f.render_widget(notif, notif_area);
}
