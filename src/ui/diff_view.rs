use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::highlight::{ColorRun, Highlighter};
use super::styles;
use super::viewport::{visible_range, with_margin, Row};
use crate::app::{App, DiffSession, SearchHit};
use crate::diff::{pair_rows, DiffHunk, DiffLine, FileDiff, FileStatus, LineKind, SplitRow};

/// Per-frame rendering options derived from the session and config
struct RenderCtx {
    syntax: bool,
    max_line_length: usize,
    line_numbers: bool,
    tab_width: usize,
    split: bool,
    half_width: usize,
}

/// A hunk loaded for this frame, or why it could not be
enum Loaded {
    Hunk {
        hunk: Arc<DiffHunk>,
        pairs: Vec<SplitRow>,
    },
    Failed(String),
}

/// Render the diff view. Only rows inside the viewport plus the buffer margin
/// are built; hunk content comes from the cache or the spool.
pub fn render(f: &mut Frame, area: Rect, app: &App, hl: &mut Highlighter) {
    if let Some(error) = &app.error {
        render_error(f, area, error);
        return;
    }
    let Some(session) = app.session.as_ref() else {
        render_message(f, area, "  Starting…", "");
        return;
    };
    let total = app.layout.total_rows();
    if total == 0 {
        if session.is_streaming() {
            render_message(f, area, "  Reading diff…", "  x to cancel");
        } else {
            render_message(f, area, "  No changes", "  Switch sides with [1] [2]");
        }
        return;
    }

    let features = session.features();
    let ctx = RenderCtx {
        syntax: features.syntax_highlight,
        max_line_length: session.decision.thresholds.max_line_length as usize,
        line_numbers: app.config.display.line_numbers,
        tab_width: app.config.display.tab_width.max(1) as usize,
        split: app.split_active(),
        half_width: (area.width as usize / 2).max(1),
    };

    let visible = visible_range(app.scroll, area.height as usize, 1, total);
    let window = with_margin(visible, app.config.display.buffer_margin, total);

    let provider = session.provider(app.cache.clone());
    let mut loaded: HashMap<(usize, usize), Loaded> = HashMap::new();
    let current = app.current_hunk();
    let hits: &[SearchHit] = app.search.as_ref().map(|s| s.hits.as_slice()).unwrap_or(&[]);

    let mut lines: Vec<Line<'static>> = Vec::with_capacity(window.len());
    for row in window.clone() {
        let Some(kind) = app.layout.row(row) else {
            break;
        };
        let line = match kind {
            Row::FileHeader { file } => session.files.get(file).map(file_header_line).unwrap_or_default(),
            Row::HunkHeader { file, hunk } => slot_at(session, file, hunk)
                .map(|slot| hunk_header_line(slot, current == Some((file, hunk))))
                .unwrap_or_default(),
            Row::Body { file, hunk, row } => {
                let Some(slot) = slot_at(session, file, hunk) else {
                    lines.push(Line::default());
                    continue;
                };
                let entry = loaded.entry((file, hunk)).or_insert_with(|| {
                    match provider.hunk(slot) {
                        Ok(h) => {
                            let pairs = if ctx.split {
                                h.lines().map(pair_rows).unwrap_or_default()
                            } else {
                                Vec::new()
                            };
                            Loaded::Hunk { hunk: h, pairs }
                        }
                        Err(e) => {
                            tracing::warn!(file = %slot.file, hunk = slot.index, error = %e, "could not load hunk");
                            Loaded::Failed(e.to_string())
                        }
                    }
                });
                let path = slot.file.as_str();
                match entry {
                    Loaded::Failed(msg) if row == 0 => Line::from(Span::styled(
                        format!("  ⚠ could not load hunk: {} (r to retry)", msg),
                        styles::error_style(),
                    )),
                    Loaded::Failed(_) => Line::from(""),
                    Loaded::Hunk { hunk: h, pairs } => {
                        let body = h.lines().unwrap_or_default();
                        let is_hit = |line: usize| {
                            hits.binary_search(&SearchHit { file, hunk, line }).is_ok()
                        };
                        if ctx.split {
                            match pairs.get(row) {
                                Some(pair) => split_line(&ctx, hl, path, body, *pair, is_hit),
                                None => Line::from(""),
                            }
                        } else {
                            match body.get(row) {
                                Some(line) => unified_line(&ctx, hl, path, line, is_hit(row)),
                                None => Line::from(""),
                            }
                        }
                    }
                }
            }
        };
        lines.push(line);
    }

    let block = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG));
    let offset = app.scroll.saturating_sub(window.start).min(u16::MAX as usize) as u16;
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((offset, app.h_scroll));
    f.render_widget(paragraph, area);

    render_hunk_indicator(f, area, app, session);
}

fn slot_at(session: &DiffSession, file: usize, hunk: usize) -> Option<&DiffHunk> {
    session.files.get(file)?.hunks.get(hunk)
}

fn file_header_line(file: &FileDiff) -> Line<'static> {
    let status_style = match &file.status {
        FileStatus::Added => styles::bold(styles::GREEN),
        FileStatus::Deleted => styles::bold(styles::RED),
        _ => styles::bold(styles::YELLOW),
    };
    let mut spans = vec![
        Span::styled(format!(" {} ", file.status.symbol()), status_style),
        Span::styled(file.path().to_string(), styles::file_header_style()),
    ];
    if let FileStatus::Renamed(old) = &file.status {
        spans.push(Span::styled(format!(" (from {})", old), styles::dim()));
    }
    spans.push(Span::styled(
        format!("  +{} -{}", file.additions(), file.deletions()),
        styles::dim(),
    ));
    if file.binary {
        spans.push(Span::styled("  binary", styles::muted()));
    }
    if let Some((old, new)) = &file.mode_change {
        spans.push(Span::styled(format!("  mode {} → {}", old, new), styles::muted()));
    }
    if file.partially_parsed {
        spans.push(Span::styled("  ⚠ some hunks skipped", styles::error_style()));
    }
    Line::from(spans).style(styles::file_header_style())
}

fn hunk_header_line(slot: &DiffHunk, is_current: bool) -> Line<'static> {
    let marker = match (slot.is_collapsed, is_current) {
        (true, _) => "▸",
        (false, true) => "▶",
        (false, false) => " ",
    };
    let marker_style = if is_current {
        Style::default().fg(styles::CYAN).bg(styles::HUNK_BG)
    } else {
        styles::dim().bg(styles::HUNK_BG)
    };
    let mut spans = vec![
        Span::styled(format!(" {} ", marker), marker_style),
        Span::styled(slot.header.to_line(), styles::hunk_header_style()),
    ];
    if slot.is_collapsed {
        spans.push(Span::styled(
            format!("  ({} lines hidden)", slot.line_count),
            styles::dim().bg(styles::HUNK_BG),
        ));
    }
    Line::from(spans).style(styles::hunk_header_style())
}

fn line_style(kind: LineKind) -> Style {
    match kind {
        LineKind::Addition => styles::add_style(),
        LineKind::Deletion => styles::del_style(),
        LineKind::Context => styles::default_style(),
    }
}

fn line_spans(
    ctx: &RenderCtx,
    hl: &mut Highlighter,
    path: &str,
    line: &DiffLine,
    is_hit: bool,
) -> Vec<Span<'static>> {
    let base = if is_hit { styles::match_style() } else { line_style(line.kind) };
    let runs: Arc<[ColorRun]> = if ctx.syntax && !is_hit {
        hl.highlight_line(&line.content, path, ctx.max_line_length)
    } else {
        Arc::from(Vec::new())
    };
    let mut spans = Vec::new();
    if ctx.line_numbers {
        let num = |n: Option<u32>| n.map(|n| format!("{:>5}", n)).unwrap_or_else(|| "     ".to_string());
        spans.push(Span::styled(
            format!("{} {} │", num(line.old_num), num(line.new_num)),
            styles::dim().bg(base.bg.unwrap_or(styles::BG)),
        ));
    }
    spans.push(Span::styled(line.kind.prefix().to_string(), base));
    spans.extend(content_spans(
        &line.content,
        &runs,
        &line.highlights,
        base,
        line.kind == LineKind::Addition,
        ctx.tab_width,
    ));
    spans
}

fn unified_line(ctx: &RenderCtx, hl: &mut Highlighter, path: &str, line: &DiffLine, is_hit: bool) -> Line<'static> {
    let base = if is_hit { styles::match_style() } else { line_style(line.kind) };
    Line::from(line_spans(ctx, hl, path, line, is_hit)).style(base)
}

fn split_line(
    ctx: &RenderCtx,
    hl: &mut Highlighter,
    path: &str,
    lines: &[DiffLine],
    pair: SplitRow,
    is_hit: impl Fn(usize) -> bool,
) -> Line<'static> {
    let mut side = |index: Option<usize>| match index.and_then(|i| lines.get(i).map(|l| (i, l))) {
        Some((i, line)) => fit_spans(line_spans(ctx, hl, path, line, is_hit(i)), ctx.half_width, line_style(line.kind)),
        None => fit_spans(Vec::new(), ctx.half_width, styles::default_style()),
    };
    let mut spans = side(pair.left);
    spans.extend(side(pair.right));
    Line::from(spans)
}

/// Split `content` at syntax run and word-diff boundaries. Syntax colours the
/// foreground; changed words get the word background on top of `base`.
fn content_spans(
    content: &str,
    runs: &[ColorRun],
    highlights: &[Range<usize>],
    base: Style,
    addition: bool,
    tab_width: usize,
) -> Vec<Span<'static>> {
    if content.is_empty() {
        return Vec::new();
    }
    let mut cuts: Vec<usize> = vec![0, content.len()];
    for (range, _) in runs {
        cuts.push(range.start);
        cuts.push(range.end);
    }
    for range in highlights {
        cuts.push(range.start);
        cuts.push(range.end);
    }
    cuts.retain(|&c| c <= content.len() && content.is_char_boundary(c));
    cuts.sort_unstable();
    cuts.dedup();

    let tab = " ".repeat(tab_width);
    let mut spans = Vec::with_capacity(cuts.len());
    for pair in cuts.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let Some(text) = content.get(start..end) else {
            continue;
        };
        let mut style = base;
        if let Some((_, color)) = runs.iter().find(|(r, _)| r.start <= start && start < r.end) {
            style = style.fg(*color);
        }
        if highlights.iter().any(|r| r.start <= start && start < r.end) {
            style = styles::word_style(style, addition);
        }
        spans.push(Span::styled(text.replace('\t', &tab), style));
    }
    spans
}

/// Truncate or pad spans to exactly `width` columns
fn fit_spans(spans: Vec<Span<'static>>, width: usize, pad_style: Style) -> Vec<Span<'static>> {
    let mut out = Vec::with_capacity(spans.len() + 1);
    let mut used = 0;
    for span in spans {
        if used >= width {
            break;
        }
        let len = span.content.chars().count();
        if used + len <= width {
            used += len;
            out.push(span);
        } else {
            let take: String = span.content.chars().take(width - used).collect();
            used = width;
            out.push(Span::styled(take, span.style));
        }
    }
    if used < width {
        out.push(Span::styled(" ".repeat(width - used), pad_style));
    }
    out
}

/// Render hunk indicator overlay in top-right corner
fn render_hunk_indicator(f: &mut Frame, area: Rect, app: &App, session: &DiffSession) {
    let total_hunks = session.total_hunks();
    let Some((file, hunk)) = app.current_hunk() else {
        return;
    };
    if total_hunks == 0 {
        return;
    }
    let position = app
        .layout
        .hunk_rows()
        .position(|(_, f, h)| f == file && h == hunk)
        .map(|p| p + 1)
        .unwrap_or(0);
    let text = format!("Hunk {}/{}", position, total_hunks);
    let width = text.chars().count() as u16 + 3;
    let indicator_area = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y,
        width: width.min(area.width),
        height: 1,
    };
    let indicator = Paragraph::new(Line::from(Span::styled(text, styles::muted())));
    f.render_widget(indicator, indicator_area);
}

fn render_message(f: &mut Frame, area: Rect, title: &str, hint: &str) {
    let block = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG));
    let text = Paragraph::new(vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(title.to_string(), styles::muted())),
        Line::from(""),
        Line::from(Span::styled(hint.to_string(), styles::dim())),
    ])
    .block(block);
    f.render_widget(text, area);
}

/// Inline error state; the diff can be retried without leaving the view
fn render_error(f: &mut Frame, area: Rect, error: &str) {
    let block = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG));
    let mut lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled("  Could not load diff", styles::error_style())),
        Line::from(""),
    ];
    for line in error.lines() {
        lines.push(Line::from(Span::styled(format!("  {}", line), styles::muted())));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  r", styles::key_hint_style()),
        Span::styled(" retry  ", styles::dim()),
        Span::styled("q", styles::key_hint_style()),
        Span::styled(" quit", styles::dim()),
    ]));
    f.render_widget(Paragraph::new(lines).block(block), area);
}
