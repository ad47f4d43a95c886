use ratatui::style::{Color, Modifier, Style};

// Chrome
pub const BG: Color = Color::Rgb(12, 12, 12);
pub const PANEL: Color = Color::Rgb(26, 26, 26);
pub const BORDER: Color = Color::Rgb(42, 42, 42);
pub const TEXT: Color = Color::Rgb(200, 200, 200);
pub const DIM: Color = Color::Rgb(102, 102, 102);
pub const MUTED: Color = Color::Rgb(136, 136, 136);
pub const BRIGHT: Color = Color::Rgb(232, 232, 232);

// Accents
pub const BLUE: Color = Color::Rgb(96, 165, 250);
pub const CYAN: Color = Color::Rgb(34, 211, 238);
pub const GREEN: Color = Color::Rgb(74, 222, 128);
pub const YELLOW: Color = Color::Rgb(250, 204, 21);
pub const RED: Color = Color::Rgb(248, 113, 113);
pub const PURPLE: Color = Color::Rgb(167, 139, 250);
/// Large file mode
pub const ORANGE: Color = Color::Rgb(251, 146, 60);

// Diff body
const ADD_BG: Color = Color::Rgb(16, 62, 40);
const ADD_FG: Color = Color::Rgb(120, 240, 160);
const ADD_WORD_BG: Color = Color::Rgb(30, 110, 66);
const DEL_BG: Color = Color::Rgb(68, 16, 24);
const DEL_FG: Color = Color::Rgb(255, 140, 140);
const DEL_WORD_BG: Color = Color::Rgb(120, 30, 42);
pub const HUNK_BG: Color = Color::Rgb(28, 28, 60);
const FILE_BG: Color = Color::Rgb(22, 22, 30);
const MATCH_BG: Color = Color::Rgb(90, 74, 10);

pub fn fg(color: Color) -> Style {
    Style::default().fg(color)
}

pub fn dim() -> Style {
    fg(DIM)
}

pub fn muted() -> Style {
    fg(MUTED)
}

pub fn bold(color: Color) -> Style {
    fg(color).add_modifier(Modifier::BOLD)
}

pub fn default_style() -> Style {
    Style::default().fg(TEXT).bg(BG)
}

pub fn add_style() -> Style {
    Style::default().fg(ADD_FG).bg(ADD_BG)
}

pub fn del_style() -> Style {
    Style::default().fg(DEL_FG).bg(DEL_BG)
}

/// Changed words inside an added or deleted line
pub fn word_style(base: Style, addition: bool) -> Style {
    base.bg(if addition { ADD_WORD_BG } else { DEL_WORD_BG })
        .add_modifier(Modifier::BOLD)
}

pub fn hunk_header_style() -> Style {
    Style::default().fg(PURPLE).bg(HUNK_BG)
}

pub fn file_header_style() -> Style {
    Style::default().fg(BRIGHT).bg(FILE_BG).add_modifier(Modifier::BOLD)
}

pub fn match_style() -> Style {
    Style::default().fg(BRIGHT).bg(MATCH_BG)
}

pub fn error_style() -> Style {
    fg(RED)
}

pub fn key_hint_style() -> Style {
    bold(MUTED)
}

/// Inverted label, e.g. the active diff side or the LFM badge
pub fn badge_style(color: Color) -> Style {
    Style::default().fg(BG).bg(color).add_modifier(Modifier::BOLD)
}

pub fn panel_style() -> Style {
    Style::default().bg(PANEL)
}
