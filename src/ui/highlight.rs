use lru::LruCache;
use ratatui::style::Color;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};

const THEME: &str = "base16-ocean.dark";
const CACHED_LINES: usize = 2_000;

/// Foreground colour for a byte range of a line
pub type ColorRun = (Range<usize>, Color);

/// Syntax highlighting state, loaded once and reused for all files.
///
/// Lines are highlighted independently (no multi-line state), which keeps
/// the cost per visible row constant no matter how far into a file it is.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Option<Theme>,
    lines: LruCache<(String, String), Arc<[ColorRun]>>,
}

impl Highlighter {
    pub fn new() -> Self {
        let mut themes = ThemeSet::load_defaults();
        Highlighter {
            syntax_set: two_face::syntax::extra_newlines(),
            theme: themes.themes.remove(THEME),
            lines: LruCache::new(NonZeroUsize::new(CACHED_LINES).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    fn syntax_for(&self, filename: &str) -> &SyntaxReference {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        self.syntax_set
            .find_syntax_by_extension(ext)
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
    }

    /// Colour runs covering `line`. Empty when there is nothing to colour
    /// (plain text, unknown theme, or a line over `max_len` bytes).
    pub fn highlight_line(&mut self, line: &str, filename: &str, max_len: usize) -> Arc<[ColorRun]> {
        if line.is_empty() || line.len() > max_len {
            return Arc::from(Vec::new());
        }
        let syntax_name = self.syntax_for(filename).name.clone();
        let key = (syntax_name, line.to_string());
        if let Some(runs) = self.lines.get(&key) {
            return runs.clone();
        }
        let runs: Arc<[ColorRun]> = Arc::from(self.compute(line, filename));
        self.lines.put(key, runs.clone());
        runs
    }

    fn compute(&self, line: &str, filename: &str) -> Vec<ColorRun> {
        let Some(theme) = self.theme.as_ref() else {
            return Vec::new();
        };
        let syntax = self.syntax_for(filename);
        let mut highlighter = HighlightLines::new(syntax, theme);

        // syntect needs a trailing newline
        let input = format!("{line}\n");
        let Ok(ranges) = highlighter.highlight_line(&input, &self.syntax_set) else {
            return Vec::new();
        };

        let mut runs = Vec::with_capacity(ranges.len());
        let mut at = 0;
        for (style, text) in ranges {
            let end = (at + text.len()).min(line.len());
            if end > at {
                let fg = Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b);
                runs.push((at..end, fg));
            }
            at += text.len();
        }
        runs
    }
}
