mod diff_view;
pub mod highlight;
mod status_bar;
mod styles;
pub mod viewport;

use crate::app::App;
use highlight::Highlighter;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::Frame;

fn split_screen(app: &App, area: Rect) -> [Rect; 3] {
    let top_height = status_bar::top_bar_height();
    let bottom_height = status_bar::bottom_bar_height(app, area.width);
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(top_height),
            Constraint::Min(1),
            Constraint::Length(bottom_height),
        ])
        .split(area);
    [outer[0], outer[1], outer[2]]
}

/// Rows the diff view gets for a terminal of `area`
pub fn diff_area_height(app: &App, area: Rect) -> usize {
    split_screen(app, area)[1].height as usize
}

/// Render the entire UI
pub fn draw(f: &mut Frame, app: &App, hl: &mut Highlighter) {
    let [top, content, bottom] = split_screen(app, f.area());

    status_bar::render_top_bar(f, top, app);
    diff_view::render(f, content, app, hl);
    status_bar::render_bottom_bar(f, bottom, app);

    if let Some(ref msg) = app.message {
        status_bar::render_watch_notification(f, f.area(), msg);
    }
}
