mod diff_view;
mod explanation;
mod host;
mod overlay;
mod sidebar;
mod status_bar;
mod styles;

pub use host::TerminalHost;
pub use sidebar::TerminalSidebar;
pub use status_bar::StatusInfo;

use host::MainView;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::Frame;

const SIDEBAR_WIDTH: u16 = 36;

/// Render the entire UI
pub fn draw(f: &mut Frame, host: &TerminalHost, sidebar: &TerminalSidebar, info: &StatusInfo) {
    let state = host.state();
    let model = sidebar.model();

    let bottom_height = status_bar::bottom_bar_height(&state, &model, f.area().width);
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),             // top bar
            Constraint::Min(1),                // main content
            Constraint::Length(bottom_height), // bottom bar (dynamic rows)
        ])
        .split(f.area());

    status_bar::render_top_bar(f, outer[0], &model, info);

    let main_area = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(outer[1]);

    sidebar::render(f, main_area[0], sidebar);

    match state.main {
        MainView::Explanation if state.explanation.is_some() => {
            explanation::render(f, main_area[1], &state);
        }
        _ => diff_view::render(f, main_area[1], &state),
    }

    status_bar::render_bottom_bar(f, outer[2], &state, &model);

    for (row, notice) in state.notices.iter().enumerate() {
        status_bar::render_notice(f, f.area(), row as u16, notice.level, &notice.message);
    }

    if let Some(picker) = &state.picker {
        overlay::render_picker(f, f.area(), picker);
    }
}
