use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState},
    Frame,
};

use super::host::Picker;
use super::styles;

/// Render the file picker on top of the main UI
pub fn render_picker(f: &mut Frame, area: Rect, picker: &Picker) {
    let popup_height = (picker.items.len() as u16 + 2)
        .min(area.height.saturating_sub(6))
        .max(3);
    let popup_width = 80u16.min(area.width.saturating_sub(6)).max(20);
    let popup = centered_rect(popup_width, popup_height, area);

    // Clear backdrop
    f.render_widget(Clear, popup);

    let label_width = picker
        .items
        .iter()
        .map(|i| i.label.chars().count())
        .max()
        .unwrap_or(0)
        .min(32);

    let items: Vec<ListItem> = picker
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let is_sel = idx == picker.selected;
            let marker = if is_sel { "▶ " } else { "  " };

            let line = Line::from(vec![
                Span::styled(marker, Style::default().fg(styles::CYAN)),
                Span::styled(
                    format!("{:<width$}  ", item.label, width = label_width),
                    if is_sel {
                        Style::default().fg(styles::BRIGHT)
                    } else {
                        Style::default().fg(styles::TEXT)
                    },
                ),
                Span::styled(item.description.as_str(), styles::dim_style()),
            ]);

            let style = if is_sel {
                styles::selected_style()
            } else {
                Style::default().bg(styles::PANEL)
            };
            ListItem::new(line).style(style)
        })
        .collect();

    let block = Block::default()
        .title(Span::styled(
            format!(" {} (Enter=load, Esc=close) ", picker.title),
            Style::default().fg(styles::CYAN),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(styles::CYAN))
        .style(Style::default().bg(styles::PANEL));

    let mut state = ListState::default().with_selected(Some(picker.selected));
    f.render_stateful_widget(List::new(items).block(block), popup, &mut state);
}

/// A `width` x `height` rectangle centered in `r`, clipped to it
fn centered_rect(width: u16, height: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(r.height.saturating_sub(height) / 2),
            Constraint::Length(height.min(r.height)),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(r.width.saturating_sub(width) / 2),
            Constraint::Length(width.min(r.width)),
            Constraint::Min(0),
        ])
        .split(vertical[1])[1]
}
