use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

use super::host::{DiffTab, HostState};
use super::styles;
use crate::git::{FileStatus, LineType};

/// Render the diff area: a tab strip over the active diff
pub fn render(f: &mut Frame, area: Rect, state: &HostState) {
    let Some(tab) = state.active() else {
        render_empty(f, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    render_tab_strip(f, chunks[0], state);
    render_diff(f, chunks[1], tab);
}

fn render_tab_strip(f: &mut Frame, area: Rect, state: &HostState) {
    let mut spans: Vec<Span> = Vec::new();
    for (i, tab) in state.tabs.iter().enumerate() {
        let label = format!(" {} ", tab.path.rsplit('/').next().unwrap_or(&tab.path));
        if i == state.active_tab {
            spans.push(Span::styled(
                label,
                Style::default()
                    .fg(styles::BRIGHT)
                    .bg(styles::BLUE)
                    .add_modifier(ratatui::style::Modifier::BOLD),
            ));
        } else {
            spans.push(Span::styled(label, styles::dim_style()));
        }
        if i + 1 < state.tabs.len() {
            spans.push(Span::styled("│", Style::default().fg(styles::BORDER)));
        }
    }
    let strip = Paragraph::new(Line::from(spans)).style(Style::default().bg(styles::PANEL));
    f.render_widget(strip, area);
}

/// Lines for one diff tab. Row layout must match `DiffTab::row_of`.
fn diff_lines(tab: &DiffTab) -> Vec<Line<'_>> {
    let file = &tab.file;
    let mut lines: Vec<Line> = Vec::new();

    let status_style = match &file.status {
        FileStatus::Added => styles::status_added(),
        FileStatus::Deleted => styles::status_deleted(),
        _ => styles::status_modified(),
    };
    let mut header = vec![
        Span::styled(format!("  {} ", file.status.symbol()), status_style),
        Span::styled(file.path.as_str(), Style::default().fg(styles::BRIGHT)),
        Span::styled(format!("  +{} -{}", file.adds, file.dels), styles::dim_style()),
    ];
    if let FileStatus::Renamed(old) = &file.status {
        header.push(Span::styled(format!("  (from {})", old), styles::dim_style()));
    }
    lines.push(Line::from(header));
    lines.push(Line::from(""));

    for hunk in &file.hunks {
        lines.push(
            Line::from(Span::styled(hunk.header.as_str(), styles::hunk_header_style()))
                .style(styles::hunk_header_style()),
        );

        for diff_line in &hunk.lines {
            let old_num = diff_line
                .old_num
                .map(|n| format!("{:>4}", n))
                .unwrap_or_else(|| "    ".to_string());
            let new_num = diff_line
                .new_num
                .map(|n| format!("{:>4}", n))
                .unwrap_or_else(|| "    ".to_string());

            let revealed = tab.revealed.is_some_and(|target| {
                diff_line.new_num == Some(target as usize)
            });
            let base_style = if revealed {
                styles::revealed_line_style()
            } else {
                match diff_line.line_type {
                    LineType::Add => styles::add_style(),
                    LineType::Delete => styles::del_style(),
                    LineType::Context => styles::default_style(),
                }
            };
            let gutter_style = match diff_line.line_type {
                LineType::Add => Style::default().fg(styles::DIM).bg(styles::ADD_BG),
                LineType::Delete => Style::default().fg(styles::DIM).bg(styles::DEL_BG),
                LineType::Context => styles::dim_style(),
            };

            lines.push(
                Line::from(vec![
                    Span::styled(format!("{} {} │", old_num, new_num), gutter_style),
                    Span::styled(diff_line.line_type.prefix(), base_style),
                    Span::styled(diff_line.content.as_str(), base_style),
                ])
                .style(base_style),
            );
        }

        lines.push(Line::from(""));
    }
    lines
}

fn render_diff(f: &mut Frame, area: Rect, tab: &DiffTab) {
    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", tab.title),
            Style::default().fg(styles::BRIGHT),
        ))
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG))
        .padding(Padding::new(0, 1, 0, 0));

    let scroll = u16::try_from(tab.scroll).unwrap_or(u16::MAX);
    let paragraph = Paragraph::new(diff_lines(tab))
        .block(block)
        .scroll((scroll, 0));
    f.render_widget(paragraph, area);
}

/// Render an empty state when no diff is open
fn render_empty(f: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG));

    let text = Paragraph::new(vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            "  No diff open",
            Style::default().fg(styles::MUTED),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "  Pick a group or flag and press Enter",
            styles::dim_style(),
        )),
    ])
    .block(block);

    f.render_widget(text, area);
}
