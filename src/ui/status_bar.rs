use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::host::{HostState, MainView};
use super::sidebar::SidebarModel;
use super::styles;
use crate::app::NoticeLevel;

/// What the bars show beyond host and sidebar state
#[derive(Debug, Clone, Default)]
pub struct StatusInfo {
    /// Loaded manifest, relative to the workspace when possible
    pub manifest: Option<String>,
    pub watching: bool,
}

/// Compute the display width of a list of spans
fn spans_width(spans: &[Span]) -> usize {
    spans.iter().map(|s| s.content.chars().count()).sum()
}

/// Render the top bar:
///   grv · base..head · path/to/review.json      3 groups · 2 flags  ● WATCHING
pub fn render_top_bar(f: &mut Frame, area: Rect, model: &SidebarModel, info: &StatusInfo) {
    let panel_bg = Style::default().bg(styles::PANEL);

    let mut left: Vec<Span> = vec![Span::styled(
        " grv",
        Style::default().fg(styles::CYAN).add_modifier(Modifier::BOLD),
    )];
    let mut right: Vec<Span> = Vec::new();

    match model.review() {
        Some(review) => {
            left.push(Span::styled(" · ", Style::default().fg(styles::BORDER)));
            left.push(Span::styled(
                format!("{}..{}", review.meta.base, review.meta.head),
                Style::default().fg(styles::GREEN),
            ));
            if let Some(path) = &info.manifest {
                left.push(Span::styled(" · ", Style::default().fg(styles::BORDER)));
                left.push(Span::styled(path.clone(), styles::dim_style()));
            }

            if let Some(validation) = model.validation() {
                if validation.is_clean() {
                    right.push(Span::styled("✓ in sync", Style::default().fg(styles::GREEN)));
                } else {
                    right.push(Span::styled(
                        format!(
                            "⚠ {} missing · {} phantom",
                            validation.missing_files.len(),
                            validation.phantom_files.len()
                        ),
                        Style::default().fg(styles::YELLOW),
                    ));
                }
                right.push(Span::raw("  "));
            }
            right.push(Span::styled(
                format!("{} groups · {} flags", review.groups.len(), review.flags.len()),
                Style::default().fg(styles::BLUE),
            ));
        }
        None => {
            left.push(Span::styled(" · no review loaded", styles::dim_style()));
        }
    }

    if info.watching {
        if !right.is_empty() {
            right.push(Span::raw("  "));
        }
        right.push(Span::styled(
            "\u{25cf} WATCHING",
            Style::default().fg(styles::GREEN).add_modifier(Modifier::BOLD),
        ));
    }
    if !right.is_empty() {
        right.push(Span::raw(" "));
    }

    let gap = (area.width as usize).saturating_sub(spans_width(&left) + spans_width(&right));
    left.push(Span::raw(" ".repeat(gap)));
    left.extend(right);

    f.render_widget(Paragraph::new(Line::from(left)).style(panel_bg), area);
}

/// A key-label hint pair, e.g. ("Enter", " open ")
struct Hint {
    key: &'static str,
    label: &'static str,
}

impl Hint {
    const fn new(key: &'static str, label: &'static str) -> Self {
        Self { key, label }
    }

    fn width(&self) -> usize {
        self.key.chars().count() + self.label.chars().count()
    }
}

fn build_hints(host: &HostState, model: &SidebarModel) -> Vec<Hint> {
    if host.picker.is_some() {
        return vec![
            Hint::new("j/k", " move "),
            Hint::new("Enter", " load "),
            Hint::new("Esc", " cancel "),
        ];
    }

    let mut hints = vec![
        Hint::new("j/k", " navigate "),
        Hint::new("Enter", " open "),
        Hint::new("␣", " fold "),
    ];
    if model.is_loaded() {
        hints.push(Hint::new("n/p", " next/prev group "));
        if model.review().is_some_and(|r| r.explanation.is_some()) {
            hints.push(Hint::new("e", " explain "));
        }
    }
    if host.tabs.len() > 1 || (host.main == MainView::Explanation && !host.tabs.is_empty()) {
        hints.push(Hint::new("Tab", " next view "));
    }
    if host.active().is_some() || host.explanation.is_some() {
        hints.push(Hint::new("PgUp/PgDn", " scroll "));
    }
    hints.push(Hint::new("o", " open review "));
    if model.is_loaded() {
        hints.push(Hint::new("u", " unload "));
    }
    hints.push(Hint::new("q", " quit "));
    hints
}

/// Pack hints into rows that fit within `width`
fn pack_hint_lines(hints: &[Hint], width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current_spans: Vec<Span<'static>> = Vec::new();
    let mut current_w: usize = 1; // leading space

    for hint in hints {
        let hw = hint.width();
        if current_w + hw > width && !current_spans.is_empty() {
            lines.push(Line::from(std::mem::take(&mut current_spans)));
            current_w = 1;
        }
        if current_spans.is_empty() {
            current_spans.push(Span::raw(" "));
        }
        current_spans.push(Span::styled(hint.key, styles::key_hint_style()));
        current_spans.push(Span::styled(hint.label, styles::dim_style()));
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
pub fn bottom_bar_height(host: &HostState, model: &SidebarModel, width: u16) -> u16 {
    let lines = pack_hint_lines(&build_hints(host, model), width as usize);
    u16::try_from(lines.len()).unwrap_or(1).max(1)
}

/// Render the bottom keybinding hints bar
pub fn render_bottom_bar(f: &mut Frame, area: Rect, host: &HostState, model: &SidebarModel) {
    let panel_bg = Style::default().bg(styles::PANEL);
    let lines = pack_hint_lines(&build_hints(host, model), area.width as usize);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(lines.iter().map(|_| Constraint::Length(1)).collect::<Vec<_>>())
        .split(area);

    for (line, row) in lines.into_iter().zip(rows.iter()) {
        f.render_widget(Paragraph::new(line).style(panel_bg), *row);
    }
}

/// Render one notice in the top-right corner, `row` lines below the first
pub fn render_notice(f: &mut Frame, area: Rect, row: u16, level: NoticeLevel, message: &str) {
    let symbol = match level {
        NoticeLevel::Info => " ● ",
        NoticeLevel::Warning => " ⚠ ",
        NoticeLevel::Error => " ✖ ",
    };
    let width = (message.chars().count() as u16 + 4).min(area.width);
    let notice_area = Rect {
        x: area.x + area.width.saturating_sub(width + 2),
        y: area.y + 2 + row,
        width,
        height: 1,
    };
    if notice_area.y >= area.bottom() {
        return;
    }

    let notice = Paragraph::new(Line::from(vec![
        Span::styled(symbol, Style::default().fg(styles::notice_color(level))),
        Span::styled(message, Style::default().fg(styles::TEXT)),
        Span::raw(" "),
    ]))
    .style(Style::default().bg(styles::PANEL).fg(styles::TEXT));

    f.render_widget(notice, notice_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_hint_lines_wraps_at_width() {
        let hints = vec![
            Hint::new("j/k", " navigate "),
            Hint::new("Enter", " open "),
            Hint::new("q", " quit "),
        ];
        assert_eq!(pack_hint_lines(&hints, 200).len(), 1);
        // " j/k navigate " is 14 wide; the next hint no longer fits
        assert_eq!(pack_hint_lines(&hints, 16).len(), 3);
    }

    #[test]
    fn picker_open_limits_hints() {
        let mut host = HostState::default();
        host.picker = Some(super::super::host::Picker {
            title: "Open Review File".into(),
            items: Vec::new(),
            selected: 0,
        });
        let hints = build_hints(&host, &SidebarModel::default());
        let keys: Vec<&str> = hints.iter().map(|h| h.key).collect();
        assert_eq!(keys, vec!["j/k", "Enter", "Esc"]);
    }

    #[test]
    fn unloaded_hints_omit_review_actions() {
        let hints = build_hints(&HostState::default(), &SidebarModel::default());
        let keys: Vec<&str> = hints.iter().map(|h| h.key).collect();
        assert!(!keys.contains(&"u"));
        assert!(!keys.contains(&"n/p"));
        assert!(keys.contains(&"o"));
    }
}
