use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

use super::host::HostState;
use super::styles;

/// Render the review explanation as lightly styled markdown
pub fn render(f: &mut Frame, area: Rect, state: &HostState) {
    let content = state.explanation.as_deref().unwrap_or("");
    let width = area.width.saturating_sub(4) as usize;

    let block = Block::default()
        .title(Span::styled(
            " Review Explanation ",
            Style::default().fg(styles::CYAN).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::NONE)
        .style(Style::default().bg(styles::BG))
        .padding(Padding::new(2, 2, 1, 0));

    let scroll = u16::try_from(state.explanation_scroll).unwrap_or(u16::MAX);
    let paragraph = Paragraph::new(markdown_lines(content, width))
        .block(block)
        .scroll((scroll, 0));
    f.render_widget(paragraph, area);
}

fn markdown_lines(content: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for raw in content.lines() {
        if raw.trim_start().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            lines.push(Line::from(Span::styled(
                format!("  {}", raw),
                Style::default().fg(styles::MUTED).bg(styles::PANEL),
            )));
            continue;
        }

        let trimmed = raw.trim_start();
        if let Some(heading) = heading_text(trimmed) {
            lines.push(Line::from(Span::styled(
                heading.to_string(),
                Style::default().fg(styles::BRIGHT).add_modifier(Modifier::BOLD),
            )));
            continue;
        }

        let (bullet, body) = match trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            Some(rest) => ("• ", rest),
            None => ("", raw),
        };
        let indent = " ".repeat(bullet.chars().count());
        for (i, piece) in word_wrap(body, width.saturating_sub(indent.len()))
            .into_iter()
            .enumerate()
        {
            let lead = if i == 0 { bullet } else { indent.as_str() };
            lines.push(Line::from(vec![
                Span::styled(lead.to_string(), Style::default().fg(styles::BLUE)),
                Span::styled(piece, styles::default_style()),
            ]));
        }
    }
    lines
}

/// `"## Title"` → `"Title"`
fn heading_text(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches('#');
    let level = line.len() - rest.len();
    if (1..=6).contains(&level) && rest.starts_with(' ') {
        Some(rest.trim())
    } else {
        None
    }
}

/// Word-wrap on whitespace, measuring in chars rather than bytes
fn word_wrap(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 || text.chars().count() <= max_width {
        return vec![text.to_string()];
    }
    let mut result = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_width {
            current.push(' ');
            current.push_str(word);
        } else {
            result.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() || result.is_empty() {
        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn word_wrap_counts_chars() {
        assert_eq!(word_wrap("ä ö ü", 3), vec!["ä ö", "ü"]);
        assert_eq!(word_wrap("short", 40), vec!["short"]);
        assert_eq!(word_wrap("", 10), vec![""]);
    }

    #[test]
    fn headings_lose_their_markers() {
        assert_eq!(heading_text("## Why"), Some("Why"));
        assert_eq!(heading_text("#hashtag"), None);
        assert_eq!(heading_text("plain"), None);
    }

    #[test]
    fn markdown_lines_styles_bullets_and_skips_fences() {
        let lines = markdown_lines("# Title\n- one\n```\ncode\n```\ntext", 40);
        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(rendered, vec!["Title", "• one", "  code", "text"]);
    }

    #[test]
    fn long_bullets_wrap_under_their_marker() {
        let lines = markdown_lines("- alpha beta gamma", 10);
        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(rendered, vec!["• alpha", "  beta", "  gamma"]);
    }
}
