use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Padding},
    Frame,
};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::time::SystemTime;

use super::styles;
use crate::app::{build_tree, Inbound, Outbound, Selection, Sidebar, TreeNode};
use crate::review::{Manifest, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Validation,
    Groups,
    Flags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    Header,
    Section(Section),
    Phantom(String),
    MissingDir(String),
    Missing(String),
    Group(usize),
    GroupDir { group: usize, key: String },
    GroupFile { group: usize, path: String },
    Flag(usize),
    /// Plain text: summaries, locations, placeholders
    Note,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SidebarRow {
    pub depth: usize,
    pub kind: RowKind,
    pub label: String,
    pub collapsed: bool,
}

impl SidebarRow {
    fn new(depth: usize, kind: RowKind, label: impl Into<String>) -> Self {
        Self {
            depth,
            kind,
            label: label.into(),
            collapsed: false,
        }
    }

    fn note(depth: usize, label: impl Into<String>) -> Self {
        Self::new(depth, RowKind::Note, label)
    }

    fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }
}

struct ReviewView {
    review: Manifest,
    mtime: Option<SystemTime>,
    validation: ValidationResult,
}

/// Client-side sidebar state: what the controller last pushed, plus local
/// UI state (cursor, expanded groups, collapsed sections and directories).
/// A reset drops all of it; updates keep the local part.
#[derive(Default)]
pub struct SidebarModel {
    view: Option<ReviewView>,
    selection: Selection,
    cursor: usize,
    collapsed_sections: HashSet<Section>,
    expanded_groups: HashSet<usize>,
    collapsed_dirs: HashSet<String>,
}

impl SidebarModel {
    pub fn apply(&mut self, message: &Outbound) {
        match message {
            Outbound::Update {
                review,
                mtime,
                validation,
                selection,
            } => {
                self.view = Some(ReviewView {
                    review: review.clone(),
                    mtime: *mtime,
                    validation: validation.clone(),
                });
                self.selection = *selection;
                self.clamp_cursor();
            }
            Outbound::SelectGroup { index } => {
                self.selection = Selection::Group(*index);
                self.focus(&RowKind::Group(*index));
            }
            Outbound::SelectFlag { index } => {
                self.selection = Selection::Flag(*index);
                self.focus(&RowKind::Flag(*index));
            }
            Outbound::ClearSelection => self.selection = Selection::None,
            Outbound::Reset => *self = Self::default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.view.is_some()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn review(&self) -> Option<&Manifest> {
        self.view.as_ref().map(|v| &v.review)
    }

    pub fn validation(&self) -> Option<&ValidationResult> {
        self.view.as_ref().map(|v| &v.validation)
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.view.as_ref().and_then(|v| v.mtime)
    }

    pub fn is_phantom(&self, path: &str) -> bool {
        self.view
            .as_ref()
            .is_some_and(|v| v.validation.is_phantom(path))
    }

    pub fn move_down(&mut self) {
        self.cursor += 1;
        self.clamp_cursor();
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn clamp_cursor(&mut self) {
        let len = self.rows().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    fn focus(&mut self, kind: &RowKind) {
        if let Some(pos) = self.rows().iter().position(|r| &r.kind == kind) {
            self.cursor = pos;
        }
    }

    fn toggle_dir(&mut self, key: String) {
        if !self.collapsed_dirs.remove(&key) {
            self.collapsed_dirs.insert(key);
        }
    }

    fn toggle_section(&mut self, section: Section) {
        if !self.collapsed_sections.remove(&section) {
            self.collapsed_sections.insert(section);
        }
    }

    /// Expand or collapse whatever is under the cursor
    pub fn toggle(&mut self) {
        let Some(row) = self.rows().into_iter().nth(self.cursor) else {
            return;
        };
        match row.kind {
            RowKind::Section(section) => self.toggle_section(section),
            RowKind::Group(index) => {
                if !self.expanded_groups.remove(&index) {
                    self.expanded_groups.insert(index);
                }
            }
            RowKind::GroupDir { group, key } => self.toggle_dir(format!("{}:{}", group, key)),
            RowKind::MissingDir(key) => self.toggle_dir(format!("missing:{}", key)),
            _ => {}
        }
        self.clamp_cursor();
    }

    /// The intent behind the row under the cursor. Purely local rows
    /// (sections, directories) toggle instead and return None.
    pub fn activate(&mut self) -> Option<Inbound> {
        let row = self.rows().into_iter().nth(self.cursor)?;
        let review = &self.view.as_ref()?.review;
        match row.kind {
            RowKind::Header => review.explanation.as_ref().map(|_| Inbound::OpenExplanation),
            RowKind::Group(index) => {
                self.expanded_groups.insert(index);
                Some(Inbound::OpenGroup { index })
            }
            RowKind::GroupFile { path, .. } => Some(Inbound::OpenFile { path }),
            RowKind::Flag(index) => {
                let flag = review.flags.get(index)?;
                Some(Inbound::OpenFlag {
                    index: Some(index),
                    file: flag.file.clone(),
                    line: flag.line,
                    clip_text: flag.clip_text(),
                })
            }
            RowKind::Section(_) | RowKind::GroupDir { .. } | RowKind::MissingDir(_) => {
                self.toggle();
                None
            }
            RowKind::Phantom(_) | RowKind::Missing(_) | RowKind::Note => None,
        }
    }

    /// Visible rows, top to bottom
    pub fn rows(&self) -> Vec<SidebarRow> {
        let Some(view) = self.view.as_ref() else {
            return vec![
                SidebarRow::note(0, "No review loaded"),
                SidebarRow::note(0, "o  open a review file"),
            ];
        };
        let review = &view.review;
        let validation = &view.validation;
        let mut rows = vec![SidebarRow::new(
            0,
            RowKind::Header,
            format!("{}..{}", review.meta.base, review.meta.head),
        )];

        if !validation.is_clean() {
            let collapsed = self.collapsed_sections.contains(&Section::Validation);
            rows.push(
                SidebarRow::new(
                    0,
                    RowKind::Section(Section::Validation),
                    format!(
                        "{} missing, {} phantom",
                        validation.missing_files.len(),
                        validation.phantom_files.len()
                    ),
                )
                .collapsed(collapsed),
            );
            if !collapsed {
                for path in &validation.phantom_files {
                    rows.push(SidebarRow::new(1, RowKind::Phantom(path.clone()), path.clone()));
                }
                if !validation.missing_files.is_empty() {
                    let tree = build_tree(&validation.missing_files);
                    if !tree.prefix.is_empty() {
                        rows.push(SidebarRow::note(1, tree.prefix.clone()));
                    }
                    for row in tree.rows(|key| self.collapsed_dirs.contains(&format!("missing:{}", key))) {
                        rows.push(match row.node {
                            TreeNode::Dir { label, key, .. } => {
                                SidebarRow::new(1 + row.depth, RowKind::MissingDir(key.clone()), label.clone())
                                    .collapsed(row.collapsed)
                            }
                            TreeNode::File { name, path } => {
                                SidebarRow::new(1 + row.depth, RowKind::Missing(path.clone()), name.clone())
                            }
                        });
                    }
                }
            }
        }

        let collapsed = self.collapsed_sections.contains(&Section::Groups);
        rows.push(
            SidebarRow::new(
                0,
                RowKind::Section(Section::Groups),
                format!("GROUPS ({})", review.groups.len()),
            )
            .collapsed(collapsed),
        );
        if !collapsed {
            if review.groups.is_empty() {
                rows.push(SidebarRow::note(1, "No groups"));
            }
            for (index, group) in review.groups.iter().enumerate() {
                let expanded = self.expanded_groups.contains(&index);
                rows.push(
                    SidebarRow::new(
                        1,
                        RowKind::Group(index),
                        format!("{}. {} ({})", index + 1, group.title, group.files.len()),
                    )
                    .collapsed(!expanded),
                );
                if !expanded {
                    continue;
                }
                if let Some(summary) = &group.summary {
                    rows.push(SidebarRow::note(2, summary.clone()));
                }
                let tree = build_tree(&group.files);
                if !tree.prefix.is_empty() {
                    rows.push(SidebarRow::note(2, tree.prefix.clone()));
                }
                for row in tree.rows(|key| self.collapsed_dirs.contains(&format!("{}:{}", index, key))) {
                    rows.push(match row.node {
                        TreeNode::Dir { label, key, .. } => SidebarRow::new(
                            2 + row.depth,
                            RowKind::GroupDir {
                                group: index,
                                key: key.clone(),
                            },
                            label.clone(),
                        )
                        .collapsed(row.collapsed),
                        TreeNode::File { name, path } => SidebarRow::new(
                            2 + row.depth,
                            RowKind::GroupFile {
                                group: index,
                                path: path.clone(),
                            },
                            name.clone(),
                        ),
                    });
                }
            }
        }

        if !review.flags.is_empty() {
            let collapsed = self.collapsed_sections.contains(&Section::Flags);
            rows.push(
                SidebarRow::new(
                    0,
                    RowKind::Section(Section::Flags),
                    format!("FLAGS ({})", review.flags.len()),
                )
                .collapsed(collapsed),
            );
            if !collapsed {
                for (index, flag) in review.flags.iter().enumerate() {
                    rows.push(SidebarRow::new(1, RowKind::Flag(index), flag.title.clone()));
                    let detail = match &flag.summary {
                        Some(summary) => format!("{}  {}", flag.location(), summary),
                        None => flag.location(),
                    };
                    rows.push(SidebarRow::note(2, detail));
                }
            }
        }

        rows
    }
}

/// The sidebar surface as the controller sees it
#[derive(Default)]
pub struct TerminalSidebar {
    model: RefCell<SidebarModel>,
}

impl TerminalSidebar {
    pub fn model(&self) -> Ref<'_, SidebarModel> {
        self.model.borrow()
    }

    pub fn model_mut(&self) -> RefMut<'_, SidebarModel> {
        self.model.borrow_mut()
    }
}

impl Sidebar for TerminalSidebar {
    fn post(&self, message: &Outbound) {
        self.model.borrow_mut().apply(message);
    }
}

/// Format a SystemTime as a relative time string (e.g. "2m ago", "1h ago")
fn format_relative_time(mtime: SystemTime) -> String {
    let elapsed = SystemTime::now().duration_since(mtime).unwrap_or_default();
    let secs = elapsed.as_secs();
    if secs < 60 {
        return format!("{}s ago", secs);
    }
    if secs < 3600 {
        return format!("{}m ago", secs / 60);
    }
    if secs < 86400 {
        return format!("{}h ago", secs / 3600);
    }
    format!("{}d ago", secs / 86400)
}

fn row_spans<'a>(model: &SidebarModel, row: &'a SidebarRow) -> Vec<Span<'a>> {
    let indent = Span::raw("  ".repeat(row.depth));
    let fold = if row.collapsed { "▸ " } else { "▾ " };
    let Some(review) = model.review() else {
        return vec![indent, Span::styled(row.label.as_str(), styles::dim_style())];
    };

    let mut spans = vec![indent];
    match &row.kind {
        RowKind::Header => {
            spans.push(Span::styled(
                row.label.as_str(),
                Style::default().fg(styles::CYAN),
            ));
            if let Some(mtime) = model.mtime() {
                spans.push(Span::styled(
                    format!(" · {}", format_relative_time(mtime)),
                    styles::dim_style(),
                ));
            }
            if review.explanation.is_some() {
                spans.push(Span::styled(" · e explain", styles::dim_style()));
            }
        }
        RowKind::Section(Section::Validation) => {
            spans.push(Span::styled(fold, styles::dim_style()));
            spans.push(Span::styled(
                format!("⚠ {}", row.label),
                styles::missing_style(),
            ));
        }
        RowKind::Section(_) => {
            spans.push(Span::styled(fold, styles::dim_style()));
            spans.push(Span::styled(row.label.as_str(), styles::section_style()));
        }
        RowKind::Phantom(_) => {
            spans.push(Span::styled(row.label.as_str(), styles::phantom_style()));
        }
        RowKind::Missing(_) => {
            spans.push(Span::styled(row.label.as_str(), styles::missing_style()));
        }
        RowKind::MissingDir(_) | RowKind::GroupDir { .. } => {
            spans.push(Span::styled(fold, styles::dim_style()));
            spans.push(Span::styled(
                format!("{}/", row.label),
                Style::default().fg(styles::MUTED),
            ));
        }
        RowKind::Group(index) => {
            let style = if model.selection() == Selection::Group(*index) {
                styles::selected_style()
            } else {
                Style::default().fg(styles::TEXT)
            };
            spans.push(Span::styled(fold, styles::dim_style()));
            spans.push(Span::styled(row.label.as_str(), style));
        }
        RowKind::GroupFile { path, .. } => {
            let style = if model.is_phantom(path) {
                styles::phantom_style()
            } else {
                Style::default().fg(styles::TEXT)
            };
            spans.push(Span::styled(row.label.as_str(), style));
        }
        RowKind::Flag(index) => {
            if let Some(flag) = review.flags.get(*index) {
                spans.push(Span::styled(
                    format!("{} ", flag.severity.symbol()),
                    styles::severity_style(flag.severity),
                ));
            }
            let style = if model.selection() == Selection::Flag(*index) {
                styles::selected_style()
            } else {
                Style::default().fg(styles::TEXT)
            };
            spans.push(Span::styled(row.label.as_str(), style));
        }
        RowKind::Note => {
            spans.push(Span::styled(row.label.as_str(), styles::dim_style()));
        }
    }
    spans
}

/// Render the sidebar panel (left side)
pub fn render(f: &mut Frame, area: Rect, sidebar: &TerminalSidebar) {
    let model = sidebar.model();
    let rows = model.rows();

    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| ListItem::new(Line::from(row_spans(&model, row))))
        .collect();

    let block = Block::default()
        .title(Span::styled(" REVIEW ", styles::section_style()))
        .borders(Borders::RIGHT)
        .border_style(Style::default().fg(styles::BORDER))
        .padding(Padding::horizontal(1))
        .style(Style::default().bg(styles::BG));

    let list = List::new(items)
        .block(block)
        .highlight_style(styles::cursor_style());
    let mut state = ListState::default().with_selected(Some(model.cursor()));
    f.render_stateful_widget(list, area, &mut state);
}
