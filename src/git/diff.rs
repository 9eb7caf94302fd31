/// A single line in a diff hunk
#[derive(Debug, Clone, PartialEq)]
pub struct DiffLine {
    pub line_type: LineType,
    pub content: String,
    pub old_num: Option<usize>,
    pub new_num: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineType {
    Context,
    Add,
    Delete,
}

impl LineType {
    pub fn prefix(&self) -> &'static str {
        match self {
            LineType::Add => "+",
            LineType::Delete => "-",
            LineType::Context => " ",
        }
    }
}

/// How the file changed between the two sides
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed(String),
}

impl FileStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            FileStatus::Added => "+",
            FileStatus::Modified => "~",
            FileStatus::Deleted => "-",
            FileStatus::Renamed(_) => "R",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffHunk {
    pub header: String,
    pub old_start: usize,
    pub new_start: usize,
    pub lines: Vec<DiffLine>,
}

/// One file's worth of a unified diff
#[derive(Debug, Clone)]
pub struct DiffFile {
    pub path: String,
    pub status: FileStatus,
    pub hunks: Vec<DiffHunk>,
    pub adds: usize,
    pub dels: usize,
}

impl DiffFile {
    /// A file with no changes, shown as one hunk of context
    pub fn unchanged(path: &str, content: &str) -> Self {
        let lines: Vec<DiffLine> = content
            .lines()
            .enumerate()
            .map(|(i, text)| DiffLine {
                line_type: LineType::Context,
                content: text.to_string(),
                old_num: Some(i + 1),
                new_num: Some(i + 1),
            })
            .collect();
        let hunks = if lines.is_empty() {
            Vec::new()
        } else {
            vec![DiffHunk {
                header: format!("@@ -1,{0} +1,{0} @@ unchanged", lines.len()),
                old_start: 1,
                new_start: 1,
                lines,
            }]
        };
        Self {
            path: path.to_string(),
            status: FileStatus::Modified,
            hunks,
            adds: 0,
            dels: 0,
        }
    }

    /// `(hunk, line)` indices of the first line at or past new-side `line`.
    /// Deleted lines are skipped since they have no new-side number.
    pub fn locate_new_line(&self, line: usize) -> Option<(usize, usize)> {
        self.hunks.iter().enumerate().find_map(|(hi, hunk)| {
            hunk.lines
                .iter()
                .position(|l| l.new_num.is_some_and(|n| n >= line))
                .map(|li| (hi, li))
        })
    }
}

/// Accumulates files and hunks while walking diff output line by line
#[derive(Default)]
struct DiffBuilder {
    files: Vec<DiffFile>,
    file: Option<DiffFile>,
    hunk: Option<DiffHunk>,
    old_line: usize,
    new_line: usize,
}

impl DiffBuilder {
    fn close_hunk(&mut self) {
        if let (Some(hunk), Some(file)) = (self.hunk.take(), self.file.as_mut()) {
            file.hunks.push(hunk);
        }
    }

    fn close_file(&mut self) {
        self.close_hunk();
        if let Some(file) = self.file.take() {
            self.files.push(file);
        }
    }

    fn start_file(&mut self, header: &str) {
        self.close_file();
        let path = header.rsplit(" b/").next().unwrap_or("").to_string();
        self.file = Some(DiffFile {
            path,
            status: FileStatus::Modified,
            hunks: Vec::new(),
            adds: 0,
            dels: 0,
        });
    }

    /// Returns true when `line` was a per-file header line
    fn file_header(&mut self, line: &str) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        // Header lines only precede the first hunk of a file
        if self.hunk.is_some() {
            return false;
        }
        if line.starts_with("new file") {
            file.status = FileStatus::Added;
        } else if line.starts_with("deleted file") {
            file.status = FileStatus::Deleted;
        } else if let Some(old) = line.strip_prefix("rename from ") {
            file.status = FileStatus::Renamed(old.to_string());
        } else if !(line.starts_with("index ")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
            || line.starts_with("similarity index")
            || line.starts_with("rename to")
            || line.starts_with("old mode")
            || line.starts_with("new mode"))
        {
            return false;
        }
        true
    }

    fn start_hunk(&mut self, line: &str) {
        self.close_hunk();
        if let Some(hunk) = parse_hunk_header(line) {
            self.old_line = hunk.old_start;
            self.new_line = hunk.new_start;
            self.hunk = Some(hunk);
        }
    }

    fn body_line(&mut self, line: &str) {
        let Some(hunk) = self.hunk.as_mut() else {
            return;
        };
        let (line_type, content) = match line.chars().next() {
            Some('+') => (LineType::Add, &line[1..]),
            Some('-') => (LineType::Delete, &line[1..]),
            Some(' ') => (LineType::Context, &line[1..]),
            None => (LineType::Context, ""),
            // "\ No newline at end of file"
            Some(_) => return,
        };

        let (old_num, new_num) = match line_type {
            LineType::Add => (None, Some(self.new_line)),
            LineType::Delete => (Some(self.old_line), None),
            LineType::Context => (Some(self.old_line), Some(self.new_line)),
        };
        if old_num.is_some() {
            self.old_line += 1;
        }
        if new_num.is_some() {
            self.new_line += 1;
        }
        if let Some(file) = self.file.as_mut() {
            match line_type {
                LineType::Add => file.adds += 1,
                LineType::Delete => file.dels += 1,
                LineType::Context => {}
            }
        }
        hunk.lines.push(DiffLine {
            line_type,
            content: content.to_string(),
            old_num,
            new_num,
        });
    }
}

/// Parse unified diff output into structured data
pub fn parse_diff(raw: &str) -> Vec<DiffFile> {
    let mut builder = DiffBuilder::default();
    for line in raw.lines() {
        if line.starts_with("diff --git") {
            builder.start_file(line);
        } else if builder.file_header(line) {
            continue;
        } else if line.starts_with("@@") {
            builder.start_hunk(line);
        } else {
            builder.body_line(line);
        }
    }
    builder.close_file();
    builder.files
}

/// Parse a hunk header like "@@ -10,4 +10,15 @@ fn foo()"
fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    let rest = line.strip_prefix("@@ ")?;
    let end = rest.find(" @@")?;
    let mut ranges = rest[..end].split_whitespace();
    let old_start = range_start(ranges.next()?.strip_prefix('-')?)?;
    let new_start = range_start(ranges.next()?.strip_prefix('+')?)?;

    Some(DiffHunk {
        header: line.to_string(),
        old_start,
        new_start,
        lines: Vec::new(),
    })
}

/// Start of "start,count" or "start"
fn range_start(s: &str) -> Option<usize> {
    s.split(',').next()?.parse().ok()
}
