use std::ops::Range;

/// What a single hunk body line does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Addition,
    Deletion,
}

impl LineKind {
    pub fn prefix(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Addition => '+',
            LineKind::Deletion => '-',
        }
    }
}

/// A single line in a materialized hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: LineKind,
    pub content: String,
    pub old_num: Option<u32>,
    pub new_num: Option<u32>,
    /// Intraline changed byte ranges into `content` (word diff)
    pub highlights: Vec<Range<usize>>,
}

impl DiffLine {
    pub fn new(
        kind: LineKind,
        content: impl Into<String>,
        old_num: Option<u32>,
        new_num: Option<u32>,
    ) -> Self {
        Self {
            kind,
            content: content.into(),
            old_num,
            new_num,
            highlights: Vec::new(),
        }
    }
}

/// File change status in a diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    /// Holds the old path
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

/// Parsed `@@ -a,b +c,d @@ section` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub section: String,
}

impl HunkHeader {
    pub fn to_line(&self) -> String {
        if self.section.is_empty() {
            format!(
                "@@ -{},{} +{},{} @@",
                self.old_start, self.old_count, self.new_start, self.new_count
            )
        } else {
            format!(
                "@@ -{},{} +{},{} @@ {}",
                self.old_start, self.old_count, self.new_start, self.new_count, self.section
            )
        }
    }
}

/// Hunk content: either parsed lines, or nothing but the byte range to
/// rebuild them from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkBody {
    Materialized(Vec<DiffLine>),
    Deferred,
}

/// A contiguous block of changed lines. Identity is `(file, index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub file: String,
    pub index: usize,
    pub header: HunkHeader,
    /// Absolute byte range in the patch, from the `@@` line through the last body line
    pub byte_range: Range<u64>,
    /// Body lines (context + additions + deletions), known even when deferred
    pub line_count: usize,
    pub additions: usize,
    pub deletions: usize,
    /// Rows this hunk's body occupies in side-by-side layout
    pub split_rows: usize,
    pub body: HunkBody,
    /// Set once intraline ranges were computed for the body
    pub word_diffed: bool,
    /// UI-only
    pub is_collapsed: bool,
}

impl DiffHunk {
    pub fn is_materialized(&self) -> bool {
        matches!(self.body, HunkBody::Materialized(_))
    }

    pub fn lines(&self) -> Option<&[DiffLine]> {
        match &self.body {
            HunkBody::Materialized(lines) => Some(lines),
            HunkBody::Deferred => None,
        }
    }

    /// Copy of this hunk with its body dropped. Used for the per-session
    /// slot list so line content only lives in the cache.
    pub fn to_deferred(&self) -> DiffHunk {
        DiffHunk {
            file: self.file.clone(),
            index: self.index,
            header: self.header.clone(),
            byte_range: self.byte_range.clone(),
            line_count: self.line_count,
            additions: self.additions,
            deletions: self.deletions,
            split_rows: self.split_rows,
            body: HunkBody::Deferred,
            word_diffed: false,
            is_collapsed: self.is_collapsed,
        }
    }

    /// Approximate resident size, used as the cache cost.
    pub fn estimated_bytes(&self) -> usize {
        let mut bytes = std::mem::size_of::<DiffHunk>() + self.file.len() + self.header.section.len();
        if let HunkBody::Materialized(lines) = &self.body {
            for line in lines {
                bytes += std::mem::size_of::<DiffLine>()
                    + line.content.len()
                    + line.highlights.len() * std::mem::size_of::<Range<usize>>();
            }
        }
        bytes
    }

    /// Format as unified-diff text (header + body). Deferred hunks yield
    /// only the header line.
    #[cfg(test)]
    pub fn to_text(&self) -> String {
        let mut text = self.header.to_line();
        text.push('\n');
        if let HunkBody::Materialized(lines) = &self.body {
            for line in lines {
                text.push(line.kind.prefix());
                text.push_str(&line.content);
                text.push('\n');
            }
        }
        text
    }
}

/// A file section of the diff and its hunks, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub old_path: String,
    pub new_path: String,
    pub status: FileStatus,
    pub binary: bool,
    /// `(old mode, new mode)` when the diff records a mode change
    pub mode_change: Option<(String, String)>,
    pub hunks: Vec<DiffHunk>,
    /// Set when at least one hunk header failed to parse and was skipped
    pub partially_parsed: bool,
}

impl FileDiff {
    pub fn new(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
            status: FileStatus::Modified,
            binary: false,
            mode_change: None,
            hunks: Vec::new(),
            partially_parsed: false,
        }
    }

    /// Path used as the file identity: the new path, or the old one for deletions.
    pub fn path(&self) -> &str {
        if self.status == FileStatus::Deleted || self.new_path.is_empty() {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    pub fn additions(&self) -> usize {
        self.hunks.iter().map(|h| h.additions).sum()
    }

    pub fn deletions(&self) -> usize {
        self.hunks.iter().map(|h| h.deletions).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hunk(lines: Vec<DiffLine>) -> DiffHunk {
        DiffHunk {
            file: "src/lib.rs".to_string(),
            index: 0,
            header: HunkHeader {
                old_start: 1,
                old_count: 2,
                new_start: 1,
                new_count: 2,
                section: "fn main()".to_string(),
            },
            byte_range: 0..10,
            line_count: lines.len(),
            additions: 0,
            deletions: 0,
            split_rows: lines.len(),
            body: HunkBody::Materialized(lines),
            word_diffed: false,
            is_collapsed: false,
        }
    }

    #[test]
    fn header_line_with_and_without_section() {
        let mut header = HunkHeader {
            old_start: 10,
            old_count: 4,
            new_start: 12,
            new_count: 6,
            section: String::new(),
        };
        assert_eq!(header.to_line(), "@@ -10,4 +12,6 @@");
        header.section = "impl Foo".to_string();
        assert_eq!(header.to_line(), "@@ -10,4 +12,6 @@ impl Foo");
    }

    #[test]
    fn to_text_prefixes_lines() {
        let hunk = make_hunk(vec![
            DiffLine::new(LineKind::Context, "a", Some(1), Some(1)),
            DiffLine::new(LineKind::Deletion, "b", Some(2), None),
            DiffLine::new(LineKind::Addition, "c", None, Some(2)),
        ]);
        assert_eq!(hunk.to_text(), "@@ -1,2 +1,2 @@ fn main()\n a\n-b\n+c\n");
    }

    #[test]
    fn deferred_copy_is_cheaper() {
        let hunk = make_hunk(vec![DiffLine::new(
            LineKind::Addition,
            "x".repeat(500),
            None,
            Some(1),
        )]);
        let deferred = hunk.to_deferred();
        assert!(!deferred.is_materialized());
        assert_eq!(deferred.line_count, 1);
        assert!(deferred.estimated_bytes() + 500 <= hunk.estimated_bytes());
    }

    #[test]
    fn deleted_file_uses_old_path() {
        let mut file = FileDiff::new("gone.rs", "");
        file.status = FileStatus::Deleted;
        assert_eq!(file.path(), "gone.rs");
        let renamed = FileDiff::new("old.rs", "new.rs");
        assert_eq!(renamed.path(), "new.rs");
    }
}
