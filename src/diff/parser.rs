use super::header::{parse_git_header_paths, parse_hunk_header, parse_marker_path};
#[cfg(test)]
use super::reader::LineReader;
use super::side_by_side::SplitCounter;
use super::types::{DiffHunk, DiffLine, FileDiff, FileStatus, HunkBody, HunkHeader, LineKind};
use crate::error::ParseError;
#[cfg(test)]
use std::io::{self, Read};
use std::ops::Range;

/// Whether the parser builds `DiffLine`s or only records where they are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Eager,
    /// Large file mode: hunks carry counts and byte ranges only
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Initial,
    FileHeader,
    Lines,
    /// After a malformed `@@` header: drop body lines until the next header
    SkipMalformed,
}

/// What the parser emits, in file order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// File metadata, announced before its first hunk (hunks left empty)
    File(FileDiff),
    Hunk(DiffHunk),
    Malformed { file: String, error: ParseError },
}

struct HunkBuilder {
    header: HunkHeader,
    range: Range<u64>,
    old_remaining: u32,
    new_remaining: u32,
    old_line: u32,
    new_line: u32,
    lines: Vec<DiffLine>,
    line_count: usize,
    additions: usize,
    deletions: usize,
    split: SplitCounter,
}

impl HunkBuilder {
    fn new(header: HunkHeader, start: u64, end: u64) -> Self {
        Self {
            old_remaining: header.old_count,
            new_remaining: header.new_count,
            old_line: header.old_start,
            new_line: header.new_start,
            header,
            range: start..end,
            lines: Vec::new(),
            line_count: 0,
            additions: 0,
            deletions: 0,
            split: SplitCounter::default(),
        }
    }

    fn is_complete(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }

    fn push(&mut self, kind: LineKind, content: &[u8], end: u64, mode: ParseMode) {
        let (old_num, new_num) = match kind {
            LineKind::Context => {
                self.old_remaining = self.old_remaining.saturating_sub(1);
                self.new_remaining = self.new_remaining.saturating_sub(1);
                (Some(self.old_line), Some(self.new_line))
            }
            LineKind::Deletion => {
                self.old_remaining = self.old_remaining.saturating_sub(1);
                self.deletions += 1;
                (Some(self.old_line), None)
            }
            LineKind::Addition => {
                self.new_remaining = self.new_remaining.saturating_sub(1);
                self.additions += 1;
                (None, Some(self.new_line))
            }
        };
        if old_num.is_some() {
            self.old_line = self.old_line.saturating_add(1);
        }
        if new_num.is_some() {
            self.new_line = self.new_line.saturating_add(1);
        }
        if mode == ParseMode::Eager {
            self.lines.push(DiffLine::new(
                kind,
                String::from_utf8_lossy(content).into_owned(),
                old_num,
                new_num,
            ));
        }
        self.split.push(kind);
        self.line_count += 1;
        self.range.end = end;
    }

    fn build(self, file: &str, index: usize, mode: ParseMode) -> DiffHunk {
        DiffHunk {
            file: file.to_string(),
            index,
            header: self.header,
            byte_range: self.range,
            line_count: self.line_count,
            additions: self.additions,
            deletions: self.deletions,
            split_rows: self.split.finish(),
            body: match mode {
                ParseMode::Eager => HunkBody::Materialized(self.lines),
                ParseMode::Deferred => HunkBody::Deferred,
            },
            word_diffed: false,
            is_collapsed: false,
        }
    }
}

/// Incremental unified-diff parser.
///
/// Fed one line at a time; emits each hunk as soon as its header counts are
/// satisfied, so callers never need the whole diff in memory.
pub struct StreamParser {
    mode: ParseMode,
    state: ParserState,
    file: Option<FileDiff>,
    announced: bool,
    hunk: Option<HunkBuilder>,
    next_index: usize,
}

impl StreamParser {
    pub fn new(mode: ParseMode) -> Self {
        Self {
            mode,
            state: ParserState::Initial,
            file: None,
            announced: false,
            hunk: None,
            next_index: 0,
        }
    }

    /// Parser positioned inside an already-announced file, for reparsing a
    /// single hunk out of the spool.
    pub fn for_hunk(file: &str, index: usize, mode: ParseMode) -> Self {
        Self {
            mode,
            state: ParserState::FileHeader,
            file: Some(FileDiff::new(file, file)),
            announced: true,
            hunk: None,
            next_index: index,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Feed one line (without its newline) covering `span` in the patch.
    pub fn push_line(&mut self, line: &[u8], span: Range<u64>, out: &mut Vec<StreamItem>) {
        if self.state == ParserState::Lines {
            if self.push_body_line(line, span.end) {
                if self.hunk.as_ref().is_some_and(HunkBuilder::is_complete) {
                    self.finish_hunk(out);
                }
                return;
            }
            // Header arrived before the counts were satisfied
            self.finish_hunk(out);
        }

        if line.starts_with(b"diff --git ") {
            self.end_file(out);
            let text = String::from_utf8_lossy(line);
            let (old, new) = parse_git_header_paths(&text).unwrap_or_default();
            self.file = Some(FileDiff::new(old, new));
            self.state = ParserState::FileHeader;
            return;
        }

        if line.starts_with(b"@@") {
            self.start_hunk(line, span, out);
            return;
        }

        if self.state == ParserState::SkipMalformed {
            return;
        }

        if let Some(rest) = line.strip_prefix(b"--- ") {
            // A bare "---" pair starts a new file in non-git diffs
            if self.file.is_none() || self.next_index > 0 {
                self.end_file(out);
                self.file = Some(FileDiff::new("", ""));
            }
            self.state = ParserState::FileHeader;
            if let Some(file) = self.file.as_mut() {
                match parse_marker_path(&String::from_utf8_lossy(rest)) {
                    Some(path) => {
                        if file.old_path.is_empty() {
                            file.old_path = path;
                        }
                    }
                    None => file.status = FileStatus::Added,
                }
            }
            return;
        }

        if self.state != ParserState::FileHeader {
            return;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let text = String::from_utf8_lossy(line);

        if let Some(rest) = text.strip_prefix("+++ ") {
            match parse_marker_path(rest) {
                Some(path) => {
                    if file.new_path.is_empty() {
                        file.new_path = path;
                    }
                }
                None => file.status = FileStatus::Deleted,
            }
        } else if text.starts_with("new file mode") {
            file.status = FileStatus::Added;
        } else if text.starts_with("deleted file mode") {
            file.status = FileStatus::Deleted;
        } else if let Some(old) = text.strip_prefix("rename from ") {
            file.old_path = old.to_string();
            file.status = FileStatus::Renamed(old.to_string());
        } else if let Some(new) = text.strip_prefix("rename to ") {
            file.new_path = new.to_string();
        } else if let Some(mode) = text.strip_prefix("old mode ") {
            let new_mode = file.mode_change.take().map(|(_, n)| n).unwrap_or_default();
            file.mode_change = Some((mode.trim().to_string(), new_mode));
        } else if let Some(mode) = text.strip_prefix("new mode ") {
            let old_mode = file.mode_change.take().map(|(o, _)| o).unwrap_or_default();
            file.mode_change = Some((old_mode, mode.trim().to_string()));
        } else if text.starts_with("Binary files") || text.starts_with("GIT binary patch") {
            file.binary = true;
        }
    }

    /// Flush the hunk and file in progress at end of input.
    pub fn finish(&mut self, out: &mut Vec<StreamItem>) {
        self.end_file(out);
        self.state = ParserState::Initial;
    }

    /// Returns false when `line` is not a body line of the open hunk.
    fn push_body_line(&mut self, line: &[u8], end: u64) -> bool {
        let mode = self.mode;
        let Some(hunk) = self.hunk.as_mut() else {
            return false;
        };
        match line.first() {
            Some(b'\\') => {
                // "\ No newline at end of file"
                hunk.range.end = end;
                true
            }
            Some(b' ') => {
                hunk.push(LineKind::Context, &line[1..], end, mode);
                true
            }
            Some(b'+') => {
                hunk.push(LineKind::Addition, &line[1..], end, mode);
                true
            }
            Some(b'-') => {
                hunk.push(LineKind::Deletion, &line[1..], end, mode);
                true
            }
            // Some tools strip the lone space from empty context lines
            None => {
                hunk.push(LineKind::Context, b"", end, mode);
                true
            }
            _ => false,
        }
    }

    fn start_hunk(&mut self, line: &[u8], span: Range<u64>, out: &mut Vec<StreamItem>) {
        if self.file.is_none() {
            self.file = Some(FileDiff::new("", ""));
        }
        self.announce(out);

        let text = String::from_utf8_lossy(line);
        match parse_hunk_header(&text) {
            Some(header) => {
                self.hunk = Some(HunkBuilder::new(header, span.start, span.end));
                self.state = ParserState::Lines;
                if self.hunk.as_ref().is_some_and(HunkBuilder::is_complete) {
                    self.finish_hunk(out);
                }
            }
            None => {
                let file = self.file_path();
                tracing::warn!(file = %file, offset = span.start, "skipping malformed hunk header");
                if let Some(f) = self.file.as_mut() {
                    f.partially_parsed = true;
                }
                out.push(StreamItem::Malformed {
                    file,
                    error: ParseError::MalformedHunkHeader {
                        line: text.into_owned(),
                        offset: span.start,
                    },
                });
                self.state = ParserState::SkipMalformed;
            }
        }
    }

    fn finish_hunk(&mut self, out: &mut Vec<StreamItem>) {
        if let Some(builder) = self.hunk.take() {
            let file = self.file_path();
            out.push(StreamItem::Hunk(builder.build(&file, self.next_index, self.mode)));
            self.next_index += 1;
        }
        self.state = ParserState::FileHeader;
    }

    fn announce(&mut self, out: &mut Vec<StreamItem>) {
        if self.announced {
            return;
        }
        if let Some(file) = &self.file {
            out.push(StreamItem::File(file.clone()));
            self.announced = true;
        }
    }

    fn end_file(&mut self, out: &mut Vec<StreamItem>) {
        if self.hunk.is_some() {
            self.finish_hunk(out);
        }
        self.announce(out);
        self.file = None;
        self.announced = false;
        self.next_index = 0;
    }

    fn file_path(&self) -> String {
        self.file.as_ref().map(|f| f.path().to_string()).unwrap_or_default()
    }
}

/// Fold stream items into a list of files (hunks appended in order)
#[cfg(test)]
fn apply_item(files: &mut Vec<FileDiff>, item: StreamItem) {
    match item {
        StreamItem::File(file) => files.push(file),
        StreamItem::Hunk(hunk) => {
            if let Some(file) = files.last_mut() {
                file.hunks.push(hunk);
            }
        }
        StreamItem::Malformed { .. } => {
            if let Some(file) = files.last_mut() {
                file.partially_parsed = true;
            }
        }
    }
}

/// Parse a complete diff from a reader, synchronously
#[cfg(test)]
pub fn parse_reader<R: Read>(source: R, mode: ParseMode, buffer: usize) -> io::Result<Vec<FileDiff>> {
    let mut reader = LineReader::new(source, buffer);
    let mut parser = StreamParser::new(mode);
    let mut files = Vec::new();
    let mut line = Vec::new();
    let mut out = Vec::new();
    while let Some(span) = reader.next_line(&mut line)? {
        parser.push_line(&line, span, &mut out);
        for item in out.drain(..) {
            apply_item(&mut files, item);
        }
    }
    parser.finish(&mut out);
    for item in out.drain(..) {
        apply_item(&mut files, item);
    }
    Ok(files)
}
