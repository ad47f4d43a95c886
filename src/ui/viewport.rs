//! Row math for the virtualized diff view.
//!
//! Every row has the same height, so the visible range is plain arithmetic
//! on the scroll offset. `DiffLayout` maps a row back to the file/hunk that
//! owns it through prefix sums, without touching hunk content.

use crate::diff::FileDiff;
use std::ops::Range;

/// Rows `[first, last)` intersecting a viewport of `height` at `offset`,
/// both measured in the same unit as `line_height`.
pub fn visible_range(offset: usize, height: usize, line_height: usize, total_rows: usize) -> Range<usize> {
    let line_height = line_height.max(1);
    let first = offset / line_height;
    let last = (offset + height).div_ceil(line_height);
    first.min(total_rows)..last.min(total_rows)
}

/// Grow `range` by `margin` rows on both sides, clamped to `total_rows`.
pub fn with_margin(range: Range<usize>, margin: usize, total_rows: usize) -> Range<usize> {
    range.start.saturating_sub(margin)..(range.end + margin).min(total_rows)
}

/// What a display row shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    FileHeader { file: usize },
    HunkHeader { file: usize, hunk: usize },
    /// Body row `row` of a hunk: a line index in unified view, a pair index in split view
    Body { file: usize, hunk: usize, row: usize },
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    file: usize,
    hunk: Option<usize>,
}

/// Row positions of every file and hunk for one view configuration
#[derive(Debug, Clone, Default)]
pub struct DiffLayout {
    segments: Vec<Segment>,
    /// starts[i] = first row of segment i; one extra entry holds the total
    starts: Vec<usize>,
    /// Segment index of each file's header
    file_segments: Vec<usize>,
}

impl DiffLayout {
    pub fn build(files: &[FileDiff], split: bool) -> Self {
        let mut layout = DiffLayout::default();
        let mut row = 0;
        for (file_ix, file) in files.iter().enumerate() {
            layout.file_segments.push(layout.segments.len());
            layout.segments.push(Segment {
                file: file_ix,
                hunk: None,
            });
            layout.starts.push(row);
            row += 1;

            for (hunk_ix, hunk) in file.hunks.iter().enumerate() {
                layout.segments.push(Segment {
                    file: file_ix,
                    hunk: Some(hunk_ix),
                });
                layout.starts.push(row);
                let body = if hunk.is_collapsed {
                    0
                } else if split {
                    hunk.split_rows
                } else {
                    hunk.line_count
                };
                row += 1 + body;
            }
        }
        layout.starts.push(row);
        layout
    }

    pub fn total_rows(&self) -> usize {
        self.starts.last().copied().unwrap_or(0)
    }

    pub fn row(&self, row: usize) -> Option<Row> {
        if row >= self.total_rows() {
            return None;
        }
        // Last segment whose start is <= row
        let seg_ix = self.starts.partition_point(|&start| start <= row) - 1;
        let seg = self.segments[seg_ix];
        let within = row - self.starts[seg_ix];
        Some(match (seg.hunk, within) {
            (None, _) => Row::FileHeader { file: seg.file },
            (Some(hunk), 0) => Row::HunkHeader { file: seg.file, hunk },
            (Some(hunk), n) => Row::Body {
                file: seg.file,
                hunk,
                row: n - 1,
            },
        })
    }

    /// Row of the header of hunk `hunk` in file `file`
    pub fn hunk_row(&self, file: usize, hunk: usize) -> Option<usize> {
        let seg = self.file_segments.get(file)? + 1 + hunk;
        match self.segments.get(seg) {
            Some(s) if s.file == file && s.hunk == Some(hunk) => Some(self.starts[seg]),
            _ => None,
        }
    }

    /// Hunk headers in row order as `(row, file, hunk)`
    pub fn hunk_rows(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.segments
            .iter()
            .zip(&self.starts)
            .filter_map(|(seg, &start)| seg.hunk.map(|h| (start, seg.file, h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffHunk, HunkBody, HunkHeader};

    fn make_hunk(index: usize, lines: usize, split_rows: usize) -> DiffHunk {
        DiffHunk {
            file: "f".to_string(),
            index,
            header: HunkHeader {
                old_start: 1,
                old_count: 1,
                new_start: 1,
                new_count: 1,
                section: String::new(),
            },
            byte_range: 0..1,
            line_count: lines,
            additions: 0,
            deletions: 0,
            split_rows,
            body: HunkBody::Deferred,
            word_diffed: false,
            is_collapsed: false,
        }
    }

    fn make_file(hunks: Vec<DiffHunk>) -> FileDiff {
        let mut file = FileDiff::new("f", "f");
        file.hunks = hunks;
        file
    }

    #[test]
    fn visible_range_is_offset_arithmetic() {
        assert_eq!(visible_range(0, 10, 1, 100), 0..10);
        assert_eq!(visible_range(95, 10, 1, 100), 95..100);
        // Pixel offsets with a 16px line: partial rows at both edges count
        assert_eq!(visible_range(40, 100, 16, 1_000), 2..9);
        assert_eq!(visible_range(500, 10, 1, 100), 100..100);
    }

    #[test]
    fn margin_is_clamped() {
        assert_eq!(with_margin(5..15, 20, 100), 0..35);
        assert_eq!(with_margin(90..100, 20, 100), 70..100);
    }

    #[test]
    fn rows_map_back_to_hunks() {
        let files = vec![
            make_file(vec![make_hunk(0, 3, 2), make_hunk(1, 2, 2)]),
            make_file(vec![make_hunk(0, 1, 1)]),
        ];
        let layout = DiffLayout::build(&files, false);
        // file(1) + h0(1+3) + h1(1+2) + file(1) + h0(1+1)
        assert_eq!(layout.total_rows(), 11);
        assert_eq!(layout.row(0), Some(Row::FileHeader { file: 0 }));
        assert_eq!(layout.row(1), Some(Row::HunkHeader { file: 0, hunk: 0 }));
        assert_eq!(layout.row(4), Some(Row::Body { file: 0, hunk: 0, row: 2 }));
        assert_eq!(layout.row(5), Some(Row::HunkHeader { file: 0, hunk: 1 }));
        assert_eq!(layout.row(8), Some(Row::FileHeader { file: 1 }));
        assert_eq!(layout.row(10), Some(Row::Body { file: 1, hunk: 0, row: 0 }));
        assert_eq!(layout.row(11), None);
        assert_eq!(layout.hunk_row(1, 0), Some(9));
        assert_eq!(layout.hunk_row(1, 1), None);
    }

    #[test]
    fn split_and_collapsed_change_heights() {
        let mut hunk = make_hunk(0, 6, 4);
        let files = vec![make_file(vec![hunk.clone()])];
        assert_eq!(DiffLayout::build(&files, true).total_rows(), 1 + 1 + 4);
        hunk.is_collapsed = true;
        let files = vec![make_file(vec![hunk])];
        assert_eq!(DiffLayout::build(&files, false).total_rows(), 2);
    }

    #[test]
    fn file_without_hunks_is_one_row() {
        let layout = DiffLayout::build(&[make_file(Vec::new())], false);
        assert_eq!(layout.total_rows(), 1);
        assert_eq!(layout.hunk_rows().count(), 0);
    }

    #[test]
    fn empty_layout() {
        let layout = DiffLayout::build(&[], false);
        assert_eq!(layout.total_rows(), 0);
        assert_eq!(layout.row(0), None);
    }
}
