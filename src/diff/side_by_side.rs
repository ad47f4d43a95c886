use super::types::{DiffLine, LineKind};

/// One side-by-side row: indices into the hunk's lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRow {
    pub left: Option<usize>,
    pub right: Option<usize>,
}

/// Counts side-by-side rows from a stream of line kinds without keeping the
/// lines. A deletion run followed by an addition run shares rows.
#[derive(Debug, Default, Clone)]
pub struct SplitCounter {
    rows: usize,
    dels: usize,
    adds: usize,
}

impl SplitCounter {
    pub fn push(&mut self, kind: LineKind) {
        match kind {
            LineKind::Deletion => {
                if self.adds > 0 {
                    self.flush();
                }
                self.dels += 1;
            }
            LineKind::Addition => self.adds += 1,
            LineKind::Context => {
                self.flush();
                self.rows += 1;
            }
        }
    }

    fn flush(&mut self) {
        self.rows += self.dels.max(self.adds);
        self.dels = 0;
        self.adds = 0;
    }

    pub fn finish(mut self) -> usize {
        self.flush();
        self.rows
    }
}

/// Pair deletion/addition runs into side-by-side rows
pub fn pair_rows(lines: &[DiffLine]) -> Vec<SplitRow> {
    let mut rows = Vec::with_capacity(lines.len());
    let mut ix = 0;
    while ix < lines.len() {
        match lines[ix].kind {
            LineKind::Context => {
                rows.push(SplitRow {
                    left: Some(ix),
                    right: Some(ix),
                });
                ix += 1;
            }
            LineKind::Deletion | LineKind::Addition => {
                let removed_start = ix;
                while ix < lines.len() && lines[ix].kind == LineKind::Deletion {
                    ix += 1;
                }
                let added_start = ix;
                while ix < lines.len() && lines[ix].kind == LineKind::Addition {
                    ix += 1;
                }
                let removed = added_start - removed_start;
                let added = ix - added_start;
                for entry in 0..removed.max(added) {
                    rows.push(SplitRow {
                        left: (entry < removed).then_some(removed_start + entry),
                        right: (entry < added).then_some(added_start + entry),
                    });
                }
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(kinds: &str) -> Vec<DiffLine> {
        kinds
            .chars()
            .map(|c| {
                let kind = match c {
                    '+' => LineKind::Addition,
                    '-' => LineKind::Deletion,
                    _ => LineKind::Context,
                };
                DiffLine::new(kind, "", None, None)
            })
            .collect()
    }

    fn count(kinds: &str) -> usize {
        let mut counter = SplitCounter::default();
        for line in lines(kinds) {
            counter.push(line.kind);
        }
        counter.finish()
    }

    #[test]
    fn replacement_shares_rows() {
        let rows = pair_rows(&lines(" --++ "));
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], SplitRow { left: Some(1), right: Some(3) });
        assert_eq!(rows[2], SplitRow { left: Some(2), right: Some(4) });
    }

    #[test]
    fn uneven_runs_pad_with_empty_cells() {
        let rows = pair_rows(&lines("---+"));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], SplitRow { left: Some(2), right: None });
    }

    #[test]
    fn addition_before_deletion_is_not_paired() {
        let rows = pair_rows(&lines("+-"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], SplitRow { left: None, right: Some(0) });
        assert_eq!(rows[1], SplitRow { left: Some(1), right: None });
    }

    #[test]
    fn counter_agrees_with_pairing() {
        for kinds in ["", " ", " --++ ", "---+", "+-", "++ --+ -", "-+-+-+", " + - "] {
            assert_eq!(count(kinds), pair_rows(&lines(kinds)).len(), "kinds {kinds:?}");
        }
    }
}
