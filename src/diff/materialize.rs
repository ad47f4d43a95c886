use super::parser::{ParseMode, StreamItem, StreamParser};
use super::spool::PatchSpool;
use super::types::{DiffHunk, HunkBody};
use super::word_diff;
use crate::error::MaterializeError;

/// Rebuild the lines of `slot` from the patch bytes it points at.
///
/// `slot` is usually a deferred hunk; the result is a materialized copy with
/// the same identity, header and counts.
pub fn materialize(spool: &PatchSpool, slot: &DiffHunk) -> Result<DiffHunk, MaterializeError> {
    let bytes = spool.read_range(slot.byte_range.clone())?;
    let mut parser = StreamParser::for_hunk(&slot.file, slot.index, ParseMode::Eager);
    let mut out = Vec::new();

    let mut offset = slot.byte_range.start;
    for raw_line in bytes.split_inclusive(|&b| b == b'\n') {
        let end = offset + raw_line.len() as u64;
        let line = raw_line.strip_suffix(b"\n").unwrap_or(raw_line);
        parser.push_line(line, offset..end, &mut out);
        offset = end;
    }
    parser.finish(&mut out);

    let reparse = || MaterializeError::Reparse {
        offset: slot.byte_range.start,
    };
    let mut hunk = out
        .into_iter()
        .find_map(|item| match item {
            StreamItem::Hunk(h) => Some(h),
            _ => None,
        })
        .ok_or_else(reparse)?;

    if hunk.header != slot.header || hunk.line_count != slot.line_count {
        return Err(reparse());
    }
    hunk.file = slot.file.clone();
    hunk.is_collapsed = slot.is_collapsed;
    Ok(hunk)
}

/// Add intraline word-diff ranges to a materialized hunk
pub fn apply_word_diff(hunk: &mut DiffHunk) {
    if let HunkBody::Materialized(lines) = &mut hunk.body {
        word_diff::annotate(lines);
        hunk.word_diffed = true;
    }
}
