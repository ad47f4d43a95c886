use super::types::{DiffLine, LineKind};
use similar::{DiffTag, TextDiff};
use std::ops::Range;

/// Lines longer than this are left without intraline ranges
const MAX_WORD_DIFF_LINE: usize = 1_000;

/// Fill `highlights` on paired deletion/addition lines.
///
/// Each deletion run directly followed by an addition run is paired
/// positionally; every pair gets the byte ranges of the words that differ.
pub fn annotate(lines: &mut [DiffLine]) {
    let mut ix = 0;
    while ix < lines.len() {
        if lines[ix].kind != LineKind::Deletion {
            ix += 1;
            continue;
        }
        let del_start = ix;
        while ix < lines.len() && lines[ix].kind == LineKind::Deletion {
            ix += 1;
        }
        let add_start = ix;
        while ix < lines.len() && lines[ix].kind == LineKind::Addition {
            ix += 1;
        }
        let pairs = (add_start - del_start).min(ix - add_start);
        for p in 0..pairs {
            let (old, new) = word_ranges(&lines[del_start + p].content, &lines[add_start + p].content);
            lines[del_start + p].highlights = old;
            lines[add_start + p].highlights = new;
        }
    }
}

/// Changed byte ranges in `old` and `new`. Empty when the lines are too long
/// or when everything changed (highlighting the whole line says nothing).
pub fn word_ranges(old: &str, new: &str) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    if old.len() > MAX_WORD_DIFF_LINE || new.len() > MAX_WORD_DIFF_LINE {
        return (Vec::new(), Vec::new());
    }

    let diff = TextDiff::from_words(old, new);
    let old_offsets = token_offsets(diff.old_slices());
    let new_offsets = token_offsets(diff.new_slices());

    let mut old_ranges = Vec::new();
    let mut new_ranges = Vec::new();
    let mut any_equal = false;
    for op in diff.ops() {
        let (tag, old_tokens, new_tokens) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => any_equal = true,
            DiffTag::Delete => push_merged(&mut old_ranges, byte_range(&old_offsets, old_tokens)),
            DiffTag::Insert => push_merged(&mut new_ranges, byte_range(&new_offsets, new_tokens)),
            DiffTag::Replace => {
                push_merged(&mut old_ranges, byte_range(&old_offsets, old_tokens));
                push_merged(&mut new_ranges, byte_range(&new_offsets, new_tokens));
            }
        }
    }

    if !any_equal {
        return (Vec::new(), Vec::new());
    }
    (old_ranges, new_ranges)
}

fn token_offsets(tokens: &[&str]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(tokens.len() + 1);
    let mut at = 0;
    offsets.push(0);
    for token in tokens {
        at += token.len();
        offsets.push(at);
    }
    offsets
}

fn byte_range(offsets: &[usize], tokens: Range<usize>) -> Range<usize> {
    offsets[tokens.start]..offsets[tokens.end]
}

fn push_merged(ranges: &mut Vec<Range<usize>>, next: Range<usize>) {
    if next.is_empty() {
        return;
    }
    if let Some(last) = ranges.last_mut() {
        if last.end == next.start {
            last.end = next.end;
            return;
        }
    }
    ranges.push(next);
}
