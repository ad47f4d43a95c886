mod header;
mod materialize;
mod parser;
mod reader;
mod side_by_side;
mod spool;
mod stream;
mod types;
mod word_diff;

pub use materialize::{apply_word_diff, materialize};
#[cfg(test)]
pub use parser::parse_reader;
pub use parser::{ParseMode, StreamItem};
pub use side_by_side::{pair_rows, SplitRow};
pub use spool::PatchSpool;
pub use stream::{CancelToken, DiffStream, StreamOptions, DEFAULT_PENDING_HUNKS};
pub use types::{DiffHunk, DiffLine, FileDiff, FileStatus, LineKind};
#[cfg(test)]
pub use types::{HunkBody, HunkHeader};
