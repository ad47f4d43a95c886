use super::command::{diff_args, ensure_path_known, get_repo_root_in, run_git, DiffProcess, DiffSide};
use crate::error::GitError;
use crate::lfm::LfmThresholds;
use serde::Serialize;
use std::io::{self, Read};
use std::path::Path;

/// Cheap size summary of a diff, taken before any line is parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffPreflightStats {
    /// Additions plus deletions
    pub changed_lines: u64,
    pub additions: u64,
    pub deletions: u64,
    pub hunk_count: u64,
    /// Longest line in the patch, in bytes
    pub max_line_length: u64,
    /// Size of the patch text
    pub byte_size: u64,
    pub binary: bool,
    /// The patch scan was skipped because `--numstat` alone already exceeded
    /// the line limit; hunk count, line length and byte size are then zero.
    pub scan_skipped: bool,
}

/// Collect preflight stats for `path` (or the whole worktree when `None`).
///
/// With `limits`, a diff whose `--numstat` line count is already over
/// `max_lines` returns without scanning the patch body.
/// Distinguishes "repository/path not found" from a failed git invocation.
pub fn collect_preflight(
    repo_root: &Path,
    path: Option<&str>,
    side: DiffSide,
    limits: Option<&LfmThresholds>,
) -> Result<DiffPreflightStats, GitError> {
    let root = get_repo_root_in(repo_root)?;
    if let Some(path) = path {
        ensure_path_known(&root, path)?;
    }

    let numstat = run_git(&root, &diff_args(side, path, &["--numstat"]))?;
    let (additions, deletions, binary) = parse_numstat(&numstat);
    let changed_lines = additions + deletions;

    if limits.is_some_and(|t| changed_lines > t.max_lines) {
        tracing::info!(
            path = path.unwrap_or("."),
            changed_lines,
            "preflight over line limit, patch scan skipped"
        );
        return Ok(DiffPreflightStats {
            changed_lines,
            additions,
            deletions,
            binary,
            scan_skipped: true,
            ..Default::default()
        });
    }

    let mut process = DiffProcess::spawn(&root, side, path)?;
    let scan = match process.take_stdout() {
        Some(stdout) => scan_patch(stdout)?,
        None => PatchScan::default(),
    };
    process.finish()?;

    let stats = DiffPreflightStats {
        changed_lines,
        additions,
        deletions,
        hunk_count: scan.hunks,
        max_line_length: scan.max_line_length,
        byte_size: scan.bytes,
        binary,
        scan_skipped: false,
    };
    tracing::info!(
        path = path.unwrap_or("."),
        staged = side.is_staged(),
        changed_lines = stats.changed_lines,
        hunks = stats.hunk_count,
        bytes = stats.byte_size,
        "preflight complete"
    );
    Ok(stats)
}

/// Sum `--numstat` output. Binary entries (`-\t-\tpath`) set the flag and
/// contribute no line counts.
pub fn parse_numstat(output: &str) -> (u64, u64, bool) {
    let mut additions = 0;
    let mut deletions = 0;
    let mut binary = false;
    for line in output.lines() {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(removed)) = (parts.next(), parts.next()) else {
            continue;
        };
        if added == "-" && removed == "-" {
            binary = true;
            continue;
        }
        if let (Ok(a), Ok(d)) = (added.parse::<u64>(), removed.parse::<u64>()) {
            additions += a;
            deletions += d;
        }
    }
    (additions, deletions, binary)
}

/// Totals from one pass over raw patch bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchScan {
    pub bytes: u64,
    pub hunks: u64,
    pub max_line_length: u64,
}

const HUNK_MARKER: &[u8] = b"@@ ";

/// Count bytes, hunk headers and the longest line without building lines.
pub fn scan_patch<R: Read>(mut reader: R) -> io::Result<PatchScan> {
    let mut scan = PatchScan::default();
    let mut buf = [0u8; 64 * 1024];
    let mut line_len: u64 = 0;
    // Bytes of HUNK_MARKER matched at the start of the current line; None once it can't match
    let mut marker: Option<usize> = Some(0);

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        scan.bytes += n as u64;
        for &b in &buf[..n] {
            if b == b'\n' {
                scan.max_line_length = scan.max_line_length.max(line_len);
                line_len = 0;
                marker = Some(0);
                continue;
            }
            line_len += 1;
            if let Some(matched) = marker {
                if HUNK_MARKER[matched] == b {
                    if matched + 1 == HUNK_MARKER.len() {
                        scan.hunks += 1;
                        marker = None;
                    } else {
                        marker = Some(matched + 1);
                    }
                } else {
                    marker = None;
                }
            }
        }
    }
    scan.max_line_length = scan.max_line_length.max(line_len);
    Ok(scan)
}
