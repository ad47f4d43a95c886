//! Error types for the diff engine.
//!
//! The application edge (`main`, `App`) works in `anyhow::Result`; these enums
//! are what the engine returns so callers can tell recoverable failures apart.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while talking to the `git` executable.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {}", path.display())]
    RepoNotFound { path: PathBuf },

    #[error("path not found in repository: {path}")]
    PathNotFound { path: String },

    #[error("failed to run git: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} exited with {code:?}: {stderr}")]
    Failed {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to read git output: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// True for the "repository/path not found" class, as opposed to a
    /// generic invocation failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GitError::RepoNotFound { .. } | GitError::PathNotFound { .. })
    }
}

/// A problem localized to one hunk. Never aborts the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed hunk header at byte {offset}: {line:?}")]
    MalformedHunkHeader { line: String, offset: u64 },
}

/// Failures while rebuilding hunk content from the patch spool.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("spool read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("byte range {start}..{end} is outside the spool ({len} bytes)")]
    OutOfRange { start: u64, end: u64, len: u64 },

    #[error("hunk at byte {offset} no longer parses")]
    Reparse { offset: u64 },
}
