use crate::error::GitError;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Stderr kept from a streaming `git diff` for the error message; the rest is read and dropped
const STDERR_LIMIT: usize = 64 * 1024;

/// Which side of the index a diff compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSide {
    Unstaged,
    Staged,
}

impl DiffSide {
    pub fn from_staged(staged: bool) -> Self {
        if staged {
            DiffSide::Staged
        } else {
            DiffSide::Unstaged
        }
    }

    pub fn is_staged(self) -> bool {
        self == DiffSide::Staged
    }

    pub fn label(self) -> &'static str {
        match self {
            DiffSide::Unstaged => "UNSTAGED",
            DiffSide::Staged => "STAGED",
        }
    }
}

/// Base arguments for `git diff` on one side, optionally limited to a path
pub fn diff_args(side: DiffSide, path: Option<&str>, extra: &[&str]) -> Vec<String> {
    let mut args = vec!["diff".to_string()];
    if side.is_staged() {
        args.push("--cached".to_string());
    }
    args.extend(
        ["--no-color", "--no-ext-diff", "--unified=3"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.extend(extra.iter().map(|s| s.to_string()));
    if let Some(path) = path {
        args.push("--".to_string());
        args.push(path.to_string());
    }
    args
}

/// Run git in `dir` and return stdout. Non-zero exit becomes
/// [`GitError::Failed`] carrying stderr.
pub fn run_git<S: AsRef<str>>(dir: &Path, args: &[S]) -> Result<String, GitError> {
    let output = Command::new("git")
        .args(args.iter().map(|a| a.as_ref()))
        .current_dir(dir)
        .output()
        .map_err(|source| GitError::Spawn { source })?;

    if !output.status.success() {
        return Err(GitError::Failed {
            args: join_args(args),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Get the repository root directory for a specific path
pub fn get_repo_root_in(dir: &Path) -> Result<PathBuf, GitError> {
    if !dir.exists() {
        return Err(GitError::RepoNotFound {
            path: dir.to_path_buf(),
        });
    }
    match run_git(dir, &["rev-parse", "--show-toplevel"]) {
        Ok(out) => Ok(PathBuf::from(out.trim())),
        Err(GitError::Failed { .. }) => Err(GitError::RepoNotFound {
            path: dir.to_path_buf(),
        }),
        Err(e) => Err(e),
    }
}

/// Current branch name, or a short SHA when HEAD is detached
pub fn current_branch_in(repo_root: &Path) -> Result<String, GitError> {
    let branch = run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = branch.trim();
    if branch == "HEAD" {
        let sha = run_git(repo_root, &["rev-parse", "--short", "HEAD"])?;
        return Ok(sha.trim().to_string());
    }
    Ok(branch.to_string())
}

/// Check that `path` is something git can diff: present in the worktree,
/// the index, or HEAD (a deleted file).
pub fn ensure_path_known(repo_root: &Path, path: &str) -> Result<(), GitError> {
    if repo_root.join(path).exists() {
        return Ok(());
    }
    if run_git(repo_root, &["ls-files", "--error-unmatch", "--", path]).is_ok() {
        return Ok(());
    }
    if run_git(repo_root, &["cat-file", "-e", &format!("HEAD:{path}")]).is_ok() {
        return Ok(());
    }
    Err(GitError::PathNotFound {
        path: path.to_string(),
    })
}

/// Paths with changes on `side`, as `git diff --name-only` lists them
pub fn changed_paths(repo_root: &Path, side: DiffSide) -> Result<Vec<String>, GitError> {
    let out = run_git(repo_root, &diff_args(side, None, &["--name-only", "-z"]))?;
    Ok(out
        .split('\0')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect())
}

/// A running `git diff` whose stdout is read incrementally.
///
/// Stderr is drained on its own thread so a chatty git (CRLF warnings for
/// every file) never blocks on a full pipe while stdout is being read.
pub struct DiffProcess {
    child: Child,
    args: String,
    stderr: Option<JoinHandle<String>>,
}

impl DiffProcess {
    pub fn spawn(repo_root: &Path, side: DiffSide, path: Option<&str>) -> Result<Self, GitError> {
        let args = diff_args(side, path, &[]);
        let mut command = Command::new("git");
        command.args(&args).current_dir(repo_root);
        let process = Self::spawn_command(command, args.join(" "))?;
        tracing::debug!(args = %process.args, root = %repo_root.display(), "spawned git diff");
        Ok(process)
    }

    fn spawn_command(mut command: Command, args: String) -> Result<Self, GitError> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::Spawn { source })?;
        let stderr = child.stderr.take().map(drain_stderr);
        Ok(Self { child, args, stderr })
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Stop the subprocess; its stdout then hits EOF.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// Wait for exit once stdout is drained. Non-zero exit becomes
    /// [`GitError::Failed`] with the captured stderr.
    pub fn finish(&mut self) -> Result<(), GitError> {
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        Err(GitError::Failed {
            args: self.args.clone(),
            code: status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Read `pipe` to EOF, keeping the first [`STDERR_LIMIT`] bytes.
fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut kept = Vec::new();
        let mut buf = [0u8; 8 * 1024];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let room = STDERR_LIMIT.saturating_sub(kept.len());
                    kept.extend_from_slice(&buf[..n.min(room)]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&kept).into_owned()
    })
}

impl Drop for DiffProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.kill();
        }
    }
}

fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter().map(|a| a.as_ref()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstaged_args_for_path() {
        let args = diff_args(DiffSide::Unstaged, Some("src/main.rs"), &[]);
        assert_eq!(args[0], "diff");
        assert!(!args.contains(&"--cached".to_string()));
        assert_eq!(&args[args.len() - 2..], &["--".to_string(), "src/main.rs".to_string()]);
    }

    #[test]
    fn staged_numstat_args() {
        let args = diff_args(DiffSide::Staged, None, &["--numstat"]);
        assert!(args.contains(&"--cached".to_string()));
        assert!(args.contains(&"--numstat".to_string()));
        assert!(!args.contains(&"--".to_string()));
    }

    /// Prints a CRLF-style warning per file to stderr, well past a pipe buffer
    #[cfg(unix)]
    fn noisy(exit: i32) -> DiffProcess {
        let script = format!(
            "i=0; while [ $i -lt 4000 ]; do echo \"warning: CRLF will be replaced by LF in file$i.txt\" >&2; i=$((i+1)); done; echo body; exit {exit}"
        );
        let mut command = Command::new("sh");
        command.arg("-c").arg(&script);
        DiffProcess::spawn_command(command, "diff".to_string()).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn heavy_stderr_does_not_stall_stdout() {
        let mut process = noisy(0);
        let mut out = String::new();
        process.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "body\n");
        assert!(process.finish().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn failed_exit_keeps_bounded_stderr() {
        let mut process = noisy(3);
        let mut out = String::new();
        process.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        match process.finish() {
            Err(GitError::Failed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.starts_with("warning: CRLF"));
                assert!(stderr.len() <= STDERR_LIMIT);
            }
            other => panic!("expected a failed exit, got {other:?}"),
        }
    }

    #[test]
    fn missing_directory_is_repo_not_found() {
        let err = get_repo_root_in(Path::new("/definitely/not/a/real/dir")).unwrap_err();
        assert!(matches!(err, GitError::RepoNotFound { .. }));
    }
}
