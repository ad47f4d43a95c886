use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use std::path::{Component, Path};
use std::sync::mpsc;
use std::time::Duration;

/// Events emitted by the file watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// One or more files changed; the diff may be stale
    FilesChanged(Vec<String>),
}

/// A debounced file watcher over a git working tree
pub struct FileWatcher {
    _watcher: notify_debouncer_mini::Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    /// Start watching `root`. Changes are batched over `debounce_ms` and sent to `tx`.
    pub fn new(root: &Path, debounce_ms: u64, tx: mpsc::Sender<WatchEvent>) -> Result<Self> {
        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| {
                let events = match result {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!(error = %e, "file watcher error");
                        return;
                    }
                };
                let paths: Vec<String> = events
                    .iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any)
                    .filter(|e| is_relevant(&e.path))
                    .map(|e| e.path.to_string_lossy().to_string())
                    .collect();
                if !paths.is_empty() {
                    tracing::debug!(count = paths.len(), "files changed");
                    if tx.send(WatchEvent::FilesChanged(paths)).is_err() {
                        tracing::debug!("watch receiver gone");
                    }
                }
            },
        )?;

        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for changes");

        Ok(FileWatcher {
            _watcher: debouncer,
        })
    }
}

/// Working tree files pass. Inside `.git/` only the index (staging) and refs
/// (commits) matter; objects, logs and lock files are noise.
fn is_relevant(path: &Path) -> bool {
    let mut components = path.components();
    while let Some(component) = components.next() {
        if component == Component::Normal(".git".as_ref()) {
            let rest: Vec<_> = components.collect();
            return match rest.first() {
                Some(Component::Normal(name)) if *name == "index" => rest.len() == 1,
                Some(Component::Normal(name)) if *name == "refs" => true,
                _ => false,
            };
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_tree_files_are_relevant() {
        assert!(is_relevant(Path::new("/repo/src/main.rs")));
        assert!(is_relevant(Path::new("/repo/.gitignore")));
    }

    #[test]
    fn git_noise_is_filtered() {
        assert!(is_relevant(Path::new("/repo/.git/index")));
        assert!(is_relevant(Path::new("/repo/.git/refs/heads/main")));
        assert!(!is_relevant(Path::new("/repo/.git/objects/ab/cdef")));
        assert!(!is_relevant(Path::new("/repo/.git/index.lock")));
        assert!(!is_relevant(Path::new("/repo/.git/logs/HEAD")));
    }
}
