use super::provider::HunkProvider;
use crate::diff::{CancelToken, DiffHunk};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// A matching line, addressed by file, hunk and line index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchHit {
    pub file: usize,
    pub hunk: usize,
    pub line: usize,
}

/// A hunk to scan, tagged with the file it belongs to
#[derive(Debug, Clone)]
pub struct SearchTarget {
    pub file: usize,
    pub slot: DiffHunk,
}

enum SearchEvent {
    Hit(SearchHit),
    Failed,
    Done,
}

/// Smart case: an all-lowercase query matches case-insensitively
#[derive(Debug, Clone)]
pub struct Matcher {
    needle: String,
    fold: bool,
}

impl Matcher {
    pub fn new(query: &str) -> Self {
        let fold = !query.chars().any(char::is_uppercase);
        Self {
            needle: query.to_string(),
            fold,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.needle.is_empty() {
            return false;
        }
        if self.fold {
            text.to_lowercase().contains(&self.needle)
        } else {
            text.contains(&self.needle)
        }
    }
}

/// Background scan over a session's hunks.
///
/// Hunks are loaded through the provider without being added to the cache.
/// Dropping the job cancels the worker at the next hunk.
pub struct SearchJob {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub failed_hunks: usize,
    pub done: bool,
    rx: Receiver<SearchEvent>,
    cancel: CancelToken,
}

impl SearchJob {
    pub fn spawn(query: &str, targets: Vec<SearchTarget>, provider: HunkProvider) -> Self {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let matcher = Matcher::new(query);
        {
            let cancel = cancel.clone();
            thread::spawn(move || {
                for target in targets {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let hunk = match provider.hunk_uncached(&target.slot) {
                        Ok(h) => h,
                        Err(e) => {
                            tracing::debug!(file = %target.slot.file, error = %e, "search skipped hunk");
                            if tx.send(SearchEvent::Failed).is_err() {
                                return;
                            }
                            continue;
                        }
                    };
                    for (line, diff_line) in hunk.lines().unwrap_or_default().iter().enumerate() {
                        if matcher.matches(&diff_line.content) {
                            let hit = SearchHit {
                                file: target.file,
                                hunk: target.slot.index,
                                line,
                            };
                            if tx.send(SearchEvent::Hit(hit)).is_err() {
                                return;
                            }
                        }
                    }
                }
                let _ = tx.send(SearchEvent::Done);
            });
        }
        tracing::debug!(query, "search started");

        Self {
            query: query.to_string(),
            hits: Vec::new(),
            failed_hunks: 0,
            done: false,
            rx,
            cancel,
        }
    }

    /// Collect whatever the worker found since the last poll. Returns true
    /// if anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(SearchEvent::Hit(hit)) => {
                    self.hits.push(hit);
                    changed = true;
                }
                Ok(SearchEvent::Failed) => self.failed_hunks += 1,
                Ok(SearchEvent::Done) | Err(TryRecvError::Disconnected) => {
                    changed |= !self.done;
                    self.done = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        changed
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SearchJob {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLimits, DiffCache};
    use crate::diff::{parse_reader, ParseMode, PatchSpool};
    use std::io::Write;
    use std::sync::Arc;

    const RAW: &str = "diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,2 +1,2 @@
-fn Alpha() {}
+fn beta() {}
 fn gamma() {}
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -5,1 +5,2 @@
 let alpha = 1;
+let delta = alpha;
";

    fn run(query: &str) -> (SearchJob, Arc<DiffCache>) {
        let mut spool = PatchSpool::new(4096);
        spool.write_all(RAW.as_bytes()).unwrap();
        let cache = Arc::new(DiffCache::new(CacheLimits::default()));
        let files = parse_reader(RAW.as_bytes(), ParseMode::Deferred, 64).unwrap();
        let targets = files
            .iter()
            .enumerate()
            .flat_map(|(file, f)| {
                f.hunks.iter().map(move |slot| SearchTarget {
                    file,
                    slot: slot.clone(),
                })
            })
            .collect();
        let provider = HunkProvider::new(cache.clone(), spool, false, false);
        let mut job = SearchJob::spawn(query, targets, provider);
        while !job.done {
            job.poll();
            std::thread::yield_now();
        }
        (job, cache)
    }

    #[test]
    fn lowercase_query_is_case_insensitive() {
        let (job, _) = run("alpha");
        assert_eq!(
            job.hits,
            vec![
                SearchHit { file: 0, hunk: 0, line: 0 },
                SearchHit { file: 1, hunk: 0, line: 0 },
                SearchHit { file: 1, hunk: 0, line: 1 },
            ]
        );
    }

    #[test]
    fn uppercase_query_is_exact() {
        let (job, _) = run("Alpha");
        assert_eq!(job.hits, vec![SearchHit { file: 0, hunk: 0, line: 0 }]);
    }

    #[test]
    fn search_does_not_fill_cache() {
        let (job, cache) = run("gamma");
        assert_eq!(job.hits.len(), 1);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert!(!Matcher::new("").matches("anything"));
    }
}
