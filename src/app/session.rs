use super::provider::HunkProvider;
use crate::cache::{CacheKey, DiffCache};
use crate::config::StreamdiffConfig;
use crate::diff::{
    apply_word_diff, DiffStream, FileDiff, ParseMode, PatchSpool, StreamItem, StreamOptions,
};
use crate::error::GitError;
use crate::git::{
    changed_paths, collect_preflight, get_repo_root_in, DiffPreflightStats, DiffProcess, DiffSide,
};
use crate::lfm::{
    decide, resolve_override, resolve_worktree_override, FeatureSet, LfmDecision, OverrideMode, Preset,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What to diff and how the LFM decision may be steered
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub repo_root: PathBuf,
    /// Limit the diff to one path; `None` diffs the whole worktree
    pub path: Option<String>,
    pub side: DiffSide,
    pub cli_override: OverrideMode,
    pub preset: Preset,
    pub run_preflight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Streaming,
    Complete,
    Cancelled,
    Failed(String),
}

/// Hunk counts per file and the patch fingerprint of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub fingerprint: Option<String>,
    pub files: Vec<(String, usize)>,
}

/// One diff request: preflight, LFM decision, and the streaming parse that
/// fills `files` with hunk slots.
///
/// Slots never carry line content. Eager hunks go straight into the cache
/// as they arrive; everything else is rebuilt from the spool on demand.
pub struct DiffSession {
    pub request: SessionRequest,
    pub stats: Option<DiffPreflightStats>,
    pub preflight_error: Option<String>,
    pub decision: LfmDecision,
    pub files: Vec<FileDiff>,
    pub phase: SessionPhase,
    pub hunks_received: usize,
    pub malformed: usize,
    pub fingerprint: Option<String>,
    pub elapsed: Option<Duration>,
    taken: usize,
    mode: ParseMode,
    spool: PatchSpool,
    stream: Option<DiffStream>,
    process: Option<DiffProcess>,
    started: Instant,
}

impl DiffSession {
    /// Run preflight, decide on LFM and start streaming `git diff`.
    pub fn start(mut request: SessionRequest, config: &StreamdiffConfig) -> Result<Self, GitError> {
        request.repo_root = get_repo_root_in(&request.repo_root)?;

        let mode = override_for(&request, config);
        let thresholds = config.lfm.thresholds_for(request.preset);

        let mut preflight_error = None;
        let stats = if request.run_preflight {
            match collect_preflight(
                &request.repo_root,
                request.path.as_deref(),
                request.side,
                Some(&thresholds),
            ) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!(error = %e, "preflight failed, falling back to a full parse");
                    preflight_error = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        let decision = decide(stats.as_ref(), thresholds, mode);

        let mut process = DiffProcess::spawn(&request.repo_root, request.side, request.path.as_deref())?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| GitError::Io(std::io::Error::other("git diff stdout was not captured")))?;

        let mut session = Self::from_source(request, stats, decision, stdout, config);
        session.preflight_error = preflight_error;
        session.process = Some(process);
        Ok(session)
    }

    /// Start a session over any byte source. Used by `start` and by tests.
    pub fn from_source<R>(
        request: SessionRequest,
        stats: Option<DiffPreflightStats>,
        decision: LfmDecision,
        source: R,
        config: &StreamdiffConfig,
    ) -> Self
    where
        R: Read + Send + 'static,
    {
        let mode = if decision.active {
            ParseMode::Deferred
        } else {
            ParseMode::Eager
        };
        let spool = PatchSpool::new(config.stream.spool_in_memory_limit);
        let options = StreamOptions {
            mode,
            ..config.stream.options()
        };
        let stream = DiffStream::spawn(source, spool.clone(), options);
        tracing::debug!(
            path = request.path.as_deref().unwrap_or("."),
            staged = request.side.is_staged(),
            lfm = decision.active,
            "diff session started"
        );

        Self {
            request,
            stats,
            preflight_error: None,
            decision,
            files: Vec::new(),
            phase: SessionPhase::Streaming,
            hunks_received: 0,
            malformed: 0,
            fingerprint: None,
            elapsed: None,
            taken: 0,
            mode,
            spool,
            stream: Some(stream),
            process: None,
            started: Instant::now(),
        }
    }

    pub fn features(&self) -> FeatureSet {
        self.decision.features()
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == SessionPhase::Streaming
    }

    pub fn staged(&self) -> bool {
        self.request.side.is_staged()
    }

    pub fn total_hunks(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }

    pub fn spool_bytes(&self) -> u64 {
        self.spool.len()
    }

    pub fn spool_on_disk(&self) -> bool {
        self.spool.is_on_disk()
    }

    /// Items parsed but not yet taken by `pump`
    pub fn queued(&self) -> usize {
        self.stream
            .as_ref()
            .map(|s| s.produced().saturating_sub(self.taken))
            .unwrap_or(0)
    }

    pub fn provider(&self, cache: Arc<DiffCache>) -> HunkProvider {
        HunkProvider::new(cache, self.spool.clone(), self.staged(), self.features().word_diff)
    }

    /// Move up to `budget` queued items into the session. Returns how many
    /// were taken; finishes the session once the producer is done.
    pub fn pump(&mut self, cache: &DiffCache, budget: usize) -> usize {
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };
        let mut items = Vec::new();
        while items.len() < budget {
            match stream.try_recv() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        let done = stream.is_done();

        let taken = items.len();
        for item in items {
            self.accept(item, cache);
        }
        if done {
            self.finish();
        }
        taken
    }

    /// Block until the producer is done. For the non-interactive paths and tests.
    pub fn drain(&mut self, cache: &DiffCache) {
        while let Some(stream) = self.stream.as_mut() {
            match stream.recv() {
                Some(item) => self.accept(item, cache),
                None => self.finish(),
            }
        }
    }

    fn accept(&mut self, item: StreamItem, cache: &DiffCache) {
        self.taken += 1;
        match item {
            StreamItem::File(file) => self.files.push(file),
            StreamItem::Hunk(mut hunk) => {
                let slot = if hunk.is_materialized() {
                    if self.features().word_diff {
                        apply_word_diff(&mut hunk);
                    }
                    let slot = hunk.to_deferred();
                    let key = CacheKey::new(hunk.file.clone(), self.staged(), hunk.index);
                    cache.put(key, Arc::new(hunk));
                    slot
                } else {
                    hunk
                };
                self.hunks_received += 1;
                if let Some(file) = self.files.last_mut() {
                    file.hunks.push(slot);
                }
            }
            StreamItem::Malformed { .. } => {
                self.malformed += 1;
                if let Some(file) = self.files.last_mut() {
                    file.partially_parsed = true;
                }
            }
        }
    }

    fn finish(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        let summary = stream.wait();
        self.elapsed = Some(self.started.elapsed());

        let exit = match self.process.as_mut() {
            Some(process) if !summary.cancelled => process.finish().err(),
            _ => None,
        };

        self.phase = if let Some(e) = exit {
            SessionPhase::Failed(e.to_string())
        } else if let Some(e) = summary.error {
            SessionPhase::Failed(e)
        } else if summary.cancelled {
            SessionPhase::Cancelled
        } else {
            self.fingerprint = self.spool.fingerprint();
            SessionPhase::Complete
        };
        tracing::info!(
            files = self.files.len(),
            hunks = self.hunks_received,
            malformed = self.malformed,
            bytes = summary.bytes,
            phase = ?self.phase,
            elapsed_ms = self.elapsed.map(|d| d.as_millis() as u64).unwrap_or_default(),
            "diff session finished"
        );
    }

    /// Stop streaming. Hunks already taken stay; nothing partial is cached.
    pub fn cancel(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        stream.cancel();
        if let Some(process) = self.process.as_mut() {
            process.kill();
        }
        self.finish();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            fingerprint: self.fingerprint.clone(),
            files: self
                .files
                .iter()
                .map(|f| (f.path().to_string(), f.hunks.len()))
                .collect(),
        }
    }

    /// Drop cache entries the previous run left behind. Nothing is dropped
    /// when the patch is byte-identical.
    pub fn reconcile_cache(&self, previous: &SessionSnapshot, cache: &DiffCache) -> usize {
        if self.phase != SessionPhase::Complete || previous.fingerprint == self.fingerprint {
            return 0;
        }
        let mut dropped = 0;
        for (path, old_count) in &previous.files {
            let new_count = self
                .files
                .iter()
                .find(|f| f.path() == path)
                .map(|f| f.hunks.len())
                .unwrap_or(0);
            if self.mode == ParseMode::Deferred {
                // Nothing was cached by this run's parse, so anything left is from before
                dropped += cache.remove_file(path);
            } else {
                for index in new_count..*old_count {
                    if cache.remove(&CacheKey::new(path.clone(), self.staged(), index)) {
                        dropped += 1;
                    }
                }
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "dropped stale cache entries");
        }
        dropped
    }
}

/// LFM override for a request: the matching `[[lfm.files]]` entry for a
/// single path, or the entries of every changed file for a worktree diff.
pub fn override_for(request: &SessionRequest, config: &StreamdiffConfig) -> OverrideMode {
    if let Some(path) = request.path.as_deref() {
        return resolve_override(config.lfm.file_override(path), request.cli_override);
    }
    if config.lfm.files.is_empty() {
        return request.cli_override;
    }
    match changed_paths(&request.repo_root, request.side) {
        Ok(paths) => {
            let entries: Vec<_> = paths.iter().map(|p| config.lfm.file_override(p)).collect();
            resolve_worktree_override(&entries, request.cli_override)
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not list changed files, per-file overrides ignored");
            request.cli_override
        }
    }
}

impl Drop for DiffSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
