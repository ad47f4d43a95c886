use crate::cache::{CacheKey, DiffCache};
use crate::diff::{apply_word_diff, materialize, DiffHunk, PatchSpool};
use crate::error::MaterializeError;
use std::sync::Arc;

/// Hands out materialized hunks for a session: from the cache when the
/// cached copy still matches the slot and the session's word diff setting,
/// otherwise rebuilt from the spool.
///
/// Cheap to clone; the renderer and the search worker each hold one.
#[derive(Clone)]
pub struct HunkProvider {
    cache: Arc<DiffCache>,
    spool: PatchSpool,
    staged: bool,
    word_diff: bool,
}

impl HunkProvider {
    pub fn new(cache: Arc<DiffCache>, spool: PatchSpool, staged: bool, word_diff: bool) -> Self {
        Self {
            cache,
            spool,
            staged,
            word_diff,
        }
    }

    pub fn key(&self, slot: &DiffHunk) -> CacheKey {
        CacheKey::new(slot.file.clone(), self.staged, slot.index)
    }

    /// Materialized hunk for `slot`, stored in the cache on a miss.
    pub fn hunk(&self, slot: &DiffHunk) -> Result<Arc<DiffHunk>, MaterializeError> {
        self.load(slot, true)
    }

    /// Like [`HunkProvider::hunk`] but leaves the cache alone on a miss, so a
    /// full scan does not push out what is on screen.
    pub fn hunk_uncached(&self, slot: &DiffHunk) -> Result<Arc<DiffHunk>, MaterializeError> {
        self.load(slot, false)
    }

    fn load(&self, slot: &DiffHunk, store: bool) -> Result<Arc<DiffHunk>, MaterializeError> {
        let key = self.key(slot);
        if let Some(cached) = self.cache.get(&key) {
            if same_slot(&cached, slot) && cached.word_diffed == self.word_diff {
                return Ok(cached);
            }
            tracing::debug!(file = %slot.file, hunk = slot.index, "cached hunk is stale");
        }

        let mut hunk = materialize(&self.spool, slot)?;
        if self.word_diff {
            apply_word_diff(&mut hunk);
        }
        let hunk = Arc::new(hunk);
        if store {
            self.cache.put(key, hunk.clone());
        }
        Ok(hunk)
    }
}

fn same_slot(cached: &DiffHunk, slot: &DiffHunk) -> bool {
    cached.byte_range == slot.byte_range
        && cached.header == slot.header
        && cached.line_count == slot.line_count
}
