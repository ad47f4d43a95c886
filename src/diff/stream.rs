use super::parser::{ParseMode, StreamItem, StreamParser};
use super::reader::{LineReader, TeeReader};
use super::spool::PatchSpool;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default bound on hunks waiting for the consumer
pub const DEFAULT_PENDING_HUNKS: usize = 100;

/// Cooperative cancellation flag, checked by the parser at hunk boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    pub mode: ParseMode,
    /// Channel capacity; the producer blocks when this many items are queued
    pub pending_hunks: usize,
    /// Bytes per `read()` on the source
    pub read_buffer: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            mode: ParseMode::Eager,
            pending_hunks: DEFAULT_PENDING_HUNKS,
            read_buffer: 64 * 1024,
        }
    }
}

/// How the producer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub files: usize,
    pub hunks: usize,
    pub malformed: usize,
    pub bytes: u64,
    pub cancelled: bool,
    pub error: Option<String>,
}

/// Consumer side of a streaming parse.
///
/// Items arrive in file order through a bounded channel. Once
/// [`DiffStream::cancel`] is called nothing more is handed out, even if the
/// producer had already queued further items.
pub struct DiffStream {
    rx: Option<Receiver<StreamItem>>,
    cancel: CancelToken,
    produced: Arc<AtomicUsize>,
    handle: Option<JoinHandle<StreamSummary>>,
    done: bool,
}

impl DiffStream {
    /// Spawn the producer thread. Every byte read from `source` is also
    /// appended to `spool`.
    pub fn spawn<R>(source: R, spool: PatchSpool, options: StreamOptions) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(options.pending_hunks.max(1));
        let cancel = CancelToken::new();
        let produced = Arc::new(AtomicUsize::new(0));

        let handle = {
            let cancel = cancel.clone();
            let produced = produced.clone();
            thread::spawn(move || produce(source, spool, options, tx, cancel, produced))
        };

        Self {
            rx: Some(rx),
            cancel,
            produced,
            handle: Some(handle),
            done: false,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Items the producer has managed to queue so far
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    /// True once the producer has hung up and everything queued was taken,
    /// or the stream was cancelled.
    pub fn is_done(&self) -> bool {
        self.done || self.cancel.is_cancelled()
    }

    /// Block until the next item; `None` at end of stream or after cancel.
    pub fn recv(&mut self) -> Option<StreamItem> {
        if self.is_done() {
            return None;
        }
        let item = self.rx.as_ref()?.recv().ok();
        if item.is_none() {
            self.done = true;
        }
        // Cancelled while we were waiting
        if self.cancel.is_cancelled() {
            return None;
        }
        item
    }

    /// Non-blocking variant of [`DiffStream::recv`].
    pub fn try_recv(&mut self) -> Option<StreamItem> {
        if self.is_done() {
            return None;
        }
        match self.rx.as_ref()?.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.done = true;
                None
            }
        }
    }

    /// Hang up and wait for the producer, returning its summary.
    ///
    /// Dropping the receiver first unblocks a producer stuck on a full channel.
    pub fn wait(mut self) -> StreamSummary {
        self.rx = None;
        let fallback = StreamSummary {
            files: 0,
            hunks: 0,
            malformed: 0,
            bytes: 0,
            cancelled: self.cancel.is_cancelled(),
            error: Some("diff parser thread panicked".to_string()),
        };
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(fallback),
            None => fallback,
        }
    }
}

impl Iterator for DiffStream {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        self.recv()
    }
}

impl Drop for DiffStream {
    fn drop(&mut self) {
        if !self.done {
            self.cancel.cancel();
        }
        // The receiver drops with us; a producer blocked in send() wakes with an error
    }
}

fn produce<R: Read>(
    source: R,
    spool: PatchSpool,
    options: StreamOptions,
    tx: SyncSender<StreamItem>,
    cancel: CancelToken,
    produced: Arc<AtomicUsize>,
) -> StreamSummary {
    let mut reader = LineReader::new(TeeReader::new(source, spool.clone()), options.read_buffer);
    let mut parser = StreamParser::new(options.mode);
    let mut summary = StreamSummary {
        files: 0,
        hunks: 0,
        malformed: 0,
        bytes: 0,
        cancelled: false,
        error: None,
    };
    let mut line = Vec::new();
    let mut out = Vec::new();

    let send_all = |out: &mut Vec<StreamItem>, summary: &mut StreamSummary| -> bool {
        for item in out.drain(..) {
            // Hunk boundary: the only place cancellation is observed
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return false;
            }
            match &item {
                StreamItem::File(_) => summary.files += 1,
                StreamItem::Hunk(_) => summary.hunks += 1,
                StreamItem::Malformed { .. } => summary.malformed += 1,
            }
            if tx.send(item).is_err() {
                // Consumer went away
                summary.cancelled = true;
                return false;
            }
            produced.fetch_add(1, Ordering::SeqCst);
        }
        true
    };

    loop {
        match reader.next_line(&mut line) {
            Ok(Some(span)) => {
                parser.push_line(&line, span, &mut out);
                if !out.is_empty() && !send_all(&mut out, &mut summary) {
                    break;
                }
            }
            Ok(None) => {
                parser.finish(&mut out);
                send_all(&mut out, &mut summary);
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "diff stream read failed");
                summary.error = Some(e.to_string());
                break;
            }
        }
    }

    summary.bytes = reader.offset();
    if !summary.cancelled && summary.error.is_none() {
        spool.seal();
    }
    tracing::debug!(
        files = summary.files,
        hunks = summary.hunks,
        malformed = summary.malformed,
        bytes = summary.bytes,
        cancelled = summary.cancelled,
        "diff stream finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    fn generate_diff(hunks: usize) -> String {
        let mut raw = String::from("diff --git a/big.rs b/big.rs\n--- a/big.rs\n+++ b/big.rs\n");
        for n in 0..hunks {
            let start = n * 10 + 1;
            raw.push_str(&format!("@@ -{start},2 +{start},2 @@\n-old {n}\n+new {n}\n ctx {n}\n"));
        }
        raw
    }

    fn hunks_only(stream: DiffStream) -> Vec<usize> {
        stream
            .filter_map(|item| match item {
                StreamItem::Hunk(h) => Some(h.index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn streams_all_hunks_in_order() {
        let raw = generate_diff(250);
        let stream = DiffStream::spawn(
            Cursor::new(raw.into_bytes()),
            PatchSpool::new(1 << 20),
            StreamOptions {
                read_buffer: 13,
                ..StreamOptions::default()
            },
        );
        let indices = hunks_only(stream);
        assert_eq!(indices, (0..250).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input_finishes_cleanly() {
        let mut stream = DiffStream::spawn(
            Cursor::new(Vec::new()),
            PatchSpool::new(1024),
            StreamOptions::default(),
        );
        assert!(stream.recv().is_none());
        assert!(stream.is_done());
        let summary = stream.wait();
        assert_eq!(summary.hunks, 0);
        assert!(!summary.cancelled);
    }

    #[test]
    fn spool_holds_the_whole_patch() {
        let raw = generate_diff(20);
        let spool = PatchSpool::new(64);
        let mut stream = DiffStream::spawn(
            Cursor::new(raw.clone().into_bytes()),
            spool.clone(),
            StreamOptions::default(),
        );
        while stream.recv().is_some() {}
        let summary = stream.wait();
        assert!(!summary.cancelled);
        assert_eq!(summary.bytes, raw.len() as u64);
        assert_eq!(spool.read_range(0..raw.len() as u64).unwrap(), raw.as_bytes());
        assert!(spool.fingerprint().is_some());
    }

    #[test]
    fn producer_blocks_when_consumer_lags() {
        let capacity = 4;
        let mut stream = DiffStream::spawn(
            Cursor::new(generate_diff(500).into_bytes()),
            PatchSpool::new(1 << 20),
            StreamOptions {
                pending_hunks: capacity,
                ..StreamOptions::default()
            },
        );
        let mut consumed = 0;
        for _ in 0..10 {
            assert!(stream.recv().is_some());
            consumed += 1;
            std::thread::sleep(Duration::from_millis(10));
            assert!(
                stream.produced() <= consumed + capacity,
                "produced {} with {} consumed",
                stream.produced(),
                consumed
            );
        }
        stream.cancel();
        assert!(stream.wait().cancelled);
    }

    #[test]
    fn cancel_after_three_hunks_delivers_exactly_three() {
        let mut stream = DiffStream::spawn(
            Cursor::new(generate_diff(10).into_bytes()),
            PatchSpool::new(1 << 20),
            StreamOptions::default(),
        );
        let mut seen = Vec::new();
        while let Some(item) = stream.recv() {
            if let StreamItem::Hunk(h) = item {
                seen.push(h.index);
                if seen.len() == 3 {
                    stream.cancel();
                }
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(stream.recv().is_none());
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn cancelled_producer_stops_early() {
        let mut stream = DiffStream::spawn(
            Cursor::new(generate_diff(5_000).into_bytes()),
            PatchSpool::new(1 << 24),
            StreamOptions {
                pending_hunks: 2,
                ..StreamOptions::default()
            },
        );
        assert!(stream.recv().is_some());
        stream.cancel();
        let summary = stream.wait();
        assert!(summary.cancelled);
        assert!(summary.hunks < 5_000);
    }
}
