//! Decode-ahead prefetcher.
//!
//! A single background thread decodes frames just ahead of the playhead into
//! the frame cache so that sequential renders become cache hits. Work is
//! speculative: a full queue drops new commands, and every job carries the
//! generation of its file at submission time. A seek-class render or a cache
//! clear bumps the generation and the worker discards anything older.
//!
//! The worker never waits on the render lock. When the lock is busy it backs
//! off briefly and retries a bounded number of times before giving up on the
//! rest of the command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use cutline_core::{CutlineError, PrefetchConfig, Result, SourceId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace};

/// Work the prefetcher understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchCommand {
    /// Decode `count` frames after `start_time_ms`.
    Prefetch {
        file: SourceId,
        start_time_ms: i64,
        count: usize,
    },
    /// Scrub hint: drop queued work for `file` and warm up at `time_ms`.
    Seek { file: SourceId, time_ms: i64 },
}

impl PrefetchCommand {
    pub fn file(&self) -> &SourceId {
        match self {
            Self::Prefetch { file, .. } | Self::Seek { file, .. } => file,
        }
    }
}

/// Result of one speculative decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchStep {
    /// Already in the cache.
    Cached,
    /// Decoded and stored.
    Decoded,
    /// The render lock was busy.
    Contended,
    /// The source could not produce the frame.
    Failed,
}

/// What the worker decodes into.
pub trait PrefetchTarget: Send + Sync {
    /// Source time `offset` frames after `start_ms` on the file's frame grid,
    /// or `None` past the end of the file.
    fn frame_time(&self, source: &SourceId, start_ms: i64, offset: i64) -> Option<i64>;

    /// Decode and cache one frame without blocking.
    fn prefetch_frame(&self, source: &SourceId, time_ms: i64) -> PrefetchStep;
}

/// Prefetch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchStats {
    pub enqueued: u64,
    /// Commands rejected because the queue was full.
    pub dropped: u64,
    /// Commands abandoned because their generation was flushed.
    pub stale: u64,
    pub decoded: u64,
    pub already_cached: u64,
    pub contended: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    stale: AtomicU64,
    decoded: AtomicU64,
    already_cached: AtomicU64,
    contended: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PrefetchStats {
        PrefetchStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            already_cached: self.already_cached.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Generation counters: one global epoch plus one per file.
#[derive(Default)]
struct Generations {
    epoch: AtomicU64,
    per_file: Mutex<HashMap<SourceId, u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    epoch: u64,
    file: u64,
}

impl Generations {
    fn stamp(&self, file: &SourceId) -> Stamp {
        Stamp {
            epoch: self.epoch.load(Ordering::Acquire),
            file: self.per_file.lock().get(file).copied().unwrap_or(0),
        }
    }

    fn bump(&self, file: &SourceId) {
        *self.per_file.lock().entry(file.clone()).or_insert(0) += 1;
    }

    fn bump_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn is_stale(&self, file: &SourceId, stamp: Stamp) -> bool {
        self.stamp(file) != stamp
    }
}

struct Job {
    command: PrefetchCommand,
    stamp: Stamp,
}

/// Handle to the prefetch worker thread.
pub struct Prefetcher {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    generations: Arc<Generations>,
    counters: Arc<Counters>,
}

impl Prefetcher {
    /// Start the worker thread.
    pub fn spawn(target: Arc<dyn PrefetchTarget>, config: &PrefetchConfig) -> Result<Self> {
        let (tx, rx) = bounded(config.queue_capacity.max(1));
        let generations = Arc::new(Generations::default());
        let counters = Arc::new(Counters::default());

        let worker = Worker {
            rx,
            target,
            generations: Arc::clone(&generations),
            counters: Arc::clone(&counters),
            retries: config.contention_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        };
        let handle = thread::Builder::new()
            .name("cutline-prefetch".into())
            .spawn(move || worker.run())
            .map_err(|e| CutlineError::Internal(format!("cannot start prefetch thread: {}", e)))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            generations,
            counters,
        })
    }

    /// Queue a command without blocking. Returns false if it was dropped.
    pub fn submit(&self, command: PrefetchCommand) -> bool {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return false,
        };
        if let PrefetchCommand::Seek { file, .. } = &command {
            self.generations.bump(file);
        }
        let stamp = self.generations.stamp(command.file());
        match tx.try_send(Job { command, stamp }) {
            Ok(()) => {
                Counters::bump(&self.counters.enqueued);
                true
            }
            Err(TrySendError::Full(job)) => {
                Counters::bump(&self.counters.dropped);
                trace!(source = %job.command.file(), "prefetch queue full, dropping");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Invalidate queued and running work for one file.
    pub fn flush(&self, file: &SourceId) {
        self.generations.bump(file);
    }

    /// Invalidate all queued and running work.
    pub fn flush_all(&self) {
        self.generations.bump_all();
    }

    pub fn stats(&self) -> PrefetchStats {
        self.counters.snapshot()
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.generations.bump_all();
        // Closing the channel ends the worker loop
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("prefetch worker panicked");
            }
        }
    }
}

struct Worker {
    rx: Receiver<Job>,
    target: Arc<dyn PrefetchTarget>,
    generations: Arc<Generations>,
    counters: Arc<Counters>,
    retries: u32,
    backoff: Duration,
}

impl Worker {
    fn run(self) {
        info!("prefetch worker started");
        while let Ok(job) = self.rx.recv() {
            self.process(job);
        }
        info!("prefetch worker stopped");
    }

    fn process(&self, job: Job) {
        let (file, start_ms, offsets) = match &job.command {
            PrefetchCommand::Prefetch {
                file,
                start_time_ms,
                count,
            } => (file, *start_time_ms, 1..=*count as i64),
            PrefetchCommand::Seek { file, time_ms } => (file, *time_ms, 0..=0),
        };

        for offset in offsets {
            if self.generations.is_stale(file, job.stamp) {
                Counters::bump(&self.counters.stale);
                trace!(source = %file, "prefetch job flushed");
                return;
            }
            let time_ms = match self.target.frame_time(file, start_ms, offset) {
                Some(t) => t,
                None => return,
            };
            if !self.fetch_one(file, time_ms) {
                return;
            }
        }
    }

    /// Returns false when the rest of the command should be abandoned.
    fn fetch_one(&self, file: &SourceId, time_ms: i64) -> bool {
        let mut attempts = 0;
        loop {
            match self.target.prefetch_frame(file, time_ms) {
                PrefetchStep::Cached => {
                    Counters::bump(&self.counters.already_cached);
                    return true;
                }
                PrefetchStep::Decoded => {
                    Counters::bump(&self.counters.decoded);
                    trace!(source = %file, time_ms, "prefetched frame");
                    return true;
                }
                PrefetchStep::Failed => {
                    Counters::bump(&self.counters.failed);
                    return false;
                }
                PrefetchStep::Contended => {
                    Counters::bump(&self.counters.contended);
                    attempts += 1;
                    if attempts > self.retries {
                        debug!(source = %file, time_ms, "render lock busy, giving up prefetch");
                        return false;
                    }
                    thread::sleep(self.backoff);
                }
            }
        }
    }
}
