//! `Session`: the per-stream handle the manager hands out, and its atomic
//! statistics counters (spec §3 `Session`/`SessionStats`).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::filter_state::ConfigMailbox;
use crate::pipeline::{InputQueue, OutputQueue, SessionState, SessionStateCell};

/// Monotonic, atomically-updated counters (spec §3 `SessionStats`, §5:
/// "relaxed ordering suffices for counters; `max_latency_ns` uses CAS").
/// Mutated only by the session's worker thread; reads are plain atomic
/// loads from any thread.
#[derive(Default)]
pub struct SessionStats {
    blocks_in: AtomicU64,
    blocks_out: AtomicU64,
    blocks_dropped_overflow_in: AtomicU64,
    blocks_dropped_overflow_out: AtomicU64,
    emergency_bypasses: AtomicU64,
    sum_latency_ns: AtomicU64,
    max_latency_ns: AtomicU64,
    last_cancellation_db_bits: AtomicU32,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_input(&self) {
        self.blocks_in.fetch_add(1, Ordering::Relaxed);
    }

    /// Input queue evicted the oldest queued block to make room (spec §4.4
    /// step 7 IN tag).
    pub fn record_dropped_overflow_in(&self) {
        self.blocks_dropped_overflow_in.fetch_add(1, Ordering::Relaxed);
    }

    /// Output queue was full and the worker's produced block was dropped
    /// (spec §4.4 step 7 OUT tag).
    pub fn record_dropped_overflow_out(&self) {
        self.blocks_dropped_overflow_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emergency_bypass(&self) {
        self.emergency_bypasses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one emitted output block and its latency (spec §4.4 step 6).
    /// Must only be called after the block is actually pushed to the output
    /// queue — an output-overflow drop is counted by
    /// `record_dropped_overflow_out` instead, never both (P3).
    pub fn record_output(&self, latency: Duration) {
        self.blocks_out.fetch_add(1, Ordering::Relaxed);
        let latency_ns = latency.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.sum_latency_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.max_latency_ns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.max(latency_ns))
            })
            .ok();
    }

    pub fn set_last_cancellation_db(&self, db: f32) {
        self.last_cancellation_db_bits
            .store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            blocks_in: self.blocks_in.load(Ordering::Relaxed),
            blocks_out: self.blocks_out.load(Ordering::Relaxed),
            blocks_dropped_overflow_in: self.blocks_dropped_overflow_in.load(Ordering::Relaxed),
            blocks_dropped_overflow_out: self.blocks_dropped_overflow_out.load(Ordering::Relaxed),
            emergency_bypasses: self.emergency_bypasses.load(Ordering::Relaxed),
            sum_latency_ns: self.sum_latency_ns.load(Ordering::Relaxed),
            max_latency_ns: self.max_latency_ns.load(Ordering::Relaxed),
            last_cancellation_db: f32::from_bits(
                self.last_cancellation_db_bits.load(Ordering::Relaxed),
            ),
        }
    }
}

/// Point-in-time, non-linearized read of a session's counters (spec §5:
/// "the snapshot is not linearized across counters").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatsSnapshot {
    pub blocks_in: u64,
    pub blocks_out: u64,
    /// Blocks evicted from the *input* queue on overflow (drop-oldest).
    pub blocks_dropped_overflow_in: u64,
    /// Blocks dropped at the *output* queue because it was full.
    pub blocks_dropped_overflow_out: u64,
    pub emergency_bypasses: u64,
    pub sum_latency_ns: u64,
    pub max_latency_ns: u64,
    pub last_cancellation_db: f32,
}

impl SessionStatsSnapshot {
    /// Total dropped blocks across both queues (P3's combined drop term).
    pub fn blocks_dropped_overflow(&self) -> u64 {
        self.blocks_dropped_overflow_in + self.blocks_dropped_overflow_out
    }
}

/// A live (or draining/terminated-but-not-yet-reaped) processing context
/// (spec §3 `Session`). Owned by the `SessionManager`'s registry; the
/// `submit`/`take`/`reconfigure` paths operate on the `Arc`-shared fields
/// without touching the worker-owned `FilterState` directly.
pub struct Session {
    pub id: u128,
    /// The config the session was opened with. Immutable for the life of
    /// the session: it is only used to check that `reconfigure` calls don't
    /// attempt to change `sample_rate`/`block_size` (spec §6), and to
    /// validate submitted block sizes.
    open_config: SessionConfig,
    pub state: Arc<SessionStateCell>,
    pub input: Arc<InputQueue>,
    pub output: Arc<OutputQueue>,
    pub mailbox: Arc<ConfigMailbox>,
    pub stats: Arc<SessionStats>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        id: u128,
        open_config: SessionConfig,
        state: Arc<SessionStateCell>,
        input: Arc<InputQueue>,
        output: Arc<OutputQueue>,
        mailbox: Arc<ConfigMailbox>,
        stats: Arc<SessionStats>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            open_config,
            state,
            input,
            output,
            mailbox,
            stats,
            worker: Some(worker),
        }
    }

    pub fn open_config(&self) -> &SessionConfig {
        &self.open_config
    }

    pub fn block_size(&self) -> usize {
        self.open_config.block_size
    }
}

impl Drop for Session {
    /// Ensure the worker thread unwinds even if `close`/`terminate` was
    /// never called explicitly: drop never blocks on `join` (the worker
    /// notices within one poll tick on its own), it just detaches the
    /// handle.
    fn drop(&mut self) {
        self.state.store(SessionState::Terminated);
        self.input.clear();
        if let Some(handle) = self.worker.take() {
            drop(handle);
        }
    }
}
