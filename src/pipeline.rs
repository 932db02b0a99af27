//! Stream Pipeline: per-session bounded queues and the worker hot loop
//! (spec §4.4).
//!
//! Queues are plain `Mutex<VecDeque>` + `Condvar`, not a lock-free ring
//! buffer: the overflow policy the spec mandates (drop the *oldest* queued
//! block on input overflow, drop the *incoming* block on output overflow)
//! isn't expressible through the teacher's `rtrb` SPSC queues, which only
//! expose non-blocking `try_push`/`try_pop` and no eviction. A short
//! critical section per push/pop is an acceptable trade against that
//! requirement; see DESIGN.md.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::block::SampleBlock;
use crate::filter_state::{ConfigMailbox, FilterState};
use crate::gate::{self, Classifier, EmergencyDetector, GateDecision};
use crate::session::SessionStats;
use crate::telemetry::{EmergencyEvent, EventSink};

/// Worker's input-queue poll timeout (spec §4.4 step 1, §5).
pub const WORKER_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// How often (in processed blocks) `last_cancellation_db` is refreshed
/// (spec §4.4 step 8).
const CANCELLATION_REPORT_INTERVAL: u64 = 32;

/// Session lifecycle (spec §4.5 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Draining,
    Terminated,
}

/// Lock-free state cell shared between the control path and the worker.
pub struct SessionStateCell(AtomicU32);

impl SessionStateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    pub fn load(&self) -> SessionState {
        match self.0.load(Ordering::Acquire) {
            0 => SessionState::Active,
            1 => SessionState::Draining,
            _ => SessionState::Terminated,
        }
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state as u32, Ordering::Release);
    }
}

/// Bounded input queue. `push` never blocks the caller: when at capacity it
/// evicts the oldest queued block to make room (spec §4.4, §5 back-pressure
/// policy). `pop_timeout` is the worker's only blocking point.
pub struct InputQueue {
    capacity: usize,
    inner: Mutex<VecDeque<SampleBlock>>,
    not_empty: Condvar,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be >= 1");
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
        }
    }

    /// Push `block`. Returns the evicted oldest block if the queue was at
    /// capacity.
    pub fn push(&self, block: SampleBlock) -> Option<SampleBlock> {
        let mut guard = self.inner.lock().unwrap();
        let evicted = if guard.len() >= self.capacity {
            guard.pop_front()
        } else {
            None
        };
        guard.push_back(block);
        drop(guard);
        self.not_empty.notify_one();
        evicted
    }

    /// Block up to `timeout` for a block to become available.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SampleBlock> {
        let guard = self.inner.lock().unwrap();
        let (mut guard, _) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap();
        guard.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every queued block without processing (spec §4.4 `terminate`).
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
        self.not_empty.notify_all();
    }
}

/// Bounded output queue. Neither side blocks: the worker's `push` drops the
/// incoming block when full (spec §4.4 step 7, §5 back-pressure policy);
/// the transport's `pop` is a non-blocking poll.
pub struct OutputQueue {
    capacity: usize,
    inner: Mutex<VecDeque<SampleBlock>>,
}

impl OutputQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be >= 1");
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Returns `false` (and drops `block`) if the queue was already full.
    pub fn push(&self, block: SampleBlock) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.len() >= self.capacity {
            return false;
        }
        guard.push_back(block);
        true
    }

    pub fn pop(&self) -> Option<SampleBlock> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

/// Estimate cancellation in dB over a block pair, clamped to a sane display
/// range (spec §4.4 step 8, glossary "Cancellation (dB)").
fn cancellation_db(input: &SampleBlock, output_samples: &[f32]) -> f32 {
    let input_energy = input.energy();
    let output_energy: f64 = output_samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    if input_energy <= 0.0 {
        return 0.0;
    }
    if output_energy <= 0.0 {
        return 120.0;
    }
    let db = 10.0 * (input_energy / output_energy).log10();
    db.clamp(-120.0, 120.0) as f32
}

/// Everything the worker needs for one session. Owned exclusively by the
/// worker thread once spawned; the control path only ever touches the
/// `Arc`-shared queues, mailbox and state cell (spec §5 shared-resource
/// policy).
pub struct WorkerContext {
    pub session_id: u128,
    pub input: Arc<InputQueue>,
    pub output: Arc<OutputQueue>,
    pub state: Arc<SessionStateCell>,
    pub mailbox: Arc<ConfigMailbox>,
    pub stats: Arc<SessionStats>,
    pub classifier: Arc<dyn Classifier>,
    pub detector: Arc<dyn EmergencyDetector>,
    pub event_sink: Arc<dyn EventSink>,
}

/// Spawn the long-lived worker thread for a session (spec §9: "one
/// long-lived worker per session consuming an SPSC queue; never create a
/// new execution context per block").
pub fn spawn_worker(ctx: WorkerContext, mut filter_state: FilterState) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(format!("anc-session-{:032x}", ctx.session_id))
        .spawn(move || run_worker(ctx, &mut filter_state))
        .expect("failed to spawn session worker thread")
}

fn run_worker(ctx: WorkerContext, filter_state: &mut FilterState) {
    let mut blocks_since_report: u64 = 0;

    loop {
        let state = ctx.state.load();
        if state == SessionState::Terminated {
            return;
        }

        let block = match ctx.input.pop_timeout(WORKER_POLL_TIMEOUT) {
            Some(block) => block,
            None => {
                if state == SessionState::Draining && ctx.input.is_empty() {
                    return;
                }
                continue;
            }
        };

        if ctx.state.load() == SessionState::Terminated {
            return;
        }

        filter_state.install_pending_config(&ctx.mailbox);

        let decision = gate::decide(
            filter_state.config(),
            &block,
            ctx.classifier.as_ref(),
            ctx.detector.as_ref(),
        );

        let output_samples = match &decision {
            GateDecision::PassThrough => block.samples.clone(),
            GateDecision::EmergencyBypass { category, confidence } => {
                ctx.stats.record_emergency_bypass();
                ctx.event_sink.record(EmergencyEvent {
                    session_id: ctx.session_id,
                    timestamp: block.capture_timestamp,
                    category: category.clone(),
                    confidence: *confidence,
                });
                block.samples.clone()
            }
            GateDecision::ApplyAnc { .. } => {
                filter_state.process_block(&block.samples, &block.samples)
            }
        };

        blocks_since_report += 1;
        if blocks_since_report >= CANCELLATION_REPORT_INTERVAL {
            blocks_since_report = 0;
            ctx.stats
                .set_last_cancellation_db(cancellation_db(&block, &output_samples));
        }

        let latency = block.capture_timestamp.elapsed();
        let output_block = SampleBlock::new(block.sequence, output_samples, block.capture_timestamp);
        if ctx.output.push(output_block) {
            ctx.stats.record_output(latency);
        } else {
            ctx.stats.record_dropped_overflow_out();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn block(seq: u64, samples: Vec<f32>) -> SampleBlock {
        SampleBlock::new(seq, samples, Instant::now())
    }

    #[test]
    fn input_queue_drops_oldest_on_overflow() {
        let q = InputQueue::new(2);
        assert!(q.push(block(1, vec![0.0])).is_none());
        assert!(q.push(block(2, vec![0.0])).is_none());
        let evicted = q.push(block(3, vec![0.0]));
        assert_eq!(evicted.unwrap().sequence, 1);
        assert_eq!(q.pop_timeout(Duration::from_millis(1)).unwrap().sequence, 2);
        assert_eq!(q.pop_timeout(Duration::from_millis(1)).unwrap().sequence, 3);
    }

    #[test]
    fn input_queue_pop_timeout_returns_none_when_empty() {
        let q = InputQueue::new(4);
        assert!(q.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn output_queue_drops_incoming_on_overflow() {
        let q = OutputQueue::new(1);
        assert!(q.push(block(1, vec![0.0])));
        assert!(!q.push(block(2, vec![0.0])));
        assert_eq!(q.pop().unwrap().sequence, 1);
        assert!(q.pop().is_none());
    }

    #[test]
    fn cancellation_db_of_silent_output_is_capped() {
        let input = block(1, vec![0.5, -0.5]);
        assert_eq!(cancellation_db(&input, &[0.0, 0.0]), 120.0);
    }

    #[test]
    fn cancellation_db_zero_input_energy_is_zero() {
        let input = block(1, vec![0.0, 0.0]);
        assert_eq!(cancellation_db(&input, &[0.1, 0.1]), 0.0);
    }

    #[test]
    fn state_cell_round_trips() {
        let cell = SessionStateCell::new(SessionState::Active);
        assert_eq!(cell.load(), SessionState::Active);
        cell.store(SessionState::Draining);
        assert_eq!(cell.load(), SessionState::Draining);
        cell.store(SessionState::Terminated);
        assert_eq!(cell.load(), SessionState::Terminated);
    }
}
