//! `SessionManager`: process-wide session registry and lifecycle
//! (spec §4.5).
//!
//! The registry is a `RwLock<HashMap>` acquired briefly for lookup; handles
//! to the session's queues are `Arc`-cloned out under the read lock and
//! released immediately, so no session operation holds the registry lock
//! while it runs (spec §5: "a read-write lock acquired briefly for
//! lookup... cloned out under the read lock and then released").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::block::SampleBlock;
use crate::config::{EngineLimits, SessionConfig};
use crate::error::{BlockError, EnqueueError, OpenError, ReconfigureError};
use crate::filter_state::{ConfigMailbox, FilterState};
use crate::gate::{Classifier, EmergencyDetector};
use crate::pipeline::{self, InputQueue, OutputQueue, SessionState, SessionStateCell, WorkerContext};
use crate::session::{Session, SessionStats, SessionStatsSnapshot};
use crate::telemetry::EventSink;

/// Aggregate counters across every registered session (spec §4.5
/// `snapshot_fleet`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FleetStats {
    pub session_count: usize,
    pub active_count: usize,
    pub draining_count: usize,
    pub terminated_count: usize,
    pub blocks_in: u64,
    pub blocks_out: u64,
    pub blocks_dropped_overflow_in: u64,
    pub blocks_dropped_overflow_out: u64,
    pub emergency_bypasses: u64,
}

/// Monotonically increasing 128-bit session ids (spec §6: "128-bit
/// opaque"). A `u128`-wide counter never wraps in practice, so uniqueness
/// within one `SessionManager` is by construction; the opaque 128-bit width
/// is what the external API surface promises, not entropy.
struct SessionIdGenerator {
    counter: AtomicU64,
}

impl SessionIdGenerator {
    fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    fn next(&self) -> u128 {
        u128::from(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct SessionManager {
    limits: EngineLimits,
    sessions: RwLock<HashMap<u128, Arc<Session>>>,
    ids: SessionIdGenerator,
    classifier: Arc<dyn Classifier>,
    detector: Arc<dyn EmergencyDetector>,
    event_sink: Arc<dyn EventSink>,
}

impl SessionManager {
    pub fn new(
        limits: EngineLimits,
        classifier: Arc<dyn Classifier>,
        detector: Arc<dyn EmergencyDetector>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            limits,
            sessions: RwLock::new(HashMap::new()),
            ids: SessionIdGenerator::new(),
            classifier,
            detector,
            event_sink,
        }
    }

    /// Validate `config`, allocate per-session resources, spawn the worker,
    /// and register the session (spec §4.5 `open`).
    pub fn open(&self, config: SessionConfig) -> Result<u128, OpenError> {
        config.validate()?;

        let mut sessions = self.sessions.write().unwrap();
        if sessions.len() >= self.limits.max_sessions {
            return Err(OpenError::CapacityExceeded);
        }

        let id = self.ids.next();
        let state = Arc::new(SessionStateCell::new(SessionState::Active));
        let input = Arc::new(InputQueue::new(self.limits.input_queue_capacity));
        let output = Arc::new(OutputQueue::new(self.limits.output_queue_capacity));
        let mailbox = Arc::new(ConfigMailbox::new());
        let stats = Arc::new(SessionStats::new());
        let filter_state = FilterState::new(config.clone());

        let ctx = WorkerContext {
            session_id: id,
            input: input.clone(),
            output: output.clone(),
            state: state.clone(),
            mailbox: mailbox.clone(),
            stats: stats.clone(),
            classifier: self.classifier.clone(),
            detector: self.detector.clone(),
            event_sink: self.event_sink.clone(),
        };
        let worker = pipeline::spawn_worker(ctx, filter_state);

        let session = Arc::new(Session::new(
            id, config, state, input, output, mailbox, stats, worker,
        ));
        sessions.insert(id, session);
        tracing::info!(session_id = %id, "session opened");
        Ok(id)
    }

    fn lookup(&self, id: u128) -> Option<Arc<Session>> {
        self.sessions.read().unwrap().get(&id).cloned()
    }

    /// Validate the block, then enqueue (spec §4.5 `submit`). The input
    /// queue always accepts: on overflow it drops the oldest queued block
    /// rather than rejecting the new one (spec §4.4, §7 `Full`'s
    /// non-default "caller requested non-drop semantics" is not exposed
    /// here — see DESIGN.md).
    pub fn submit(&self, id: u128, block: SampleBlock) -> Result<(), EnqueueError> {
        let session = self.lookup(id).ok_or(EnqueueError::NotFound)?;

        if session.state.load() != SessionState::Active {
            return Err(EnqueueError::Closed);
        }

        let expected = session.block_size();
        if block.samples.len() != expected {
            return Err(BlockError::WrongSize {
                expected,
                actual: block.samples.len(),
            }
            .into());
        }

        session.stats.record_input();
        if session.input.push(block).is_some() {
            session.stats.record_dropped_overflow_in();
            tracing::warn!(session_id = %id, "input queue overflow, dropped oldest block");
        }
        Ok(())
    }

    /// Non-blocking output poll (spec §4.5 `take`).
    pub fn take(&self, id: u128) -> Option<SampleBlock> {
        let session = self.lookup(id)?;
        session.output.pop()
    }

    /// Validate and post a new config to the worker's handoff mailbox
    /// (spec §4.2, §4.5 `reconfigure`).
    pub fn reconfigure(&self, id: u128, config: SessionConfig) -> Result<(), ReconfigureError> {
        let session = self.lookup(id).ok_or(ReconfigureError::NotFound)?;
        config.validate()?;
        if !config.compatible_with(session.open_config()) {
            return Err(crate::error::InvalidConfig::new(
                "sample_rate and block_size are immutable after open",
            )
            .into());
        }
        session.mailbox.post(config);
        Ok(())
    }

    /// Stop accepting new blocks; the worker finishes queued work then
    /// exits (spec §4.5 `close`).
    pub fn close(&self, id: u128) -> Result<(), crate::error::NotFound> {
        let session = self.lookup(id).ok_or(crate::error::NotFound)?;
        session.state.store(SessionState::Draining);
        tracing::debug!(session_id = %id, "session draining");
        Ok(())
    }

    /// Stop immediately and discard whatever is queued (spec §4.5
    /// `terminate`, §4.4 "discards queued blocks without processing").
    pub fn terminate(&self, id: u128) -> Result<(), crate::error::NotFound> {
        let session = self.lookup(id).ok_or(crate::error::NotFound)?;
        session.state.store(SessionState::Terminated);
        session.input.clear();
        session.output.clear();
        tracing::warn!(session_id = %id, "session terminated, queued blocks discarded");
        Ok(())
    }

    /// Atomic-read snapshot of one session's counters (spec §4.5
    /// `snapshot_stats`; all lifecycle states accept this call).
    pub fn snapshot_stats(&self, id: u128) -> Result<SessionStatsSnapshot, crate::error::NotFound> {
        let session = self.lookup(id).ok_or(crate::error::NotFound)?;
        Ok(session.stats.snapshot())
    }

    /// Aggregate counters across the whole fleet (spec §4.5
    /// `snapshot_fleet`).
    pub fn snapshot_fleet(&self) -> FleetStats {
        let sessions = self.sessions.read().unwrap();
        let mut fleet = FleetStats {
            session_count: sessions.len(),
            ..FleetStats::default()
        };
        for session in sessions.values() {
            match session.state.load() {
                SessionState::Active => fleet.active_count += 1,
                SessionState::Draining => fleet.draining_count += 1,
                SessionState::Terminated => fleet.terminated_count += 1,
            }
            let snap = session.stats.snapshot();
            fleet.blocks_in += snap.blocks_in;
            fleet.blocks_out += snap.blocks_out;
            fleet.blocks_dropped_overflow_in += snap.blocks_dropped_overflow_in;
            fleet.blocks_dropped_overflow_out += snap.blocks_dropped_overflow_out;
            fleet.emergency_bypasses += snap.emergency_bypasses;
        }
        fleet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{NullClassifier, NullEmergencyDetector};
    use crate::telemetry::LoggingEventSink;
    use std::time::Instant;

    fn manager() -> SessionManager {
        SessionManager::new(
            EngineLimits::default(),
            Arc::new(NullClassifier),
            Arc::new(NullEmergencyDetector),
            Arc::new(LoggingEventSink),
        )
    }

    fn small_manager(max_sessions: usize, input_cap: usize) -> SessionManager {
        SessionManager::new(
            EngineLimits {
                max_sessions,
                input_queue_capacity: input_cap,
                output_queue_capacity: 8,
            },
            Arc::new(NullClassifier),
            Arc::new(NullEmergencyDetector),
            Arc::new(LoggingEventSink),
        )
    }

    #[test]
    fn open_rejects_invalid_config() {
        let mgr = manager();
        let mut cfg = SessionConfig::default();
        cfg.filter_length = 0;
        assert!(mgr.open(cfg).is_err());
    }

    #[test]
    fn open_enforces_capacity() {
        let mgr = small_manager(1, 8);
        let cfg = SessionConfig::default();
        mgr.open(cfg.clone()).unwrap();
        assert_eq!(mgr.open(cfg).unwrap_err(), OpenError::CapacityExceeded);
    }

    #[test]
    fn submit_rejects_wrong_block_size() {
        let mgr = manager();
        let id = mgr.open(SessionConfig::default()).unwrap();
        let block = SampleBlock::new(1, vec![0.0; 3], Instant::now());
        assert!(matches!(
            mgr.submit(id, block),
            Err(EnqueueError::InvalidBlock(_))
        ));
    }

    #[test]
    fn submit_to_unknown_session_is_not_found() {
        let mgr = manager();
        let block = SampleBlock::new(1, vec![0.0; 512], Instant::now());
        assert_eq!(mgr.submit(999, block).unwrap_err(), EnqueueError::NotFound);
    }

    #[test]
    fn close_then_submit_returns_closed() {
        let mut cfg = SessionConfig::default();
        cfg.block_size = 4;
        let mgr = manager();
        let id = mgr.open(cfg).unwrap();
        mgr.close(id).unwrap();
        let block = SampleBlock::new(1, vec![0.0; 4], Instant::now());
        assert_eq!(mgr.submit(id, block).unwrap_err(), EnqueueError::Closed);
    }

    #[test]
    fn reconfigure_rejects_sample_rate_change() {
        let mgr = manager();
        let id = mgr.open(SessionConfig::default()).unwrap();
        let mut new_cfg = SessionConfig::default();
        new_cfg.sample_rate = 44_100;
        assert!(mgr.reconfigure(id, new_cfg).is_err());
    }

    #[test]
    fn snapshot_stats_on_unknown_session_is_not_found() {
        let mgr = manager();
        assert!(mgr.snapshot_stats(12345).is_err());
    }

    #[test]
    fn fleet_stats_counts_open_sessions() {
        let mgr = manager();
        mgr.open(SessionConfig::default()).unwrap();
        mgr.open(SessionConfig::default()).unwrap();
        let fleet = mgr.snapshot_fleet();
        assert_eq!(fleet.session_count, 2);
        assert_eq!(fleet.active_count, 2);
    }
}
