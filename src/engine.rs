//! `Engine`: the single owned value the host constructs and holds by
//! reference (spec §9: "recast as an explicit `Engine` value owning the
//! `SessionManager`, classifier capability, detector capability, and event
//! sink... no static mutable globals").

use std::sync::Arc;

use crate::block::SampleBlock;
use crate::config::{EngineLimits, SessionConfig};
use crate::error::{EnqueueError, NotFound, OpenError, ReconfigureError};
use crate::gate::{Classifier, EmergencyDetector, NullClassifier, NullEmergencyDetector};
use crate::manager::{FleetStats, SessionManager};
use crate::session::SessionStatsSnapshot;
use crate::telemetry::{EventSink, LoggingEventSink};

/// Top-level handle to the ANC engine. Cheap to construct once per process
/// and pass around by reference; all mutation happens through the
/// `SessionManager` it owns.
pub struct Engine {
    manager: SessionManager,
}

impl Engine {
    pub fn new(
        limits: EngineLimits,
        classifier: Arc<dyn Classifier>,
        detector: Arc<dyn EmergencyDetector>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            manager: SessionManager::new(limits, classifier, detector, event_sink),
        }
    }

    /// Construct an engine with no classifier, no emergency detection, and
    /// a logging event sink — useful for hosts that have not wired in the
    /// ML capabilities yet (spec §4.3: both capabilities "may be a no-op").
    pub fn with_defaults(limits: EngineLimits) -> Self {
        Self::new(
            limits,
            Arc::new(NullClassifier),
            Arc::new(NullEmergencyDetector),
            Arc::new(LoggingEventSink),
        )
    }

    pub fn open(&self, config: SessionConfig) -> Result<u128, OpenError> {
        self.manager.open(config)
    }

    pub fn submit(&self, id: u128, block: SampleBlock) -> Result<(), EnqueueError> {
        self.manager.submit(id, block)
    }

    pub fn take(&self, id: u128) -> Option<SampleBlock> {
        self.manager.take(id)
    }

    pub fn reconfigure(&self, id: u128, config: SessionConfig) -> Result<(), ReconfigureError> {
        self.manager.reconfigure(id, config)
    }

    pub fn close(&self, id: u128) -> Result<(), NotFound> {
        self.manager.close(id)
    }

    pub fn terminate(&self, id: u128) -> Result<(), NotFound> {
        self.manager.terminate(id)
    }

    pub fn snapshot_stats(&self, id: u128) -> Result<SessionStatsSnapshot, NotFound> {
        self.manager.snapshot_stats(id)
    }

    pub fn snapshot_fleet(&self) -> FleetStats {
        self.manager.snapshot_fleet()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_defaults(EngineLimits::default())
    }
}
