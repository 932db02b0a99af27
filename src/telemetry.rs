//! Emergency-event reporting (spec §3 `EmergencyEvent`, §6 `EventSink`).

use std::time::Instant;

/// Recorded whenever the gate decides `EmergencyBypass` (spec §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyEvent {
    pub session_id: u128,
    pub timestamp: Instant,
    pub category: String,
    pub confidence: f32,
}

/// Fire-and-forget sink for emergency events. Failures are swallowed after
/// logging (spec §6) — mirroring the teacher's `log_audio_error` pattern of
/// always logging structured context at the point of failure.
pub trait EventSink: Send + Sync {
    fn record(&self, event: EmergencyEvent);
}

/// Default sink: logs at `warn` level via `tracing` and drops the event.
/// Safety-critical callers are expected to supply a real sink (persistent
/// store, paging system, etc.) — this default exists so the engine is usable
/// without one.
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn record(&self, event: EmergencyEvent) {
        tracing::warn!(
            session_id = %event.session_id,
            category = %event.category,
            confidence = event.confidence,
            "emergency bypass recorded"
        );
    }
}
