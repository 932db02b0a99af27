//! Server-side Active Noise Cancellation engine.
//!
//! Real-time adaptive-filter ANC over a fleet of independent sessions: each
//! session owns a worker thread that turns an input block stream into an
//! output block stream through an adaptive FIR filter, gated by an
//! emergency-bypass decision. See [`Engine`] for the entry point.

pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod filter_state;
pub mod gate;
pub mod manager;
pub mod pipeline;
pub mod session;
pub mod telemetry;

pub use block::SampleBlock;
pub use config::{Algorithm, EngineLimits, SessionConfig};
pub use engine::Engine;
pub use error::{BlockError, EnqueueError, InvalidConfig, NotFound, OpenError, ReconfigureError};
pub use gate::{Classification, Classifier, EmergencyDetector, EmergencyReading, GateDecision};
pub use manager::FleetStats;
pub use session::SessionStatsSnapshot;
pub use telemetry::{EmergencyEvent, EventSink};
