//! Classifier Gate: per-block decision between pass-through, ANC, and
//! emergency bypass (spec §4.3).

use std::time::{Duration, Instant};

use crate::block::SampleBlock;
use crate::config::SessionConfig;

/// Label and confidence returned by a noise classifier. The core does not
/// interpret `label`; it is opaque to everything but telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

/// Category and confidence returned by the emergency detector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyReading {
    pub category: String,
    pub confidence: f32,
}

/// External noise-type classifier (spec §1: "out of scope ... the core calls
/// a classifier abstraction"). May be a no-op.
pub trait Classifier: Send + Sync {
    fn classify(&self, block: &SampleBlock) -> Classification;
}

/// External emergency-sound detector. May be a no-op. `detect` returning
/// `Err` is treated identically to running past the per-block budget: the
/// fail-safe rule in `decide` always falls back to `PassThrough`.
pub trait EmergencyDetector: Send + Sync {
    fn detect(&self, block: &SampleBlock) -> Result<EmergencyReading, DetectorError>;
}

/// Opaque detector failure; the gate never inspects the reason, only that
/// detection could not be trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("emergency detector failed: {reason}")]
pub struct DetectorError {
    pub reason: String,
}

/// Classifier that always reports `("unknown", 0.0)` (spec §4.3).
pub struct NullClassifier;

impl Classifier for NullClassifier {
    fn classify(&self, _block: &SampleBlock) -> Classification {
        Classification {
            label: "unknown".to_string(),
            confidence: 0.0,
        }
    }
}

/// Detector that never triggers.
pub struct NullEmergencyDetector;

impl EmergencyDetector for NullEmergencyDetector {
    fn detect(&self, _block: &SampleBlock) -> Result<EmergencyReading, DetectorError> {
        Ok(EmergencyReading {
            category: "none".to_string(),
            confidence: 0.0,
        })
    }
}

/// Per-block budget for the emergency detector (spec §4.3).
pub const EMERGENCY_DETECTOR_BUDGET: Duration = Duration::from_millis(2);

/// The gate's per-block decision.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    PassThrough,
    ApplyAnc { intensity: f32 },
    EmergencyBypass {
        category: String,
        confidence: f32,
    },
}

/// Decide the mode for one block (spec §4.3 decision rule, first match wins).
///
/// Fail-safe: if the emergency detector errors, or measurably overruns its
/// budget, the block is treated as *possibly* emergency and the result is
/// `PassThrough` — never silently apply ANC when detection is broken.
pub fn decide(
    config: &SessionConfig,
    block: &SampleBlock,
    classifier: &dyn Classifier,
    detector: &dyn EmergencyDetector,
) -> GateDecision {
    if config.bypass_ml {
        return GateDecision::ApplyAnc {
            intensity: config.intensity,
        };
    }

    let started = Instant::now();
    let reading = detector.detect(block);
    let elapsed = started.elapsed();

    let reading = match reading {
        Ok(reading) if elapsed <= EMERGENCY_DETECTOR_BUDGET => reading,
        _ => return GateDecision::PassThrough,
    };

    // The classifier result is informational only in this decision rule; it
    // still gets invoked so telemetry/classification consumers see every
    // block, matching spec §4.3's listed inputs.
    let _classification = classifier.classify(block);

    if reading.confidence >= config.emergency_threshold {
        return GateDecision::EmergencyBypass {
            category: reading.category,
            confidence: reading.confidence,
        };
    }

    GateDecision::ApplyAnc {
        intensity: config.intensity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn block() -> SampleBlock {
        SampleBlock::new(1, vec![0.0; 4], Instant::now())
    }

    struct SpyDetector {
        confidence: f32,
    }
    impl EmergencyDetector for SpyDetector {
        fn detect(&self, _block: &SampleBlock) -> Result<EmergencyReading, DetectorError> {
            Ok(EmergencyReading {
                category: "alarm".to_string(),
                confidence: self.confidence,
            })
        }
    }

    struct FailingDetector;
    impl EmergencyDetector for FailingDetector {
        fn detect(&self, _block: &SampleBlock) -> Result<EmergencyReading, DetectorError> {
            Err(DetectorError {
                reason: "model crashed".to_string(),
            })
        }
    }

    struct PanicOnCallClassifier;
    impl Classifier for PanicOnCallClassifier {
        fn classify(&self, _block: &SampleBlock) -> Classification {
            panic!("bypass_ml should skip this call");
        }
    }
    struct PanicOnCallDetector;
    impl EmergencyDetector for PanicOnCallDetector {
        fn detect(&self, _block: &SampleBlock) -> Result<EmergencyReading, DetectorError> {
            panic!("bypass_ml should skip this call");
        }
    }

    #[test]
    fn bypass_ml_skips_both_capabilities() {
        let mut cfg = SessionConfig::default();
        cfg.bypass_ml = true;
        cfg.intensity = 0.7;
        let decision = decide(
            &cfg,
            &block(),
            &PanicOnCallClassifier,
            &PanicOnCallDetector,
        );
        assert_eq!(decision, GateDecision::ApplyAnc { intensity: 0.7 });
    }

    #[test]
    fn confidence_above_threshold_triggers_emergency_bypass() {
        let mut cfg = SessionConfig::default();
        cfg.emergency_threshold = 0.7;
        let decision = decide(
            &cfg,
            &block(),
            &NullClassifier,
            &SpyDetector { confidence: 0.9 },
        );
        assert_eq!(
            decision,
            GateDecision::EmergencyBypass {
                category: "alarm".to_string(),
                confidence: 0.9
            }
        );
    }

    #[test]
    fn confidence_below_threshold_applies_anc() {
        let mut cfg = SessionConfig::default();
        cfg.emergency_threshold = 0.7;
        cfg.intensity = 1.0;
        let decision = decide(
            &cfg,
            &block(),
            &NullClassifier,
            &SpyDetector { confidence: 0.1 },
        );
        assert_eq!(decision, GateDecision::ApplyAnc { intensity: 1.0 });
    }

    #[test]
    fn failing_detector_fails_safe_to_pass_through() {
        let cfg = SessionConfig::default();
        let decision = decide(&cfg, &block(), &NullClassifier, &FailingDetector);
        assert_eq!(decision, GateDecision::PassThrough);
    }

    #[test]
    fn exact_threshold_confidence_triggers_bypass() {
        let mut cfg = SessionConfig::default();
        cfg.emergency_threshold = 0.5;
        let decision = decide(
            &cfg,
            &block(),
            &NullClassifier,
            &SpyDetector { confidence: 0.5 },
        );
        assert!(matches!(decision, GateDecision::EmergencyBypass { .. }));
    }
}
