//! Runtime configuration (spec §3, §6).
//!
//! Mirrors the teacher's `config::AppConfig`: a serde-derived value type with
//! a `Default` impl and an explicit validation boundary, rather than a bag of
//! loosely-typed parameters.

use serde::{Deserialize, Serialize};

use crate::error::InvalidConfig;

/// Adaptive-filter algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Lms,
    Nlms,
    Rls,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Nlms
    }
}

/// Per-session configuration (spec §3 `SessionConfig`, §6 field table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Informational; used only for latency/cancellation reporting.
    pub sample_rate: u32,
    /// Enforced size of every submitted block; immutable after `open`.
    pub block_size: usize,
    pub algorithm: Algorithm,
    /// Tap count (1..=2048). Changing this resets the filter.
    pub filter_length: usize,
    /// LMS/NLMS step size `µ` (0 < µ < 2), or RLS forgetting factor `λ` (0 < λ <= 1).
    pub step_size: f32,
    /// Output-mix gain applied to the anti-noise estimate (0.0..=1.0).
    pub intensity: f32,
    /// Skip classifier and emergency gate entirely when true.
    pub bypass_ml: bool,
    /// Confidence threshold above which the emergency detector triggers bypass.
    pub emergency_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            algorithm: Algorithm::Nlms,
            filter_length: 128,
            step_size: 0.5,
            intensity: 1.0,
            bypass_ml: false,
            emergency_threshold: 0.7,
        }
    }
}

impl SessionConfig {
    /// Validate the config per spec §3 / §6. Returns a reason string on failure.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(8_000..=48_000).contains(&self.sample_rate) {
            return Err(InvalidConfig::new(format!(
                "sample_rate must be 8000..=48000, got {}",
                self.sample_rate
            )));
        }
        if self.block_size == 0 || self.block_size > 2048 || !self.block_size.is_power_of_two() {
            return Err(InvalidConfig::new(format!(
                "block_size must be a power of two in 1..=2048, got {}",
                self.block_size
            )));
        }
        if self.filter_length == 0 || self.filter_length > 2048 {
            return Err(InvalidConfig::new(format!(
                "filter_length must be 1..=2048, got {}",
                self.filter_length
            )));
        }
        match self.algorithm {
            Algorithm::Lms | Algorithm::Nlms => {
                if !(self.step_size > 0.0 && self.step_size < 2.0) {
                    return Err(InvalidConfig::new(format!(
                        "step_size (µ) must be in (0, 2) for LMS/NLMS, got {}",
                        self.step_size
                    )));
                }
            }
            Algorithm::Rls => {
                if !(self.step_size > 0.0 && self.step_size <= 1.0) {
                    return Err(InvalidConfig::new(format!(
                        "step_size (λ) must be in (0, 1] for RLS, got {}",
                        self.step_size
                    )));
                }
            }
        }
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(InvalidConfig::new(format!(
                "intensity must be 0.0..=1.0, got {}",
                self.intensity
            )));
        }
        if !(0.0..=1.0).contains(&self.emergency_threshold) {
            return Err(InvalidConfig::new(format!(
                "emergency_threshold must be 0.0..=1.0, got {}",
                self.emergency_threshold
            )));
        }
        Ok(())
    }

    /// Fields that cannot change across a `reconfigure` call without reopening
    /// the session (spec §6: "sample_rate ... rejected at this call").
    pub fn compatible_with(&self, previous: &SessionConfig) -> bool {
        self.sample_rate == previous.sample_rate && self.block_size == previous.block_size
    }

    /// True if changing from `previous` to `self` can preserve filter
    /// coefficients rather than forcing a reset (spec §4.2).
    pub fn preserves_filter_state(&self, previous: &SessionConfig) -> bool {
        self.algorithm == previous.algorithm && self.filter_length == previous.filter_length
    }
}

/// Process-wide limits enforced by the `SessionManager` (spec §4.5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLimits {
    pub max_sessions: usize,
    pub input_queue_capacity: usize,
    pub output_queue_capacity: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            input_queue_capacity: 8,
            output_queue_capacity: 8,
        }
    }
}
