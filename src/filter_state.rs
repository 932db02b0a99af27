//! Per-session filter-state store and the control-path handoff (spec §4.2).

use std::sync::Mutex;

use crate::config::SessionConfig;
use crate::filter::Filter;

/// Single-slot mailbox used by the control path to hand a new `SessionConfig`
/// to the worker. A write overwrites any unread config (exclusive ownership
/// transfer); the worker only drains it between blocks, never mid-block, so
/// the filter is never observed under a torn config (spec §4.2).
#[derive(Default)]
pub struct ConfigMailbox {
    slot: Mutex<Option<SessionConfig>>,
}

impl ConfigMailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn post(&self, config: SessionConfig) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(config);
    }

    pub fn take(&self) -> Option<SessionConfig> {
        let mut slot = self.slot.lock().unwrap();
        slot.take()
    }
}

/// Owns the active filter instance for one session. Exclusively accessed by
/// the session's worker thread; only `process_block` and
/// `install_pending_config` are called, both from that one thread.
pub struct FilterState {
    filter: Filter,
    config: SessionConfig,
}

impl FilterState {
    pub fn new(config: SessionConfig) -> Self {
        let filter = Filter::new(config.algorithm, config.filter_length, config.step_size);
        Self { filter, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Run the filter sample-by-sample over a reference/desired pair and mix
    /// the anti-noise estimate into the output at the configured intensity,
    /// clamped to `[-1.0, 1.0]` (spec §4.4 step 5).
    pub fn process_block(&mut self, reference: &[f32], desired: &[f32]) -> Vec<f32> {
        debug_assert_eq!(reference.len(), desired.len());
        let intensity = self.config.intensity;
        reference
            .iter()
            .zip(desired.iter())
            .map(|(&r, &d)| {
                let (anti_noise, _error) = self.filter.process_sample(r, d);
                (d - intensity * anti_noise).clamp(-1.0, 1.0)
            })
            .collect()
    }

    /// Swap in a pending config at a block boundary. Preserves coefficients
    /// when algorithm and filter_length are unchanged; resets otherwise
    /// (spec §4.2).
    pub fn install_pending_config(&mut self, mailbox: &ConfigMailbox) {
        let Some(new_config) = mailbox.take() else {
            return;
        };

        if new_config.preserves_filter_state(&self.config) {
            self.filter.set_step_size(new_config.step_size);
        } else {
            self.filter = Filter::new(
                new_config.algorithm,
                new_config.filter_length,
                new_config.step_size,
            );
        }
        self.config = new_config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Algorithm;

    #[test]
    fn mailbox_overwrite_drops_previous_unread_value() {
        let mailbox = ConfigMailbox::new();
        let mut a = SessionConfig::default();
        a.intensity = 0.1;
        let mut b = SessionConfig::default();
        b.intensity = 0.9;
        mailbox.post(a);
        mailbox.post(b.clone());
        assert_eq!(mailbox.take(), Some(b));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn intensity_zero_passes_reference_through_unchanged_when_filter_is_silent() {
        let mut cfg = SessionConfig::default();
        cfg.intensity = 0.0;
        cfg.filter_length = 1;
        cfg.algorithm = Algorithm::Lms;
        cfg.step_size = 0.0;
        let mut state = FilterState::new(cfg);
        let input = vec![0.1, -0.2, 0.3, -0.4];
        let out = state.process_block(&input, &input);
        assert_eq!(out, input);
    }

    #[test]
    fn reconfigure_preserving_algorithm_keeps_coefficients() {
        let mut cfg = SessionConfig::default();
        cfg.algorithm = Algorithm::Nlms;
        cfg.filter_length = 16;
        let mut state = FilterState::new(cfg.clone());
        let tone: Vec<f32> = (0..200)
            .map(|n| (2.0 * std::f32::consts::PI * 440.0 * n as f32 / 16_000.0).sin())
            .collect();
        state.process_block(&tone, &tone);
        let before = state.filter().coefficients().to_vec();

        let mailbox = ConfigMailbox::new();
        let mut new_cfg = cfg.clone();
        new_cfg.intensity = 0.5;
        mailbox.post(new_cfg);
        state.install_pending_config(&mailbox);

        assert_eq!(state.filter().coefficients(), before.as_slice());
        assert_eq!(state.config().intensity, 0.5);
    }

    #[test]
    fn reconfigure_changing_filter_length_resets() {
        let cfg = SessionConfig::default();
        let mut state = FilterState::new(cfg.clone());
        state.process_block(&[0.1, 0.2, 0.3], &[0.1, 0.2, 0.3]);

        let mailbox = ConfigMailbox::new();
        let mut new_cfg = cfg;
        new_cfg.filter_length = 256;
        mailbox.post(new_cfg);
        state.install_pending_config(&mailbox);

        assert!(state.filter().coefficients().iter().all(|&c| c == 0.0));
        assert_eq!(state.filter().len(), 256);
    }
}
