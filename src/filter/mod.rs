//! Adaptive FIR filter primitives (spec §4.1).
//!
//! Three algorithms share one delay-line discipline and one numerical
//! stability policy; they are exposed through a single tagged enum,
//! [`Filter`], rather than dynamic dispatch, so the hot per-sample loop
//! branches on a known-size match instead of a vtable call (spec §9:
//! "prefer the tagged sum for branch predictability on the hot path").

mod lms;
mod nlms;
mod rls;

pub use lms::LmsFilter;
pub use nlms::NlmsFilter;
pub use rls::RlsFilter;

use crate::config::Algorithm;

/// Coefficients above this magnitude are clamped; non-finite ones are zeroed
/// (spec §4.1 numerical-stability policy, also referenced by P4).
pub const MAX_COEFF: f32 = 1.0e6;

/// Normalization epsilon used by NLMS (spec §4.1, contractual per P5).
pub const NLMS_EPSILON: f32 = 1.0e-6;

/// RLS re-symmetrizes `P` every this many samples, and skips the update when
/// the recursion denominator drops below `RLS_MIN_DENOM`.
pub const RLS_SYMMETRIZE_INTERVAL: u64 = 1024;
pub const RLS_MIN_DENOM: f32 = 1.0e-12;
const RLS_DEFAULT_DELTA: f32 = 1.0e-2;

/// Replace non-finite coefficients with zero, clamp the rest to `±MAX_COEFF`.
#[inline]
pub fn fixup_coeff(v: f32) -> f32 {
    if !v.is_finite() {
        0.0
    } else if v > MAX_COEFF {
        MAX_COEFF
    } else if v < -MAX_COEFF {
        -MAX_COEFF
    } else {
        v
    }
}

/// A circular delay line of the most recent `len` reference samples.
///
/// `push` writes the newest sample at `head`; the canonical traversal order
/// for dot products is `head, head-1, ..., head-L+1 (mod L)`, which P5
/// requires NLMS to honor exactly. `head` only advances via
/// [`TapLine::advance`], called after the prediction/dot-product step and
/// before the coefficient update, so both steps see the same `x` vector
/// (spec §4.1).
#[derive(Debug, Clone)]
pub struct TapLine {
    buffer: Vec<f32>,
    head: usize,
}

impl TapLine {
    pub fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            head: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.head = 0;
    }

    /// Write the new reference sample at `head` (zero-padded history is
    /// naturally handled: the buffer starts all-zero).
    pub fn push(&mut self, reference: f32) {
        let head = self.head;
        self.buffer[head] = reference;
    }

    /// Advance `head` to the next (oldest) slot, which becomes the write
    /// target for the following sample.
    pub fn advance(&mut self) {
        let len = self.buffer.len();
        self.head = (self.head + 1) % len;
    }

    /// Indices in canonical order: `head, head-1, ..., head-L+1 (mod L)`.
    pub fn canonical_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let len = self.buffer.len();
        let head = self.head;
        (0..len).map(move |k| (head + len - k) % len)
    }

    /// `wᵀx` computed in canonical order (required for P5 bit-exactness).
    ///
    /// `weights[k]` is the logical tap `k` (0 = most recent sample); it is
    /// paired with `self.buffer[idx]` where `idx` is the `k`-th canonical
    /// physical slot, never with `self.buffer[k]` directly — the physical
    /// slot holding tap `k` rotates every `advance()`, so indexing `weights`
    /// by the physical slot would silently rebind each coefficient to a
    /// different delay on every sample.
    pub fn dot(&self, weights: &[f32]) -> f32 {
        let mut acc = 0.0f32;
        for (k, idx) in self.canonical_indices().enumerate() {
            acc += weights[k] * self.buffer[idx];
        }
        acc
    }

    /// Write the delay line into `out` in canonical (logical-tap) order:
    /// `out[k]` is the sample that belongs with `weights[k]`. Used wherever
    /// a filter needs the whole tap vector rather than a running dot
    /// product (e.g. RLS's `P`-matrix recursion); callers keep `out` as a
    /// reusable scratch buffer to avoid a per-sample allocation.
    pub fn copy_canonical_into(&self, out: &mut [f32]) {
        for (k, idx) in self.canonical_indices().enumerate() {
            out[k] = self.buffer[idx];
        }
    }

    /// `xᵀx` computed in canonical order.
    pub fn energy(&self) -> f32 {
        let mut acc = 0.0f32;
        for idx in self.canonical_indices() {
            acc += self.buffer[idx] * self.buffer[idx];
        }
        acc
    }
}

/// One of the three adaptive-filter variants (spec §4.1).
#[derive(Debug, Clone)]
pub enum Filter {
    Lms(LmsFilter),
    Nlms(NlmsFilter),
    Rls(RlsFilter),
}

impl Filter {
    /// Construct a filter of the given algorithm. `filter_length` must be
    /// `>= 1` (validated by `SessionConfig::validate` before this is called).
    pub fn new(algorithm: Algorithm, filter_length: usize, step_size: f32) -> Self {
        debug_assert!(filter_length >= 1, "filter_length must be >= 1");
        match algorithm {
            Algorithm::Lms => Filter::Lms(LmsFilter::new(filter_length, step_size)),
            Algorithm::Nlms => Filter::Nlms(NlmsFilter::new(filter_length, step_size)),
            Algorithm::Rls => Filter::Rls(RlsFilter::new(filter_length, step_size, RLS_DEFAULT_DELTA)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Filter::Lms(_) => Algorithm::Lms,
            Filter::Nlms(_) => Algorithm::Nlms,
            Filter::Rls(_) => Algorithm::Rls,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Filter::Lms(f) => f.len(),
            Filter::Nlms(f) => f.len(),
            Filter::Rls(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Process one (reference, desired) sample pair. Returns `(anti_noise, error)`.
    pub fn process_sample(&mut self, reference: f32, desired: f32) -> (f32, f32) {
        match self {
            Filter::Lms(f) => f.process_sample(reference, desired),
            Filter::Nlms(f) => f.process_sample(reference, desired),
            Filter::Rls(f) => f.process_sample(reference, desired),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Filter::Lms(f) => f.reset(),
            Filter::Nlms(f) => f.reset(),
            Filter::Rls(f) => f.reset(),
        }
    }

    pub fn coefficients(&self) -> &[f32] {
        match self {
            Filter::Lms(f) => f.coefficients(),
            Filter::Nlms(f) => f.coefficients(),
            Filter::Rls(f) => f.coefficients(),
        }
    }

    pub fn input_buffer(&self) -> &[f32] {
        match self {
            Filter::Lms(f) => f.input_buffer(),
            Filter::Nlms(f) => f.input_buffer(),
            Filter::Rls(f) => f.input_buffer(),
        }
    }

    /// Update the adaptation rate (`µ` for LMS/NLMS, `λ` for RLS) in place,
    /// without resetting coefficients. Used by `FilterState::install_pending_config`
    /// when only `step_size` changed (spec §4.2).
    pub fn set_step_size(&mut self, step_size: f32) {
        match self {
            Filter::Lms(f) => f.set_step_size(step_size),
            Filter::Nlms(f) => f.set_step_size(step_size),
            Filter::Rls(f) => f.set_forgetting_factor(step_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixup_zeroes_non_finite() {
        assert_eq!(fixup_coeff(f32::NAN), 0.0);
        assert_eq!(fixup_coeff(f32::INFINITY), 0.0);
        assert_eq!(fixup_coeff(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn fixup_clamps_magnitude() {
        assert_eq!(fixup_coeff(2.0e6), MAX_COEFF);
        assert_eq!(fixup_coeff(-2.0e6), -MAX_COEFF);
        assert_eq!(fixup_coeff(0.5), 0.5);
    }

    #[test]
    fn tap_line_canonical_order_starts_at_head() {
        let mut line = TapLine::new(4);
        for x in [1.0, 2.0, 3.0, 4.0] {
            line.push(x);
            line.advance();
        }
        // after 4 pushes+advances the most recent sample (4.0) sits at head-1,
        // and head has wrapped back to slot 0 (the first write).
        let order: Vec<usize> = line.canonical_indices().collect();
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn filter_length_one_zero_step_is_identity() {
        let mut f = Filter::new(Algorithm::Lms, 1, 0.0);
        let (anti, err) = f.process_sample(0.3, 0.3);
        assert_eq!(anti, 0.0);
        assert_eq!(err, 0.3);
    }

    #[test]
    fn reset_zeroes_state() {
        let mut f = Filter::new(Algorithm::Nlms, 8, 0.5);
        for i in 0..50 {
            f.process_sample((i as f32 * 0.01).sin(), (i as f32 * 0.01).sin());
        }
        f.reset();
        assert!(f.coefficients().iter().all(|&c| c == 0.0));
        assert!(f.input_buffer().iter().all(|&c| c == 0.0));
    }
}
