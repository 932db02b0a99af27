use super::{fixup_coeff, TapLine, NLMS_EPSILON};

/// Normalized LMS: `w ← w + (µ / (ε + xᵀx)) · e · x`, `ε = 1e-6`.
///
/// This is the classical Haykin normalized-LMS recursion, matched exactly
/// (spec P5 treats this as a contractual bit-exactness point under the
/// canonical evaluation order defined by [`TapLine`]).
#[derive(Debug, Clone)]
pub struct NlmsFilter {
    weights: Vec<f32>,
    line: TapLine,
    mu: f32,
}

impl NlmsFilter {
    pub fn new(filter_length: usize, mu: f32) -> Self {
        Self {
            weights: vec![0.0; filter_length],
            line: TapLine::new(filter_length),
            mu,
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.weights
    }

    pub fn input_buffer(&self) -> &[f32] {
        self.line.samples()
    }

    pub fn reset(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 0.0);
        self.line.reset();
    }

    pub fn set_step_size(&mut self, mu: f32) {
        self.mu = mu;
    }

    pub fn process_sample(&mut self, reference: f32, desired: f32) -> (f32, f32) {
        self.line.push(reference);
        let anti_noise = self.line.dot(&self.weights);
        let error = desired - anti_noise;

        let mut xtx = self.line.energy();
        if !xtx.is_finite() {
            // "treat power as 1.0 (skip normalization)" — spec §4.1.
            xtx = 1.0;
        }
        let denom = NLMS_EPSILON + xtx;
        let scale = self.mu / denom;

        // Same canonical tap order as the dot product above: weights[k]
        // pairs with the k-th logical tap, not the k-th physical slot.
        for (k, idx) in self.line.canonical_indices().enumerate() {
            let x = self.line.samples()[idx];
            self.weights[k] = fixup_coeff(self.weights[k] + scale * error * x);
        }

        self.line.advance();

        (anti_noise, error)
    }
}
