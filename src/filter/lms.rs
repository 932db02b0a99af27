use super::{fixup_coeff, TapLine};

/// Standard (unnormalized) LMS: `w ← w + µ·e·x`.
///
/// Stability requires `0 < µ < 2 / (L · Pₓ)` where `Pₓ` is the input power;
/// enforcing that bound is the caller's responsibility (spec §4.1).
#[derive(Debug, Clone)]
pub struct LmsFilter {
    weights: Vec<f32>,
    line: TapLine,
    mu: f32,
}

impl LmsFilter {
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

        // Same canonical tap order as the dot product above: weights[k]
        // pairs with the k-th logical tap, not the k-th physical slot.
        for (k, idx) in self.line.canonical_indices().enumerate() {
            let x = self.line.samples()[idx];
            self.weights[k] = fixup_coeff(self.weights[k] + self.mu * error * x);
        }

        self.line.advance();

        (anti_noise, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_step_size_never_adapts() {
        let mut f = LmsFilter::new(4, 0.0);
        for _ in 0..10 {
            f.process_sample(0.5, 1.0);
        }
        assert!(f.coefficients().iter().all(|&c| c == 0.0));
    }

    #[test]
    fn converges_towards_zero_error_on_constant_input() {
        let mut f = LmsFilter::new(1, 0.3);
        let mut last_err = f32::MAX;
        for _ in 0..200 {
            let (_, err) = f.process_sample(1.0, 1.0);
            last_err = err;
        }
        assert!(last_err.abs() < 1e-3, "error {} did not converge", last_err);
    }

    #[test]
    fn coefficients_stay_finite_on_large_inputs() {
        let mut f = LmsFilter::new(8, 1.0);
        for i in 0..1000 {
            f.process_sample(1.0e8 * (i as f32), 1.0e8);
        }
        assert!(f.coefficients().iter().all(|c| c.is_finite()));
        assert!(f.coefficients().iter().all(|c| c.abs() <= super::super::MAX_COEFF));
    }
}
