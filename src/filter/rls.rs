use super::{fixup_coeff, TapLine, RLS_MIN_DENOM, RLS_SYMMETRIZE_INTERVAL};

/// Recursive Least Squares: maintains the inverse correlation matrix `P`
/// (`L x L`, row-major) and updates it and the weight vector every sample
/// (spec §4.1).
#[derive(Debug, Clone)]
pub struct RlsFilter {
    weights: Vec<f32>,
    line: TapLine,
    p: Vec<f32>,
    lambda: f32,
    delta: f32,
    samples_seen: u64,
    // Reusable per-sample scratch, sized once in `new` so the hot loop in
    // `process_sample` never allocates.
    x_scratch: Vec<f32>,
    px_scratch: Vec<f32>,
    k_scratch: Vec<f32>,
}

impl RlsFilter {
    pub fn new(filter_length: usize, lambda: f32, delta: f32) -> Self {
        let mut filter = Self {
            weights: vec![0.0; filter_length],
            line: TapLine::new(filter_length),
            p: vec![0.0; filter_length * filter_length],
            lambda,
            delta,
            samples_seen: 0,
            x_scratch: vec![0.0; filter_length],
            px_scratch: vec![0.0; filter_length],
            k_scratch: vec![0.0; filter_length],
        };
        filter.init_p();
        filter
    }

    fn init_p(&mut self) {
        let l = self.weights.len();
        self.p.iter_mut().for_each(|v| *v = 0.0);
        let diag = 1.0 / self.delta;
        for i in 0..l {
            self.p[i * l + i] = diag;
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
        self.samples_seen = 0;
        self.init_p();
    }

    pub fn set_forgetting_factor(&mut self, lambda: f32) {
        self.lambda = lambda;
    }

    pub fn process_sample(&mut self, reference: f32, desired: f32) -> (f32, f32) {
        let l = self.weights.len();
        self.line.push(reference);
        // `x[k]` is the logical tap `k` (canonical order), matching
        // `weights[k]` and `p`'s row/column indexing — never the raw
        // physical ring slot, which rotates every `advance()`.
        self.line.copy_canonical_into(&mut self.x_scratch);
        let x = &self.x_scratch;

        let anti_noise: f32 = self
            .weights
            .iter()
            .zip(x.iter())
            .map(|(w, xi)| w * xi)
            .sum();
        let error = desired - anti_noise;

        // Px = P * x
        for i in 0..l {
            let row = &self.p[i * l..(i + 1) * l];
            self.px_scratch[i] = row.iter().zip(x.iter()).map(|(p, xi)| p * xi).sum();
        }
        let px = &self.px_scratch;
        let xtpx: f32 = x.iter().zip(px.iter()).map(|(xi, pxi)| xi * pxi).sum();
        let denom = self.lambda + xtpx;

        if denom.abs() < RLS_MIN_DENOM {
            self.line.advance();
            return (anti_noise, error);
        }

        for (ki, pxi) in self.k_scratch.iter_mut().zip(px.iter()) {
            *ki = pxi / denom;
        }
        let k = &self.k_scratch;

        for (w, ki) in self.weights.iter_mut().zip(k.iter()) {
            *w = fixup_coeff(*w + ki * error);
        }

        for i in 0..l {
            for j in 0..l {
                let idx = i * l + j;
                self.p[idx] = (self.p[idx] - k[i] * px[j]) / self.lambda;
            }
        }

        self.samples_seen += 1;
        if self.samples_seen % RLS_SYMMETRIZE_INTERVAL == 0 {
            self.symmetrize();
        }

        self.line.advance();
        (anti_noise, error)
    }

    fn symmetrize(&mut self) {
        let l = self.weights.len();
        for i in 0..l {
            for j in (i + 1)..l {
                let a = self.p[i * l + j];
                let b = self.p[j * l + i];
                let avg = (a + b) / 2.0;
                self.p[i * l + j] = avg;
                self.p[j * l + i] = avg;
            }
        }
    }
}
