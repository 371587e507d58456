/// Running-peak limiter
///
/// Divides each sample by a threshold that jumps up to any new peak and
/// relaxes back toward 1.0 by a fixed step per sample. Output is always in
/// [-1.0, 1.0]; quiet mixes pass through unscaled once the threshold has
/// relaxed.
#[derive(Debug, Clone, Copy)]
pub struct PeakLimiter {
    threshold: f64,
    release: f64,
}

impl Default for PeakLimiter {
    fn default() -> Self {
        Self::new(0.0001)
    }
}

impl PeakLimiter {
    pub fn new(release_per_sample: f64) -> Self {
        Self {
            threshold: 1.0,
            release: release_per_sample.abs(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn process(&mut self, x: f64) -> f64 {
        if !x.is_finite() {
            return 0.0;
        }

        if self.threshold > 1.0 {
            self.threshold = (self.threshold - self.release).max(1.0);
        }

        let peak = x.abs();
        if peak > self.threshold {
            self.threshold = peak;
        }

        x / self.threshold
    }
}
