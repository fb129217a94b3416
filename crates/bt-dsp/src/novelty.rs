//! NoveltyDetector (§4.4): positive spectral-flux novelty curve with
//! silence-adaptive gating and z-score normalization.

use bt_core::NoveltyConfig;

use crate::ewma::Ewma;
use crate::goertzel::SpectralFrame;

/// Circular buffer of the last `H_nov` novelty samples.
#[derive(Clone)]
pub struct NoveltyCurve {
    buf: Vec<f32>,
    head: usize,
    filled: usize,
}

impl NoveltyCurve {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len],
            head: 0,
            filled: 0,
        }
    }

    fn push(&mut self, value: f32) {
        let n = self.buf.len();
        self.buf[self.head] = value;
        self.head = (self.head + 1) % n;
        self.filled = (self.filled + 1).min(n);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Oldest-to-newest snapshot of the last `count` samples (`count <= len()`).
    pub fn recent(&self, count: usize, out: &mut [f32]) {
        debug_assert!(count <= self.buf.len());
        debug_assert_eq!(out.len(), count);
        let n = self.buf.len();
        for i in 0..count {
            let idx = (self.head + n - count + i) % n;
            out[i] = self.buf[idx];
        }
    }

    pub fn latest(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        let n = self.buf.len();
        self.buf[(self.head + n - 1) % n]
    }
}

pub struct NoveltyDetector {
    prev_magnitudes: Vec<f32>,
    curve: NoveltyCurve,
    silence_window: Vec<f32>,
    silence_cursor: usize,
    silence_window_len: usize,
    silence_epsilon: f32,
    silence_decay: f32,
    mean: Ewma,
    variance: Ewma,
    z_clamp: f32,
}

impl NoveltyDetector {
    pub fn new(config: &NoveltyConfig, bin_count: usize, hop_period_s: f32) -> Self {
        let silence_window_len = ((config.silence_window_s / hop_period_s).ceil() as usize).max(1);
        Self {
            prev_magnitudes: vec![0.0; bin_count],
            curve: NoveltyCurve::new(config.history_len.max(1)),
            silence_window: vec![0.0; silence_window_len],
            silence_cursor: 0,
            silence_window_len,
            silence_epsilon: config.silence_epsilon,
            silence_decay: config.silence_decay,
            mean: Ewma::from_time_constant(config.ewma_tau_mu_s, hop_period_s),
            variance: Ewma::from_time_constant(config.ewma_tau_sigma_s, hop_period_s),
            z_clamp: config.z_clamp,
        }
    }

    pub fn curve(&self) -> &NoveltyCurve {
        &self.curve
    }

    /// Process one hop's spectrum; returns `(novelty_raw, novelty_z)`.
    pub fn process(&mut self, frame: &SpectralFrame) -> (f32, f32) {
        let mut flux = 0.0f32;
        for (cur, prev) in frame.magnitudes.iter().zip(self.prev_magnitudes.iter()) {
            flux += (cur - prev).max(0.0);
        }
        self.prev_magnitudes.copy_from_slice(&frame.magnitudes);

        let mut novelty = (1.0 + flux).ln();

        self.silence_window[self.silence_cursor] = novelty;
        self.silence_cursor = (self.silence_cursor + 1) % self.silence_window_len;
        let min = self
            .silence_window
            .iter()
            .cloned()
            .fold(f32::INFINITY, f32::min);
        let max = self
            .silence_window
            .iter()
            .cloned()
            .fold(f32::NEG_INFINITY, f32::max);
        let is_silent = (max - min) < self.silence_epsilon;
        if is_silent {
            novelty *= self.silence_decay;
        }

        self.curve.push(novelty);

        let mean = self.mean.update(novelty);
        let variance = self
            .variance
            .update((novelty - mean) * (novelty - mean))
            .max(0.0);
        let sigma = variance.sqrt().max(1.0e-6);
        let z = ((novelty - mean) / sigma).clamp(-self.z_clamp, self.z_clamp);

        (novelty, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(mags: &[f32]) -> SpectralFrame {
        SpectralFrame {
            magnitudes: mags.to_vec(),
        }
    }

    #[test]
    fn increasing_magnitude_produces_positive_novelty() {
        let mut det = NoveltyDetector::new(&NoveltyConfig::default(), 4, 0.01);
        det.process(&frame(&[0.1, 0.1, 0.1, 0.1]));
        let (nov, _) = det.process(&frame(&[0.5, 0.5, 0.1, 0.1]));
        assert!(nov > 0.0);
    }

    #[test]
    fn decreasing_magnitude_produces_zero_flux() {
        let mut det = NoveltyDetector::new(&NoveltyConfig::default(), 4, 0.01);
        det.process(&frame(&[0.5, 0.5, 0.5, 0.5]));
        let (nov, _) = det.process(&frame(&[0.1, 0.1, 0.1, 0.1]));
        assert!((nov - 0.0).abs() < 1e-6);
    }

    #[test]
    fn silence_decays_toward_zero() {
        let mut det = NoveltyDetector::new(
            &NoveltyConfig {
                silence_window_s: 0.05,
                ..NoveltyConfig::default()
            },
            4,
            0.01,
        );
        let mut last = 1.0;
        for _ in 0..200 {
            let (nov, _) = det.process(&frame(&[0.2, 0.2, 0.2, 0.2]));
            last = nov;
        }
        assert!(last.abs() < 0.05);
    }

    #[test]
    fn z_score_is_clamped() {
        let mut det = NoveltyDetector::new(&NoveltyConfig::default(), 4, 0.01);
        // warm up with stable novelty
        for _ in 0..100 {
            det.process(&frame(&[0.1, 0.1, 0.1, 0.1]));
        }
        let (_, z) = det.process(&frame(&[10.0, 10.0, 10.0, 10.0]));
        assert!(z <= 4.0 && z >= -4.0);
    }
}
