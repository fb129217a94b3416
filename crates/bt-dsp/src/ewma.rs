//! Single-pole exponential smoothing used by auto-ranging, novelty normalization,
//! and resonator magnitude smoothing.
//!
//! Single-writer, no atomics: every consumer of this type lives entirely on the
//! audio thread and is driven once per hop.

/// Exponentially-weighted moving average with a fixed per-hop coefficient.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ewma {
    value: f32,
    alpha: f32,
    initialized: bool,
}

impl Ewma {
    /// `alpha` is the per-hop update weight in `(0, 1]`; see [`Ewma::from_time_constant`]
    /// to derive it from a desired settling time instead of guessing a raw weight.
    pub fn new(alpha: f32) -> Self {
        Self {
            value: 0.0,
            alpha: alpha.clamp(1.0e-6, 1.0),
            initialized: false,
        }
    }

    /// Derive `alpha` from a time constant `tau_s` and the hop period, per §4.3/§4.4's
    /// "EWMA with tau ~= 1s" style constants.
    pub fn from_time_constant(tau_s: f32, hop_period_s: f32) -> Self {
        let alpha = if tau_s <= 0.0 {
            1.0
        } else {
            1.0 - (-hop_period_s / tau_s).exp()
        };
        Self::new(alpha)
    }

    #[inline]
    pub fn update(&mut self, sample: f32) -> f32 {
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value += self.alpha * (sample - self.value);
        }
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self, value: f32) {
        self.value = value;
        self.initialized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_constant_input() {
        let mut ewma = Ewma::new(0.1);
        for _ in 0..500 {
            ewma.update(1.0);
        }
        assert!((ewma.value() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn first_sample_is_immediate() {
        let mut ewma = Ewma::new(0.01);
        assert_eq!(ewma.update(5.0), 5.0);
    }

    #[test]
    fn time_constant_matches_63_percent_rule() {
        let hop = 0.01;
        let tau = 1.0;
        let mut ewma = Ewma::from_time_constant(tau, hop);
        let steps = (tau / hop) as usize;
        for _ in 0..steps {
            ewma.update(1.0);
        }
        // After one time constant, an RC step response reaches ~63%.
        assert!((ewma.value() - 0.63).abs() < 0.05);
    }
}
