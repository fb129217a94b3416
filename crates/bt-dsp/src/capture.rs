//! CaptureConditioner (§4.1): raw hardware samples -> conditioned floats +
//! per-hop signal quality.

use bt_core::{BtError, BtResult, CaptureConfig, Sample, SignalQuality};

use crate::ewma::Ewma;

/// Converts raw microphone samples into conditioned floats and tracks signal
/// quality. Single writer; owned by the audio thread.
pub struct CaptureConditioner {
    config: CaptureConfig,
    dc_bias: f32,
    calibrated: bool,
    consecutive_silent_hops: u32,
    noise_floor: Ewma,
    peak_tracker: Ewma,
    conditioned: Vec<Sample>,
    was_mic_silent: bool,
    was_clipping: bool,
}

impl CaptureConditioner {
    pub fn new(config: CaptureConfig) -> Self {
        let dc_bias = config.preset_dc_bias.unwrap_or(config.default_dc_bias);
        let calibrated = config.preset_dc_bias.is_some();
        if !calibrated {
            log::warn!("DC calibration was never run; using default bias {dc_bias}");
        }
        Self {
            conditioned: vec![0.0; config.hop_size],
            noise_floor: Ewma::new(0.02),
            peak_tracker: Ewma::new(0.1),
            config,
            dc_bias,
            calibrated,
            consecutive_silent_hops: 0,
            was_mic_silent: false,
            was_clipping: false,
        }
    }

    /// Ingest one hop of raw signed samples. Returns the conditioned hop (a
    /// borrowed, reused buffer — no per-hop allocation) and the updated
    /// signal-quality record.
    pub fn ingest(&mut self, raw: &[i32]) -> BtResult<(&[Sample], SignalQuality)> {
        if raw.len() != self.config.hop_size {
            return Err(BtError::ShortHop {
                expected: self.config.hop_size,
                got: raw.len(),
            });
        }

        let mut quality = SignalQuality {
            calibration_missing: !self.calibrated,
            ..SignalQuality::default()
        };

        let mut sum: i64 = 0;
        let mut sum_sq: f64 = 0.0;
        let mut peak: f32 = 0.0;
        let clip_abs = self.config.clip_threshold.unsigned_abs() as i32;

        for (i, &raw_sample) in raw.iter().enumerate() {
            sum += raw_sample as i64;
            if raw_sample.unsigned_abs() as i32 >= clip_abs {
                quality.clip_count += 1;
            }
            if raw_sample == 0 {
                quality.zero_count += 1;
            }

            // (1) drop unused LSBs, (2) subtract calibrated bias, (3) clip to
            // hardware range, (4) subtract residual DC, (5) scale + fixed gain.
            let shifted = (raw_sample >> self.config.bit_shift) as f32;
            let debiased = shifted - self.dc_bias;
            let clipped = debiased.clamp(
                -(self.config.clip_threshold as f32),
                self.config.clip_threshold as f32,
            );
            let corrected = clipped - self.config.residual_dc;
            let scaled = (corrected / self.config.clip_threshold as f32) * self.config.gain;

            self.conditioned[i] = scaled;
            sum_sq += (scaled as f64) * (scaled as f64);
            peak = peak.max(scaled.abs());
        }

        quality.dc_offset = sum as f32 / raw.len() as f32;
        quality.rms = ((sum_sq / raw.len() as f64) as f32).sqrt();
        quality.peak = peak;
        quality.clipping = quality.clip_count >= self.config.clip_warn_count;

        let noise_floor = self
            .noise_floor
            .update(quality.rms.max(1.0e-6));
        let recent_peak = self.peak_tracker.update(quality.peak.max(1.0e-6));
        quality.snr_est = 20.0 * (recent_peak / noise_floor.max(1.0e-6)).max(1.0e-6).log10();

        if quality.zero_count == raw.len() as u32 {
            self.consecutive_silent_hops = self.consecutive_silent_hops.saturating_add(1);
        } else {
            self.consecutive_silent_hops = 0;
        }
        quality.mic_silent = self.consecutive_silent_hops >= self.config.mic_silent_hop_count;
        if quality.mic_silent && !self.was_mic_silent {
            log::warn!(
                "microphone silent for {} consecutive hops",
                self.consecutive_silent_hops
            );
        }
        self.was_mic_silent = quality.mic_silent;

        if quality.clipping && !self.was_clipping {
            log::warn!("clip count {} exceeded warning threshold", quality.clip_count);
        }
        self.was_clipping = quality.clipping;

        Ok((&self.conditioned, quality))
    }

    /// Measure the mean of a silence interval and store it as the bias for
    /// subsequent hops. Calling this twice on the same silence input produces
    /// the same bias up to floating-point tolerance.
    pub fn calibrate_dc(&mut self, silence_hops: &[&[i32]]) -> f32 {
        let mut sum: i64 = 0;
        let mut count: i64 = 0;
        for hop in silence_hops {
            for &s in *hop {
                sum += s as i64;
                count += 1;
            }
        }
        let bias = if count == 0 {
            self.config.default_dc_bias
        } else {
            sum as f32 / count as f32
        };
        self.dc_bias = bias;
        self.calibrated = true;
        bias
    }

    pub fn dc_bias(&self) -> f32 {
        self.dc_bias
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }
}
