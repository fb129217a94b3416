//! Sample types shared by the capture and DSP stages

/// Type alias for conditioned audio samples.
///
/// `f32` is plenty of precision for a 128-sample hop at 12.8-16 kHz and keeps the
/// Goertzel/resonator state arrays small enough to fit the no-alloc-after-init budget.
pub type Sample = f32;

/// Per-hop scalars describing the raw and conditioned audio, per the DATA MODEL.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalQuality {
    pub dc_offset: f32,
    pub rms: f32,
    pub peak: f32,
    pub clip_count: u32,
    pub zero_count: u32,
    pub snr_est: f32,
    pub clipping: bool,
    pub mic_silent: bool,
    pub calibration_missing: bool,
}

impl Default for SignalQuality {
    fn default() -> Self {
        Self {
            dc_offset: 0.0,
            rms: 0.0,
            peak: 0.0,
            clip_count: 0,
            zero_count: 0,
            snr_est: 0.0,
            clipping: false,
            mic_silent: false,
            calibration_missing: true,
        }
    }
}
