//! Explicit, typed configuration for the beat tracker core.
//!
//! Every tunable named in the component design and the "expose as named constants"
//! design note lives here as a field with a sane default, instead of a
//! string-keyed lookup or scattered literals.

/// Top-level tracker configuration. Validated once at `BeatTrackerCore::new`;
/// immutable for the life of the core.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub capture: CaptureConfig,
    pub goertzel: GoertzelConfig,
    pub novelty: NoveltyConfig,
    pub resonator: ResonatorConfig,
    pub tactus: TactusConfig,
    pub beat_clock: BeatClockConfig,
    pub diagnostics_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            goertzel: GoertzelConfig::default(),
            novelty: NoveltyConfig::default(),
            resonator: ResonatorConfig::default(),
            tactus: TactusConfig::default(),
            beat_clock: BeatClockConfig::default(),
            diagnostics_capacity: 64,
        }
    }
}

impl TrackerConfig {
    /// Validate cross-field invariants the rest of the pipeline assumes.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.capture.hop_size == 0 {
            return Err("hop_size must be non-zero");
        }
        if self.goertzel.ring_window_size % self.capture.hop_size != 0 {
            return Err("ring_window_size must be a multiple of hop_size");
        }
        if self.resonator.bpm_min >= self.resonator.bpm_max {
            return Err("resonator bpm_min must be < bpm_max");
        }
        if self.goertzel.bin_count == 0 || self.resonator.bin_count == 0 {
            return Err("bin counts must be non-zero");
        }
        Ok(())
    }
}

/// CaptureConditioner tunables (§4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub sample_rate_hz: f32,
    pub hop_size: usize,
    pub bit_shift: u32,
    pub default_dc_bias: f32,
    pub residual_dc: f32,
    pub gain: f32,
    pub clip_threshold: i32,
    pub clip_warn_count: u32,
    pub mic_silent_hop_count: u32,
    /// Pre-measured DC bias carried over from a prior `calibrate_dc()` run, if any.
    pub preset_dc_bias: Option<f32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 12_800.0,
            hop_size: 128,
            bit_shift: 0,
            default_dc_bias: 7_000.0,
            residual_dc: 360.0,
            gain: 4.0,
            clip_threshold: 32_000,
            clip_warn_count: 8,
            mic_silent_hop_count: 5,
            preset_dc_bias: None,
        }
    }
}

/// GoertzelBank + RingWindow tunables (§4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoertzelConfig {
    pub ring_window_size: usize,
    pub bin_count: usize,
    pub band_low_hz: f32,
    pub band_high_hz: f32,
    pub autorange_floor: f32,
    pub autorange_tau_s: f32,
    pub perceptual_shaping: bool,
}

impl Default for GoertzelConfig {
    fn default() -> Self {
        Self {
            ring_window_size: 512,
            bin_count: 64,
            band_low_hz: 55.0,
            band_high_hz: 2_093.0,
            autorange_floor: 0.01,
            autorange_tau_s: 1.0,
            perceptual_shaping: true,
        }
    }
}

/// NoveltyDetector tunables (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoveltyConfig {
    pub history_len: usize,
    pub silence_window_s: f32,
    pub silence_epsilon: f32,
    pub silence_decay: f32,
    pub ewma_tau_mu_s: f32,
    pub ewma_tau_sigma_s: f32,
    pub z_clamp: f32,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            history_len: 512,
            silence_window_s: 2.5,
            silence_epsilon: 1.0e-4,
            silence_decay: 0.9,
            ewma_tau_mu_s: 2.0,
            ewma_tau_sigma_s: 2.0,
            z_clamp: 4.0,
        }
    }
}

/// TempoResonatorBank tunables (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResonatorConfig {
    pub bin_count: usize,
    pub bpm_min: f32,
    pub bpm_max: f32,
    pub smoothing_alpha: f32,
    pub phase_beat_shift: f32,
    pub top_k: usize,
    pub bins_per_hop: usize,
}

impl Default for ResonatorConfig {
    fn default() -> Self {
        Self {
            bin_count: 96,
            bpm_min: 48.0,
            bpm_max: 180.0,
            smoothing_alpha: 0.9,
            phase_beat_shift: 0.12,
            top_k: 12,
            bins_per_hop: 4,
        }
    }
}

/// TactusResolver tunables (§4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TactusConfig {
    pub prior_center_bpm: f32,
    pub prior_sigma_bpm: f32,
    pub w_octave: f32,
    pub w_density: f32,
    pub stability_bonus: f32,
    pub stability_window_bpm: f32,
    pub min_score: f32,
    pub min_confidence: f32,
    pub consensus_group_bpm: f32,
    pub consensus_runner_bpm: f32,
    pub density_decay: f32,
    pub density_kde_width_bpm: f32,
    pub octave_override_ratio: f32,
    pub octave_prior_advantage: f32,
    pub pending_verify_ms: u32,
    pub pending_switch_hops: u32,
    pub pending_switch_ratio: f32,
    pub pending_switch_delta_bpm: f32,
    pub verified_track_low_pass: f32,
    pub verified_switch_hops: u32,
    pub verified_switch_ratio: f32,
    pub stall_timeout_s: f32,
}

impl Default for TactusConfig {
    fn default() -> Self {
        Self {
            prior_center_bpm: 120.0,
            prior_sigma_bpm: 40.0,
            w_octave: 0.4,
            w_density: 0.8,
            stability_bonus: 0.12,
            stability_window_bpm: 2.0,
            min_score: 0.2,
            min_confidence: 0.15,
            consensus_group_bpm: 3.0,
            consensus_runner_bpm: 6.0,
            density_decay: 0.97,
            density_kde_width_bpm: 3.0,
            octave_override_ratio: 0.3,
            octave_prior_advantage: 2.0,
            pending_verify_ms: 2_500,
            pending_switch_hops: 15,
            pending_switch_ratio: 1.10,
            pending_switch_delta_bpm: 5.0,
            verified_track_low_pass: 0.01,
            verified_switch_hops: 8,
            verified_switch_ratio: 1.15,
            stall_timeout_s: 3.0,
        }
    }
}

/// BeatClock PLL tunables (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatClockConfig {
    pub renderer_hz: f32,
    pub big_change_bpm: f32,
    pub k_p: f32,
    pub k_f: f32,
    pub phase_correction_clamp: f32,
    pub freq_error_ema_alpha: f32,
    pub freq_correction_clamp_bpm: f32,
    pub tick_debounce_ratio: f32,
    pub bar_length_beats: u32,
}

impl Default for BeatClockConfig {
    fn default() -> Self {
        Self {
            renderer_hz: 120.0,
            big_change_bpm: 5.0,
            k_p: 0.08,
            k_f: 0.002,
            phase_correction_clamp: 0.15,
            freq_error_ema_alpha: 0.9,
            freq_correction_clamp_bpm: 2.0,
            tick_debounce_ratio: 0.6,
            bar_length_beats: 4,
        }
    }
}
