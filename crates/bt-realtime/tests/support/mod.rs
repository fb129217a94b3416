//! Synthetic hop generators for the end-to-end scenario tests. No audio
//! device or network access; everything is generated in-process.

use std::f32::consts::PI;

use bt_core::CaptureConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `n` hops of raw all-zero samples (true digital silence, per spec §8's
/// "feed 10 s of zeros" seed test).
pub fn silence_hops(n: usize, hop_size: usize) -> Vec<Vec<i32>> {
    (0..n).map(|_| vec![0i32; hop_size]).collect()
}

/// A click/pulse train: a short burst of `tone_hz` centered on `dc_bias`,
/// repeated every `60/bpm` seconds, with a `duration_s`-long tail of hops.
/// A small fixed-seed dither noise floor rides under the whole signal so the
/// bursts sit in something closer to a real mic's idle noise than dead
/// silence between clicks.
pub fn pulse_train_hops(
    bpm: f32,
    duration_s: f32,
    config: &CaptureConfig,
    tone_hz: f32,
    burst_ms: f32,
    amplitude: f32,
) -> Vec<Vec<i32>> {
    let sr = config.sample_rate_hz;
    let hop_size = config.hop_size;
    let total_samples = (duration_s * sr) as usize;
    let beat_period_samples = (60.0 / bpm * sr) as usize;
    let burst_samples = ((burst_ms / 1000.0) * sr) as usize;

    let mut rng = StdRng::seed_from_u64(0xB3A7_0000 ^ bpm.to_bits() as u64);
    let noise_floor = amplitude * 0.01;
    let mut raw: Vec<i32> = (0..total_samples)
        .map(|_| (config.default_dc_bias + rng.random_range(-noise_floor..=noise_floor)).round() as i32)
        .collect();

    let mut next_burst_start = 0usize;
    while next_burst_start < total_samples {
        for i in 0..burst_samples {
            let idx = next_burst_start + i;
            if idx >= total_samples {
                break;
            }
            let phase = 2.0 * PI * tone_hz * (i as f32) / sr;
            let envelope = 1.0 - (i as f32 / burst_samples as f32);
            let dither = rng.random_range(-noise_floor..=noise_floor);
            let sample = config.default_dc_bias + amplitude * envelope * phase.sin() + dither;
            raw[idx] = sample.round() as i32;
        }
        next_burst_start += beat_period_samples;
    }

    raw.chunks(hop_size)
        .filter(|chunk| chunk.len() == hop_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Scale the amplitude of an already-generated set of hops by `gain_factor`,
/// re-centering on the same DC bias (used to simulate a level step).
pub fn apply_gain(hops: &[Vec<i32>], config: &CaptureConfig, gain_factor: f32) -> Vec<Vec<i32>> {
    let bias = config.default_dc_bias;
    hops.iter()
        .map(|hop| {
            hop.iter()
                .map(|&s| (bias + (s as f32 - bias) * gain_factor).round() as i32)
                .collect()
        })
        .collect()
}
