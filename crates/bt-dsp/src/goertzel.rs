//! GoertzelBank (§4.3): semitone-spaced magnitude spectrum from the ring window.

use bt_core::{GoertzelConfig, Sample};
use sha2::{Digest, Sha256};
use std::f32::consts::PI;

use crate::ewma::Ewma;

/// One semitone-spaced Goertzel bin. Immutable after construction — Testable
/// Property 5 ("Goertzel coefficients never change after init") is checked by
/// [`GoertzelBank::checksum`] against the value captured at construction time.
#[derive(Debug, Clone, Copy)]
struct GoertzelBin {
    freq_hz: f32,
    coeff: f32,
    sine: f32,
    cosine: f32,
    block_size: usize,
}

/// Semitone-spaced magnitude spectrum, one frame produced per hop.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    pub magnitudes: Vec<f32>,
}

pub struct GoertzelBank {
    bins: Vec<GoertzelBin>,
    /// Gaussian analysis window precomputed per bin at construction time
    /// (`bin_windows[i].len() == bins[i].block_size`); re-deriving it per hop
    /// would allocate on the audio thread.
    bin_windows: Vec<Vec<f32>>,
    autorange: Vec<Ewma>,
    floor: f32,
    shaping: bool,
    frame: SpectralFrame,
    coeff_checksum: [u8; 32],
}

impl GoertzelBank {
    pub fn new(config: &GoertzelConfig, sample_rate_hz: f32, ring_window_size: usize) -> Self {
        let k = config.bin_count;
        debug_assert!(k >= 2);

        let ratio = (config.band_high_hz / config.band_low_hz).powf(1.0 / (k as f32 - 1.0));
        let mut freqs = Vec::with_capacity(k);
        for i in 0..k {
            freqs.push(config.band_low_hz * ratio.powi(i as i32));
        }

        let mut bins = Vec::with_capacity(k);
        for (i, &f) in freqs.iter().enumerate() {
            let neighbor = if i + 1 < k {
                freqs[i + 1] - f
            } else {
                f - freqs[i - 1]
            };
            let delta_f = neighbor.max(1.0);
            let ideal_block = (sample_rate_hz / (delta_f / 2.0)).ceil() as usize;
            let block_size = ideal_block.clamp(8, ring_window_size);

            let omega = 2.0 * PI * f / sample_rate_hz;
            bins.push(GoertzelBin {
                freq_hz: f,
                coeff: 2.0 * omega.cos(),
                sine: omega.sin(),
                cosine: omega.cos(),
                block_size,
            });
        }

        let bin_windows: Vec<Vec<f32>> = bins.iter().map(|b| gaussian_window(b.block_size)).collect();
        let coeff_checksum = checksum_of(&bins);

        Self {
            autorange: vec![Ewma::from_time_constant(config.autorange_tau_s, 1.0 / 100.0); k],
            bins,
            bin_windows,
            floor: config.autorange_floor,
            shaping: config.perceptual_shaping,
            frame: SpectralFrame {
                magnitudes: vec![0.0; k],
            },
            coeff_checksum,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_freq_hz(&self, index: usize) -> f32 {
        self.bins[index].freq_hz
    }

    /// SHA-256 over the immutable coefficient table, for Testable Property 5.
    pub fn checksum(&self) -> [u8; 32] {
        checksum_of(&self.bins)
    }

    pub fn checksum_is_intact(&self) -> bool {
        self.checksum() == self.coeff_checksum
    }

    /// Run the bank over the current ring-window contents (oldest-to-newest,
    /// `window.len()` samples) and produce one [`SpectralFrame`]. Never fails;
    /// an all-zero input window produces an all-zero spectrum.
    pub fn process(&mut self, window: &[Sample]) -> &SpectralFrame {
        let w = window.len();
        for (bin_idx, bin) in self.bins.iter().enumerate() {
            let block = bin.block_size.min(w);
            let start = w - block;
            let gauss = &self.bin_windows[bin_idx][bin.block_size - block..];

            let mut q1 = 0.0f32;
            let mut q2 = 0.0f32;
            for n in 0..block {
                let x = window[start + n] * gauss[n];
                let q0 = bin.coeff * q1 - q2 + x;
                q2 = q1;
                q1 = q0;
            }
            let mag_sq = (q1 * q1 + q2 * q2 - q1 * q2 * bin.coeff).max(0.0);
            let mag = mag_sq.sqrt();

            let running_max = self.autorange[bin_idx].update(mag.max(self.floor));
            let scale = running_max.max(self.floor);
            let mut normalized = (mag / scale).clamp(0.0, 1.0);

            if self.shaping {
                normalized = normalized.powf(0.25);
            }

            self.frame.magnitudes[bin_idx] = normalized;
        }
        &self.frame
    }

    pub fn last_frame(&self) -> &SpectralFrame {
        &self.frame
    }
}

fn checksum_of(bins: &[GoertzelBin]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for b in bins {
        hasher.update(b.freq_hz.to_le_bytes());
        hasher.update(b.coeff.to_le_bytes());
        hasher.update(b.sine.to_le_bytes());
        hasher.update(b.cosine.to_le_bytes());
        hasher.update((b.block_size as u32).to_le_bytes());
    }
    hasher.finalize().into()
}

/// A gaussian analysis window of the given length, sigma tuned to the window
/// half-width so the taper reaches the edges smoothly.
pub(crate) fn gaussian_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let center = (len - 1) as f32 / 2.0;
    let sigma = center / 2.5;
    (0..len)
        .map(|n| {
            let x = (n as f32 - center) / sigma;
            (-0.5 * x * x).exp()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GoertzelConfig {
        GoertzelConfig {
            bin_count: 16,
            ..GoertzelConfig::default()
        }
    }

    #[test]
    fn silence_produces_zero_spectrum() {
        let mut bank = GoertzelBank::new(&config(), 12_800.0, 512);
        let window = vec![0.0f32; 512];
        let frame = bank.process(&window);
        assert!(frame.magnitudes.iter().all(|&m| m.abs() < 1e-6));
    }

    #[test]
    fn checksum_stable_across_processing() {
        let mut bank = GoertzelBank::new(&config(), 12_800.0, 512);
        let before = bank.checksum();
        let window: Vec<f32> = (0..512).map(|i| (i as f32 * 0.1).sin()).collect();
        bank.process(&window);
        bank.process(&window);
        assert_eq!(before, bank.checksum());
        assert!(bank.checksum_is_intact());
    }

    #[test]
    fn magnitudes_stay_in_unit_range() {
        let mut bank = GoertzelBank::new(&config(), 12_800.0, 512);
        let window: Vec<f32> = (0..512).map(|i| (i as f32 * 0.3).sin() * 5.0).collect();
        let frame = bank.process(&window);
        for &m in &frame.magnitudes {
            assert!(m >= 0.0 && m <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn tone_peaks_near_its_own_bin() {
        let cfg = GoertzelConfig {
            bin_count: 32,
            ..GoertzelConfig::default()
        };
        let sr = 12_800.0;
        let mut bank = GoertzelBank::new(&cfg, sr, 512);
        let target_bin = 15;
        let freq = bank.bin_freq_hz(target_bin);
        let window: Vec<f32> = (0..512)
            .map(|i| (2.0 * PI * freq * i as f32 / sr).sin())
            .collect();
        // warm up the autoranger
        for _ in 0..20 {
            bank.process(&window);
        }
        let frame = bank.process(&window);
        let (peak_bin, _) = frame
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert!((peak_bin as i32 - target_bin as i32).abs() <= 1);
    }
}
