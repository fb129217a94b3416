//! BeatClock (§4.7): a phase-locked loop that runs at the renderer rate,
//! independent of the 100 Hz DSP hop rate, and is corrected by the tactus
//! resolver's phase hint whenever a new lock decision arrives.

use std::f32::consts::PI;

use bt_core::BeatClockConfig;

use crate::tactus::TactusOutput;

/// One tick of the beat clock's output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatClockTick {
    pub beat_phase01: f32,
    pub bpm_eff: f32,
    pub beat_tick: bool,
    pub downbeat_tick: bool,
}

pub struct BeatClock {
    config: BeatClockConfig,
    phase_rad: f32,
    bpm_eff: f32,
    freq_error_ema: f32,
    last_tick_ms: f32,
    elapsed_ms: f32,
    beat_count: u32,
}

impl BeatClock {
    pub fn new(config: &BeatClockConfig, initial_bpm: f32) -> Self {
        Self {
            config: *config,
            phase_rad: -PI,
            bpm_eff: initial_bpm,
            freq_error_ema: 0.0,
            last_tick_ms: f32::NEG_INFINITY,
            elapsed_ms: 0.0,
            beat_count: 0,
        }
    }

    pub fn bpm_eff(&self) -> f32 {
        self.bpm_eff
    }

    /// Correct the PLL from a fresh resolver output. Called once per hop.
    pub fn correct(&mut self, resolver_output: &TactusOutput) {
        if !resolver_output.locked {
            return;
        }
        let phase_hint = (resolver_output.phase_hint + PI).rem_euclid(2.0 * PI) - PI;
        let e = wrap_pi(phase_hint - self.phase_rad);

        if (resolver_output.locked_bpm - self.bpm_eff).abs() > self.config.big_change_bpm {
            self.phase_rad = phase_hint;
            self.bpm_eff = resolver_output.locked_bpm;
            self.freq_error_ema = 0.0;
            return;
        }

        let phase_correction = (self.config.k_p * e).clamp(-self.config.phase_correction_clamp, self.config.phase_correction_clamp);
        self.phase_rad = wrap_pi(self.phase_rad + phase_correction);

        self.freq_error_ema = self.config.freq_error_ema_alpha * self.freq_error_ema + (1.0 - self.config.freq_error_ema_alpha) * e;

        let freq_correction =
            (self.config.k_f * self.freq_error_ema * 60.0).clamp(-self.config.freq_correction_clamp_bpm, self.config.freq_correction_clamp_bpm);
        self.bpm_eff += freq_correction;
    }

    /// Advance the free-running oscillator by `dt_s` seconds and emit a tick.
    pub fn advance(&mut self, dt_s: f32) -> BeatClockTick {
        let prev_phase = self.phase_rad;
        self.phase_rad = wrap_pi(self.phase_rad + 2.0 * PI * self.bpm_eff / 60.0 * dt_s);
        self.elapsed_ms += dt_s * 1000.0;

        let crossed_zero = prev_phase < 0.0 && self.phase_rad >= 0.0;
        let beat_period_ms = 60_000.0 / self.bpm_eff.max(1.0e-3);
        let since_last = self.elapsed_ms - self.last_tick_ms;
        let debounced = since_last < self.config.tick_debounce_ratio * beat_period_ms;

        let beat_tick = crossed_zero && !debounced;
        let mut downbeat_tick = false;
        if beat_tick {
            self.last_tick_ms = self.elapsed_ms;
            downbeat_tick = self.beat_count % self.config.bar_length_beats.max(1) == 0;
            self.beat_count += 1;
        }

        BeatClockTick {
            beat_phase01: (self.phase_rad + PI) / (2.0 * PI),
            bpm_eff: self.bpm_eff,
            beat_tick,
            downbeat_tick,
        }
    }

    pub fn reset(&mut self, bpm: f32) {
        self.phase_rad = -PI;
        self.bpm_eff = bpm;
        self.freq_error_ema = 0.0;
        self.last_tick_ms = f32::NEG_INFINITY;
        self.elapsed_ms = 0.0;
        self.beat_count = 0;
    }
}

fn wrap_pi(x: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut y = (x + PI).rem_euclid(two_pi);
    if y < 0.0 {
        y += two_pi;
    }
    y - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tactus::LockState;

    fn locked_output(bpm: f32, phase: f32) -> TactusOutput {
        TactusOutput {
            locked_bpm: bpm,
            confidence: 0.9,
            phase_hint: phase,
            locked: true,
            state: LockState::Verified,
        }
    }

    #[test]
    fn free_runs_and_emits_periodic_ticks() {
        let mut clock = BeatClock::new(&BeatClockConfig::default(), 120.0);
        let mut ticks = 0;
        for _ in 0..(120 * 5) {
            let tick = clock.advance(1.0 / 120.0);
            if tick.beat_tick {
                ticks += 1;
            }
        }
        // at 120 BPM, 5 simulated seconds should yield roughly 10 beats.
        assert!(ticks >= 8 && ticks <= 12, "ticks = {ticks}");
    }

    #[test]
    fn big_change_snaps_phase_and_bpm() {
        let mut clock = BeatClock::new(&BeatClockConfig::default(), 90.0);
        clock.correct(&locked_output(140.0, 0.3));
        assert_eq!(clock.bpm_eff(), 140.0);
    }

    #[test]
    fn small_error_nudges_gradually_not_instantly() {
        let mut clock = BeatClock::new(&BeatClockConfig::default(), 120.0);
        clock.correct(&locked_output(121.0, 0.2));
        assert!(clock.bpm_eff() > 120.0 && clock.bpm_eff() < 121.0);
    }

    #[test]
    fn unlocked_output_is_ignored() {
        let mut clock = BeatClock::new(&BeatClockConfig::default(), 120.0);
        let unlocked = TactusOutput {
            locked_bpm: 200.0,
            confidence: 0.1,
            phase_hint: 1.0,
            locked: false,
            state: LockState::Unlocked,
        };
        clock.correct(&unlocked);
        assert_eq!(clock.bpm_eff(), 120.0);
    }

    #[test]
    fn downbeat_fires_every_bar_length_beats() {
        let mut clock = BeatClock::new(&BeatClockConfig::default(), 120.0);
        let mut downbeats = 0;
        let mut beats = 0;
        for _ in 0..(120 * 20) {
            let tick = clock.advance(1.0 / 120.0);
            if tick.beat_tick {
                beats += 1;
            }
            if tick.downbeat_tick {
                downbeats += 1;
            }
        }
        assert!(downbeats >= 1);
        assert!(downbeats <= beats);
    }
}
