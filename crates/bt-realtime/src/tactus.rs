//! TactusResolver (§4.6): collapses the tempo resonator's top-K candidates
//! into a single `(locked_bpm, confidence, phase_hint)` and drives the
//! UNLOCKED -> PENDING -> VERIFIED lock state machine.

use bt_core::TactusConfig;
use bt_dsp::{ResonatorFrame, TempoCandidate, TempoResonatorBank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Pending,
    Verified,
}

impl LockState {
    pub fn as_u8(self) -> u8 {
        match self {
            LockState::Unlocked => 0,
            LockState::Pending => 1,
            LockState::Verified => 2,
        }
    }
}

/// Output of one `TactusResolver::resolve` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TactusOutput {
    pub locked_bpm: f32,
    pub confidence: f32,
    pub phase_hint: f32,
    pub locked: bool,
    pub state: LockState,
}

struct ScoredCandidate {
    bpm: f32,
    score: f32,
    phase: f32,
}

pub struct TactusResolver {
    config: TactusConfig,
    state: LockState,
    locked_bpm: f32,
    density: Vec<f32>,
    density_bpm_min: f32,
    density_bpm_max: f32,
    pending_start_ms: u32,
    pending_challenger_bpm: Option<f32>,
    pending_challenger_hops: u32,
    verified_challenger_bpm: Option<f32>,
    verified_challenger_hops: u32,
    since_good_candidate_ms: f32,
    hop_period_ms: f32,
    /// Reused per-hop scoring scratch, preallocated to the resonator's top-K
    /// so `resolve` never allocates on the hot path.
    scored_scratch: Vec<ScoredCandidate>,
}

impl TactusResolver {
    pub fn new(config: &TactusConfig, bpm_min: f32, bpm_max: f32, hop_period_ms: f32, max_candidates: usize) -> Self {
        let n_density = ((bpm_max - bpm_min).max(1.0).round() as usize) + 1;
        Self {
            config: *config,
            state: LockState::Unlocked,
            locked_bpm: config.prior_center_bpm,
            density: vec![0.0; n_density],
            density_bpm_min: bpm_min,
            density_bpm_max: bpm_max,
            pending_start_ms: 0,
            pending_challenger_bpm: None,
            pending_challenger_hops: 0,
            verified_challenger_bpm: None,
            verified_challenger_hops: 0,
            since_good_candidate_ms: 0.0,
            hop_period_ms,
            scored_scratch: Vec::with_capacity(max_candidates.max(1)),
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn locked_bpm(&self) -> f32 {
        self.locked_bpm
    }

    /// Reset to the initial UNLOCKED state, clearing all memory. (§4.6 "any -> reset_dsp_state")
    pub fn reset(&mut self) {
        self.state = LockState::Unlocked;
        self.locked_bpm = self.config.prior_center_bpm;
        self.density.iter_mut().for_each(|d| *d = 0.0);
        self.pending_start_ms = 0;
        self.pending_challenger_bpm = None;
        self.pending_challenger_hops = 0;
        self.verified_challenger_bpm = None;
        self.verified_challenger_hops = 0;
        self.since_good_candidate_ms = 0.0;
    }

    fn prior(&self, bpm: f32) -> f32 {
        let sigma = self.config.prior_sigma_bpm;
        let d = bpm - self.config.prior_center_bpm;
        (-(d * d) / (2.0 * sigma * sigma)).exp()
    }

    fn density_normalized(&self, bpm: f32) -> f32 {
        let peak = self.density.iter().cloned().fold(0.0f32, f32::max).max(1.0e-9);
        self.density_at(bpm) / peak
    }

    fn density_at(&self, bpm: f32) -> f32 {
        if bpm < self.density_bpm_min || bpm > self.density_bpm_max {
            return 0.0;
        }
        let idx = (bpm - self.density_bpm_min).round() as usize;
        self.density.get(idx).copied().unwrap_or(0.0)
    }

    fn bump_density(&mut self, bpm: f32) {
        let width = self.config.density_kde_width_bpm;
        for (i, d) in self.density.iter_mut().enumerate() {
            let center = self.density_bpm_min + i as f32;
            let dist = (center - bpm).abs();
            if dist <= width {
                *d += 1.0 - dist / width;
            }
        }
    }

    fn decay_density(&mut self) {
        for d in self.density.iter_mut() {
            *d *= self.config.density_decay;
        }
    }

    fn score(&self, candidate: &TempoCandidate, bank: &TempoResonatorBank) -> f32 {
        let bpm = candidate.bpm;
        let half = bank.magnitude_near(bpm * 0.5) * self.prior(bpm * 0.5);
        let double = bank.magnitude_near(bpm * 2.0) * self.prior(bpm * 2.0);

        let mut score = candidate.raw_magnitude * self.prior(bpm)
            + self.config.w_octave * half
            + self.config.w_octave * double
            + self.config.w_density * self.density_normalized(bpm);

        if self.state == LockState::Verified && (bpm - self.locked_bpm).abs() <= self.config.stability_window_bpm {
            score += self.config.stability_bonus;
        }
        score
    }

    /// Resolve one hop's candidate set into a lock decision, advancing the
    /// internal state machine. `now_ms` is a monotonic hop clock.
    pub fn resolve(&mut self, frame: &ResonatorFrame, bank: &TempoResonatorBank, now_ms: u32) -> TactusOutput {
        self.decay_density();

        if frame.candidates.is_empty() {
            self.since_good_candidate_ms += self.hop_period_ms;
            return self.stalled_output();
        }

        self.scored_scratch.clear();
        for c in frame.candidates.iter() {
            let score = self.score(c, bank);
            self.scored_scratch.push(ScoredCandidate {
                bpm: c.bpm,
                score,
                phase: c.phase,
            });
        }
        self.scored_scratch
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let winner = &self.scored_scratch[0];
        let mut winner_bpm = winner.bpm;
        let mut winner_score = winner.score;
        let mut winner_phase = winner.phase;

        // Octave override: prefer 2x if it's a credible double-time candidate.
        if winner_bpm < 80.0 {
            if let Some(double) = self
                .scored_scratch
                .iter()
                .find(|c| (c.bpm - winner_bpm * 2.0).abs() <= self.config.consensus_group_bpm)
            {
                let prior_advantage = self.prior(double.bpm) / self.prior(winner_bpm).max(1.0e-9);
                if double.score >= self.config.octave_override_ratio * winner_score
                    && prior_advantage >= self.config.octave_prior_advantage
                {
                    winner_bpm = double.bpm;
                    winner_score = double.score;
                    winner_phase = double.phase;
                }
            }
        }

        self.bump_density(winner_bpm);

        let confidence = self.confidence(&self.scored_scratch, winner_bpm, winner_score);

        if winner_score >= self.config.min_score {
            self.since_good_candidate_ms = 0.0;
        } else {
            self.since_good_candidate_ms += self.hop_period_ms;
        }

        let state_before = self.state;
        self.advance_state(winner_bpm, winner_score, now_ms);
        if self.state != state_before {
            log::debug!(
                "lock state {:?} -> {:?} at {} BPM",
                state_before,
                self.state,
                self.locked_bpm
            );
        }

        if self.since_good_candidate_ms >= self.config.stall_timeout_s * 1000.0 {
            return self.stalled_output();
        }

        TactusOutput {
            locked_bpm: self.locked_bpm,
            confidence: confidence.max(self.config.min_confidence).min(1.0),
            phase_hint: winner_phase,
            locked: self.state != LockState::Unlocked,
            state: self.state,
        }
    }

    fn stalled_output(&self) -> TactusOutput {
        TactusOutput {
            locked_bpm: self.locked_bpm,
            confidence: self.config.min_confidence,
            phase_hint: 0.0,
            locked: false,
            state: self.state,
        }
    }

    fn confidence(&self, scored: &[ScoredCandidate], winner_bpm: f32, winner_score: f32) -> f32 {
        let group_score: f32 = scored
            .iter()
            .filter(|c| (c.bpm - winner_bpm).abs() <= self.config.consensus_group_bpm)
            .map(|c| c.score)
            .sum();
        let runner = scored
            .iter()
            .filter(|c| (c.bpm - winner_bpm).abs() >= self.config.consensus_runner_bpm)
            .map(|c| c.score)
            .fold(0.0f32, f32::max);

        let _ = winner_score;
        if runner < 1.0e-6 {
            1.0
        } else {
            ((group_score - runner) / (group_score + runner)).clamp(0.0, 1.0)
        }
    }

    fn advance_state(&mut self, winner_bpm: f32, winner_score: f32, now_ms: u32) {
        match self.state {
            LockState::Unlocked => {
                if winner_score >= self.config.min_score {
                    self.locked_bpm = winner_bpm;
                    self.pending_start_ms = now_ms;
                    self.pending_challenger_bpm = None;
                    self.pending_challenger_hops = 0;
                    self.state = LockState::Pending;
                }
            }
            LockState::Pending => {
                let is_challenger = (winner_bpm - self.locked_bpm).abs() >= self.config.pending_switch_delta_bpm
                    && winner_score >= self.config.pending_switch_ratio * self.locked_score(winner_bpm);

                if is_challenger && self.pending_challenger_bpm == Some(winner_bpm) {
                    self.pending_challenger_hops += 1;
                } else if is_challenger {
                    self.pending_challenger_bpm = Some(winner_bpm);
                    self.pending_challenger_hops = 1;
                } else {
                    self.pending_challenger_bpm = None;
                    self.pending_challenger_hops = 0;
                }

                if self.pending_challenger_hops >= self.config.pending_switch_hops {
                    self.locked_bpm = winner_bpm;
                    self.pending_start_ms = now_ms;
                    self.pending_challenger_bpm = None;
                    self.pending_challenger_hops = 0;
                }

                if now_ms.saturating_sub(self.pending_start_ms) >= self.config.pending_verify_ms {
                    self.state = LockState::Verified;
                    self.verified_challenger_bpm = None;
                    self.verified_challenger_hops = 0;
                }
            }
            LockState::Verified => {
                if (winner_bpm - self.locked_bpm).abs() <= self.config.stability_window_bpm {
                    self.locked_bpm = (1.0 - self.config.verified_track_low_pass) * self.locked_bpm
                        + self.config.verified_track_low_pass * winner_bpm;
                    self.verified_challenger_bpm = None;
                    self.verified_challenger_hops = 0;
                } else {
                    let is_challenger = winner_score >= self.config.verified_switch_ratio * self.locked_score(winner_bpm);
                    if is_challenger && self.verified_challenger_bpm == Some(winner_bpm) {
                        self.verified_challenger_hops += 1;
                    } else if is_challenger {
                        self.verified_challenger_bpm = Some(winner_bpm);
                        self.verified_challenger_hops = 1;
                    } else {
                        self.verified_challenger_bpm = None;
                        self.verified_challenger_hops = 0;
                    }

                    if self.verified_challenger_hops >= self.config.verified_switch_hops {
                        self.locked_bpm = winner_bpm;
                        self.verified_challenger_bpm = None;
                        self.verified_challenger_hops = 0;
                    }
                }
            }
        }
    }

    /// Approximate score of the currently-locked BPM for challenger comparisons,
    /// using the prior alone (the full resonator score for `locked_bpm` isn't
    /// necessarily among this hop's candidates).
    fn locked_score(&self, _challenger_bpm: f32) -> f32 {
        self.prior(self.locked_bpm).max(1.0e-6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_core::ResonatorConfig;

    fn candidate(bpm: f32, mag: f32) -> TempoCandidate {
        TempoCandidate {
            bpm,
            magnitude_norm: mag,
            raw_magnitude: mag,
            phase: 0.0,
        }
    }

    fn bank() -> TempoResonatorBank {
        TempoResonatorBank::new(&ResonatorConfig::default(), 100.0, 512)
    }

    #[test]
    fn starts_unlocked() {
        let resolver = TactusResolver::new(&TactusConfig::default(), 48.0, 180.0, 10.0, 12);
        assert_eq!(resolver.state(), LockState::Unlocked);
    }

    #[test]
    fn strong_sustained_candidate_reaches_verified() {
        let mut resolver = TactusResolver::new(&TactusConfig::default(), 48.0, 180.0, 10.0, 12);
        let bank = bank();
        let frame = ResonatorFrame {
            candidates: vec![candidate(120.0, 5.0), candidate(90.0, 0.5)],
        };
        let mut now = 0u32;
        let mut last_state = LockState::Unlocked;
        for _ in 0..400 {
            let out = resolver.resolve(&frame, &bank, now);
            last_state = out.state;
            now += 10;
            if last_state == LockState::Verified {
                break;
            }
        }
        assert_eq!(last_state, LockState::Verified);
    }

    #[test]
    fn empty_candidates_does_not_panic_and_stays_unlocked() {
        let mut resolver = TactusResolver::new(&TactusConfig::default(), 48.0, 180.0, 10.0, 12);
        let bank = bank();
        let frame = ResonatorFrame { candidates: vec![] };
        let out = resolver.resolve(&frame, &bank, 0);
        assert!(!out.locked);
        assert_eq!(out.confidence, TactusConfig::default().min_confidence);
    }

    #[test]
    fn reset_returns_to_unlocked_and_clears_density() {
        let mut resolver = TactusResolver::new(&TactusConfig::default(), 48.0, 180.0, 10.0, 12);
        let bank = bank();
        let frame = ResonatorFrame {
            candidates: vec![candidate(120.0, 5.0)],
        };
        for i in 0..200 {
            resolver.resolve(&frame, &bank, i * 10);
        }
        resolver.reset();
        assert_eq!(resolver.state(), LockState::Unlocked);
        assert!(resolver.density.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn confidence_never_exceeds_one() {
        let mut resolver = TactusResolver::new(&TactusConfig::default(), 48.0, 180.0, 10.0, 12);
        let bank = bank();
        let frame = ResonatorFrame {
            candidates: vec![candidate(120.0, 5.0), candidate(121.0, 4.9), candidate(119.0, 4.8)],
        };
        let out = resolver.resolve(&frame, &bank, 0);
        assert!(out.confidence <= 1.0);
    }
}
