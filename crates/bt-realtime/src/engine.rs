//! BeatTrackerCore (§5): top-level orchestration of the pipeline
//! capture -> ring -> goertzel -> novelty -> resonator -> tactus -> beatclock
//! -> control bus, run once per hop on the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bt_core::{BtError, BtResult, HopSeq, Millis, TrackerConfig};
use bt_dsp::{CaptureConditioner, GoertzelBank, NoveltyDetector, RingWindow, TempoResonatorBank};

use crate::beatclock::BeatClock;
use crate::control_bus::ControlBusPublisher;
use crate::diagnostics::{DiagnosticFrame, DiagnosticsSink};
use crate::tactus::{LockState, TactusResolver};

/// A one-bit, audio-thread-consumed reset request (§5 "Reset discipline").
/// Cloning gives a caller on another thread a handle to request a reset; the
/// flag is only ever read (and cleared) from inside `process_hop`.
#[derive(Clone)]
pub struct ResetHandle(Arc<AtomicBool>);

impl ResetHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Live per-hop counters surfaced for diagnostics and deadline accounting.
#[derive(Debug, Default)]
pub struct DeadlineMissCounters {
    pub process_hop: AtomicU32,
}

pub struct BeatTrackerCore {
    config: TrackerConfig,
    capture: CaptureConditioner,
    ring: RingWindow,
    goertzel: GoertzelBank,
    novelty: NoveltyDetector,
    resonator: TempoResonatorBank,
    tactus: TactusResolver,
    beat_clock: BeatClock,
    control_bus: Arc<ControlBusPublisher>,
    diagnostics: Option<DiagnosticsSink>,
    reset_flag: Arc<AtomicBool>,
    hop_seq: HopSeq,
    now_ms: u32,
    hop_period_ms: f32,
    poisoned: bool,
    deadline_misses: DeadlineMissCounters,
    hop_budget_us: u32,
    was_deadline_miss: bool,
    /// Reused ring-window snapshot scratch (no per-hop allocation).
    window_scratch: Vec<f32>,
}

impl BeatTrackerCore {
    pub fn new(config: TrackerConfig) -> BtResult<Self> {
        config
            .validate()
            .map_err(BtError::InvariantViolation)?;

        let hop_period_s = config.capture.hop_size as f32 / config.capture.sample_rate_hz;
        let novelty_rate_hz = 1.0 / hop_period_s;

        let capture = CaptureConditioner::new(config.capture);
        let ring = RingWindow::new(config.goertzel.ring_window_size);
        let goertzel = GoertzelBank::new(&config.goertzel, config.capture.sample_rate_hz, config.goertzel.ring_window_size);
        let novelty = NoveltyDetector::new(&config.novelty, config.goertzel.bin_count, hop_period_s);
        let resonator = TempoResonatorBank::new(&config.resonator, novelty_rate_hz, config.novelty.history_len);
        let tactus = TactusResolver::new(
            &config.tactus,
            config.resonator.bpm_min,
            config.resonator.bpm_max,
            hop_period_s * 1000.0,
            config.resonator.top_k,
        );
        let beat_clock = BeatClock::new(&config.beat_clock, config.tactus.prior_center_bpm);
        let control_bus = Arc::new(ControlBusPublisher::new(config.goertzel.bin_count));
        let ring_len = config.goertzel.ring_window_size;

        Ok(Self {
            capture,
            ring,
            goertzel,
            novelty,
            resonator,
            tactus,
            beat_clock,
            control_bus,
            diagnostics: None,
            reset_flag: Arc::new(AtomicBool::new(false)),
            hop_seq: HopSeq::default(),
            now_ms: 0,
            hop_period_ms: hop_period_s * 1000.0,
            poisoned: false,
            deadline_misses: DeadlineMissCounters::default(),
            hop_budget_us: 14_000,
            was_deadline_miss: false,
            window_scratch: vec![0.0; ring_len],
            config,
        })
    }

    pub fn control_bus(&self) -> Arc<ControlBusPublisher> {
        self.control_bus.clone()
    }

    pub fn attach_diagnostics(&mut self) -> crate::diagnostics::DiagnosticsSource {
        let (sink, source) = crate::diagnostics::diagnostics_channel(self.config.diagnostics_capacity);
        self.diagnostics = Some(sink);
        source
    }

    pub fn reset_handle(&self) -> ResetHandle {
        ResetHandle(self.reset_flag.clone())
    }

    pub fn lock_state(&self) -> LockState {
        self.tactus.state()
    }

    /// Pass the DC calibration measurement through to the capture conditioner.
    /// Only meaningful before steady-state operation begins.
    pub fn calibrate_dc(&mut self, silence_hops: &[&[i32]]) -> f32 {
        self.capture.calibrate_dc(silence_hops)
    }

    /// Process one hop of raw samples end to end. Returns `Err` only for
    /// `InvariantViolation`; all other error kinds are recorded on the
    /// published frame's `signal_quality` and the pipeline continues (§7).
    pub fn process_hop(&mut self, raw: &[i32]) -> BtResult<()> {
        if self.poisoned {
            return Err(BtError::InvariantViolation("core is poisoned after a prior invariant violation"));
        }

        let started = Instant::now();

        if self.reset_flag.swap(false, Ordering::AcqRel) {
            log::info!("reset_dsp_state: clearing tactus and beat-clock state");
            self.tactus.reset();
            self.beat_clock.reset(self.config.tactus.prior_center_bpm);
        }

        let quality = match self.capture.ingest(raw) {
            Ok((conditioned, quality)) => {
                self.ring.append(conditioned);
                quality
            }
            Err(BtError::ShortHop { .. }) => {
                // Hop discarded; the pipeline simply skips this tick (§4.1, §7).
                return Ok(());
            }
            Err(other) => return Err(other),
        };

        self.ring.snapshot(&mut self.window_scratch);
        let spectral_frame = self.goertzel.process(&self.window_scratch);

        let (novelty_raw, novelty_z) = self.novelty.process(spectral_frame);
        let resonator_frame = self.resonator.process(self.novelty.curve());
        let tactus_out = self.tactus.resolve(resonator_frame, &self.resonator, self.now_ms);
        self.beat_clock.correct(&tactus_out);
        let tick = self.beat_clock.advance(self.hop_period_ms / 1000.0);

        let next_seq = self.hop_seq.next();
        if next_seq.0 == 0 && self.hop_seq.0 != 0 {
            self.poisoned = true;
            return Err(BtError::InvariantViolation("hop_seq wrapped around u32::MAX"));
        }
        self.hop_seq = next_seq;
        self.now_ms = self.now_ms.saturating_add(self.hop_period_ms.round() as u32);

        {
            let back = self.control_bus.write();
            back.hop_seq = self.hop_seq.0;
            back.t_ms = self.now_ms;
            if back.spectrum.len() != spectral_frame.magnitudes.len() {
                back.spectrum.resize(spectral_frame.magnitudes.len(), 0.0);
            }
            back.spectrum.copy_from_slice(&spectral_frame.magnitudes);
            back.novelty = novelty_raw;
            back.bpm = tick.bpm_eff;
            back.beat_phase01 = tick.beat_phase01;
            back.beat_tick = tick.beat_tick;
            back.downbeat_tick = tick.downbeat_tick;
            back.confidence = tactus_out.confidence;
            back.locked = tactus_out.locked;
            back.signal_quality = quality;
        }
        self.control_bus.publish();

        if let Some(sink) = self.diagnostics.as_mut() {
            let mut top3_bpm = [0.0f32; 3];
            let mut top3_mag = [0.0f32; 3];
            for (i, c) in resonator_frame.candidates.iter().take(3).enumerate() {
                top3_bpm[i] = c.bpm;
                top3_mag[i] = c.magnitude_norm;
            }
            sink.push(DiagnosticFrame {
                hop_seq: self.hop_seq.0,
                dc: quality.dc_offset,
                rms: quality.rms,
                peak: quality.peak,
                clip_count: quality.clip_count,
                zero_count: quality.zero_count,
                snr: quality.snr_est,
                novelty_raw,
                novelty_z,
                top3_bpm,
                top3_mag,
                lock_state: self.tactus.state().as_u8(),
                confidence: tactus_out.confidence,
                phase01: tick.beat_phase01,
            });
        }

        let elapsed_us = started.elapsed().as_micros() as u32;
        let over_budget = elapsed_us > self.hop_budget_us;
        if over_budget && !self.was_deadline_miss {
            log::warn!(
                "process_hop missed its budget: {}us elapsed, {}us budget",
                elapsed_us,
                self.hop_budget_us
            );
        }
        self.was_deadline_miss = over_budget;
        if over_budget {
            self.deadline_misses.process_hop.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }

    pub fn hop_seq(&self) -> HopSeq {
        self.hop_seq
    }

    pub fn now(&self) -> Millis {
        Millis(self.now_ms)
    }

    pub fn deadline_miss_count(&self) -> u32 {
        self.deadline_misses.process_hop.load(Ordering::Relaxed)
    }
}
