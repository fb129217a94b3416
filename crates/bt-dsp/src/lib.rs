//! bt-dsp: the purely-computational leaf stages of the beat tracker.
//!
//! None of these types know about threads or atomics — they are plain structs
//! with `&mut self` methods, unit-testable in isolation, driven once per hop by
//! `bt-realtime::BeatTrackerCore`.
//!
//! - `capture` - CaptureConditioner: raw samples -> conditioned floats + signal quality
//! - `ring` - RingWindow: rolling W-sample window, no per-hop allocation
//! - `goertzel` - GoertzelBank: semitone-spaced magnitude spectrum
//! - `novelty` - NoveltyDetector: spectral-flux novelty curve
//! - `resonator` - TempoResonatorBank: tempo-tuned Goertzel bank over novelty

pub mod capture;
pub mod ewma;
pub mod goertzel;
pub mod novelty;
pub mod resonator;
pub mod ring;

pub use capture::CaptureConditioner;
pub use goertzel::{GoertzelBank, SpectralFrame};
pub use novelty::{NoveltyCurve, NoveltyDetector};
pub use resonator::{ResonatorFrame, TempoCandidate, TempoResonatorBank};
pub use ring::RingWindow;
