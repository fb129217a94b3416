//! Error taxonomy for the beat tracker core

use thiserror::Error;

/// Core error type.
///
/// Only [`BtError::InvariantViolation`] is ever returned as `Err` from
/// `BeatTrackerCore::process_hop`; every other variant is recorded as a flag or
/// counter on `SignalQuality` / `ControlBusFrame` and the pipeline keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BtError {
    #[error("hop had {got} samples, expected {expected}")]
    ShortHop { expected: usize, got: usize },

    #[error("microphone silent for {consecutive_hops} consecutive hops")]
    MicSilent { consecutive_hops: u32 },

    #[error("clip count {clip_count} exceeded warning threshold {threshold}")]
    Clipping { clip_count: u32, threshold: u32 },

    #[error("{component} missed its per-hop deadline ({elapsed_us}us budget {budget_us}us)")]
    DeadlineMiss {
        component: &'static str,
        elapsed_us: u32,
        budget_us: u32,
    },

    #[error("DC calibration was never run; using default bias")]
    CalibrationMissing,

    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),
}

/// Result type alias for core operations.
pub type BtResult<T> = Result<T, BtError>;
