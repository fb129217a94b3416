//! bt-realtime: the stateful, single-writer pipeline stages and the
//! lock-free publication surface that exposes them to other threads.
//!
//! - `control_bus` - ControlBusFrame + ControlBusPublisher: lock-free, double-buffered frame publication
//! - `diagnostics` - optional bounded SPSC diagnostic stream
//! - `tactus` - TactusResolver: top-K candidates -> one locked tempo + confidence + state machine
//! - `beatclock` - BeatClock: phase-locked loop over the resolver's phase hint
//! - `wire` - binary/JSON wire encoding of `ControlBusFrame`
//! - `engine` - BeatTrackerCore: orchestrates every stage once per hop

pub mod beatclock;
pub mod control_bus;
pub mod diagnostics;
pub mod engine;
pub mod tactus;
pub mod wire;

pub use beatclock::{BeatClock, BeatClockTick};
pub use control_bus::{ControlBusFrame, ControlBusPublisher};
pub use diagnostics::{diagnostics_channel, DiagnosticFrame, DiagnosticsSink, DiagnosticsSource};
pub use engine::{BeatTrackerCore, ResetHandle};
pub use tactus::{LockState, TactusOutput, TactusResolver};
pub use wire::{from_wire_bytes, to_wire_bytes, WireError};
