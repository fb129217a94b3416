//! Optional per-hop diagnostic stream (§6): transport-agnostic, drained by a
//! collaborator (serial console, WebSocket, ...). Bounded and lossy — if the
//! consumer falls behind, the producer simply stops pushing rather than
//! blocking the audio thread.

use rtrb::{Consumer, Producer, RingBuffer};

/// One diagnostic record, a superset of `ControlBusFrame` meant for humans
/// and tooling rather than the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiagnosticFrame {
    pub hop_seq: u32,
    pub dc: f32,
    pub rms: f32,
    pub peak: f32,
    pub clip_count: u32,
    pub zero_count: u32,
    pub snr: f32,
    pub novelty_raw: f32,
    pub novelty_z: f32,
    pub top3_bpm: [f32; 3],
    pub top3_mag: [f32; 3],
    pub lock_state: u8,
    pub confidence: f32,
    pub phase01: f32,
}

/// Producer half, owned by the audio thread.
pub struct DiagnosticsSink {
    producer: Producer<DiagnosticFrame>,
}

impl DiagnosticsSink {
    /// Push one frame. Never blocks: if the bounded queue is full, this frame
    /// is dropped rather than overwriting an unread one or blocking the audio
    /// thread to wait for the collaborator to drain.
    pub fn push(&mut self, frame: DiagnosticFrame) {
        if self.producer.push(frame).is_err() {
            // Queue full; the collaborator isn't draining fast enough. Dropping
            // here (rather than blocking) keeps the audio thread's deadline safe.
        }
    }
}

/// Consumer half, owned by the diagnostics collaborator (serial/WebSocket/etc).
pub struct DiagnosticsSource {
    consumer: Consumer<DiagnosticFrame>,
}

impl DiagnosticsSource {
    pub fn try_recv(&mut self) -> Option<DiagnosticFrame> {
        self.consumer.pop().ok()
    }

    pub fn drain(&mut self, out: &mut Vec<DiagnosticFrame>) {
        while let Ok(frame) = self.consumer.pop() {
            out.push(frame);
        }
    }
}

pub fn diagnostics_channel(capacity: usize) -> (DiagnosticsSink, DiagnosticsSource) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (DiagnosticsSink { producer }, DiagnosticsSource { consumer })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(hop_seq: u32) -> DiagnosticFrame {
        DiagnosticFrame {
            hop_seq,
            dc: 0.0,
            rms: 0.0,
            peak: 0.0,
            clip_count: 0,
            zero_count: 0,
            snr: 0.0,
            novelty_raw: 0.0,
            novelty_z: 0.0,
            top3_bpm: [0.0; 3],
            top3_mag: [0.0; 3],
            lock_state: 0,
            confidence: 0.0,
            phase01: 0.0,
        }
    }

    #[test]
    fn push_and_drain_roundtrip() {
        let (mut sink, mut source) = diagnostics_channel(4);
        sink.push(frame(1));
        sink.push(frame(2));
        let mut out = Vec::new();
        source.drain(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].hop_seq, 1);
        assert_eq!(out[1].hop_seq, 2);
    }

    #[test]
    fn overflow_does_not_panic() {
        let (mut sink, mut source) = diagnostics_channel(2);
        for i in 0..10 {
            sink.push(frame(i));
        }
        let mut out = Vec::new();
        source.drain(&mut out);
        assert!(out.len() <= 2);
    }
}
