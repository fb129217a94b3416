//! ControlBusFrame + ControlBusPublisher (§4.8): the single aggregate record
//! published per hop to the visual consumer, lock-free.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use bt_core::SignalQuality;
use serde::{Deserialize, Serialize};

/// Immutable per-hop aggregate. Created exclusively by [`ControlBusPublisher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlBusFrame {
    pub hop_seq: u32,
    pub t_ms: u32,
    pub spectrum: Vec<f32>,
    pub novelty: f32,
    pub bpm: f32,
    #[serde(rename = "beatPhase")]
    pub beat_phase01: f32,
    pub beat_tick: bool,
    pub downbeat_tick: bool,
    pub confidence: f32,
    pub locked: bool,
    pub signal_quality: SignalQuality,
}

impl ControlBusFrame {
    fn new_zeroed(bin_count: usize) -> Self {
        Self {
            hop_seq: 0,
            t_ms: 0,
            spectrum: vec![0.0; bin_count],
            novelty: 0.0,
            bpm: 0.0,
            beat_phase01: 0.0,
            beat_tick: false,
            downbeat_tick: false,
            confidence: 0.0,
            locked: false,
            signal_quality: SignalQuality::default(),
        }
    }
}

/// Triple-buffered, lock-free single-producer/multi-consumer publication
/// slot, grounded on the teacher's `TripleBuffer<T>`
/// (`rf-realtime/src/state.rs`). Three slots — write, ready, read — are
/// tracked by a single `AtomicU32` packed two bits per index. A plain
/// double buffer only has two slots, so the instant `publish()` hands the
/// just-written slot to the consumer, the producer's next `write()` would
/// reclaim that same slot out from under a consumer still mid-copy — a torn
/// read. With three slots the producer only ever writes into a slot no
/// consumer can be holding: `publish()` swaps write<->ready, and `read()`
/// swaps ready<->read, so the write and read slots are never the same index
/// at the same time.
pub struct ControlBusPublisher {
    slots: [UnsafeCell<ControlBusFrame>; 3],
    /// bits 0-1 = write index, bits 2-3 = ready index, bits 4-5 = read index.
    state: AtomicU32,
}

unsafe impl Send for ControlBusPublisher {}
unsafe impl Sync for ControlBusPublisher {}

const IDX_MASK: u32 = 0b11;

#[inline]
fn pack(write_idx: u32, ready_idx: u32, read_idx: u32) -> u32 {
    write_idx | (ready_idx << 2) | (read_idx << 4)
}

#[inline]
fn unpack(state: u32) -> (u32, u32, u32) {
    (state & IDX_MASK, (state >> 2) & IDX_MASK, (state >> 4) & IDX_MASK)
}

impl ControlBusPublisher {
    pub fn new(bin_count: usize) -> Self {
        Self {
            slots: [
                UnsafeCell::new(ControlBusFrame::new_zeroed(bin_count)),
                UnsafeCell::new(ControlBusFrame::new_zeroed(bin_count)),
                UnsafeCell::new(ControlBusFrame::new_zeroed(bin_count)),
            ],
            state: AtomicU32::new(pack(0, 1, 2)),
        }
    }

    /// Mutable access to the write slot. Producer-only; the caller fills in
    /// every field before calling [`ControlBusPublisher::publish`].
    ///
    /// # Safety
    /// Must only be called from the single audio-thread producer.
    #[allow(clippy::mut_from_ref)]
    pub fn write(&self) -> &mut ControlBusFrame {
        let (write_idx, _, _) = unpack(self.state.load(Ordering::Acquire));
        unsafe { &mut *self.slots[write_idx as usize].get() }
    }

    /// Publish the write slot: swap it with the ready slot so a consumer's
    /// next [`ControlBusPublisher::read`] picks it up.
    pub fn publish(&self) {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let (write_idx, ready_idx, read_idx) = unpack(state);
            let new_state = pack(ready_idx, write_idx, read_idx);
            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Swap the latest ready slot into the read slot, returning its index.
    fn acquire_read_slot(&self) -> usize {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let (write_idx, ready_idx, read_idx) = unpack(state);
            let new_state = pack(write_idx, read_idx, ready_idx);
            if self
                .state
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return ready_idx as usize;
            }
        }
    }

    /// Copy the latest published frame into `out`, reusing `out`'s
    /// allocation for the spectrum vector (no allocation on the hot path once
    /// `out` has been sized once).
    pub fn read_into(&self, out: &mut ControlBusFrame) {
        let read_idx = self.acquire_read_slot();
        let front = unsafe { &*self.slots[read_idx].get() };
        out.hop_seq = front.hop_seq;
        out.t_ms = front.t_ms;
        out.novelty = front.novelty;
        out.bpm = front.bpm;
        out.beat_phase01 = front.beat_phase01;
        out.beat_tick = front.beat_tick;
        out.downbeat_tick = front.downbeat_tick;
        out.confidence = front.confidence;
        out.locked = front.locked;
        out.signal_quality = front.signal_quality;
        if out.spectrum.len() != front.spectrum.len() {
            out.spectrum.resize(front.spectrum.len(), 0.0);
        }
        out.spectrum.copy_from_slice(&front.spectrum);
    }

    /// Convenience: allocate a fresh owned copy of the latest published frame.
    pub fn read(&self) -> ControlBusFrame {
        let read_idx = self.acquire_read_slot();
        unsafe { (*self.slots[read_idx].get()).clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_read_sees_written_values() {
        let publisher = ControlBusPublisher::new(4);
        {
            let back = publisher.write();
            back.hop_seq = 7;
            back.bpm = 128.0;
            back.spectrum.copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        }
        publisher.publish();
        let frame = publisher.read();
        assert_eq!(frame.hop_seq, 7);
        assert_eq!(frame.bpm, 128.0);
        assert_eq!(frame.spectrum, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn hop_seq_strictly_increases_across_publishes() {
        let publisher = ControlBusPublisher::new(2);
        let mut last = None;
        for i in 0..10u32 {
            publisher.write().hop_seq = i;
            publisher.publish();
            let frame = publisher.read();
            if let Some(prev) = last {
                assert!(frame.hop_seq > prev);
            }
            last = Some(frame.hop_seq);
        }
    }

    #[test]
    fn read_into_reuses_allocation() {
        let publisher = ControlBusPublisher::new(4);
        publisher.write().spectrum.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        publisher.publish();
        let mut out = ControlBusFrame::new_zeroed(4);
        let ptr_before = out.spectrum.as_ptr();
        publisher.read_into(&mut out);
        assert_eq!(out.spectrum.as_ptr(), ptr_before);
        assert_eq!(out.spectrum, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn write_slot_never_aliases_read_slot_across_publishes() {
        // Three consecutive publish/read cycles without the consumer ever
        // catching up exercise every index rotation; the write index must
        // never coincide with the currently-acquired read index.
        let publisher = ControlBusPublisher::new(1);
        for i in 0..6u32 {
            publisher.write().hop_seq = i;
            publisher.publish();
        }
        let read_idx = publisher.acquire_read_slot();
        let (write_idx, _, _) = unpack(publisher.state.load(Ordering::Acquire));
        assert_ne!(read_idx as u32, write_idx);
    }
}
