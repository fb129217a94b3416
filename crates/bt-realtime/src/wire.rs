//! Binary wire layout for `ControlBusFrame` (§6): little-endian, with a fixed
//! header `[u32 magic][u32 hopSeq][f32 bpm][f32 phase][u8 flags]` followed by
//! the spectrum. Byte layout beyond field order is a collaborator concern;
//! this module only needs to be internally consistent (encode/decode match).

use crate::control_bus::ControlBusFrame;
use bt_core::SignalQuality;
use thiserror::Error;

const MAGIC: u32 = 0xB3A7_7AC1;

const FLAG_LOCKED: u8 = 0b0000_0001;
const FLAG_BEAT_TICK: u8 = 0b0000_0010;
const FLAG_DOWNBEAT_TICK: u8 = 0b0000_0100;

/// Serialize a frame into the fixed little-endian wire layout.
pub fn to_wire_bytes(frame: &ControlBusFrame) -> Vec<u8> {
    let mut flags = 0u8;
    if frame.locked {
        flags |= FLAG_LOCKED;
    }
    if frame.beat_tick {
        flags |= FLAG_BEAT_TICK;
    }
    if frame.downbeat_tick {
        flags |= FLAG_DOWNBEAT_TICK;
    }

    let mut out = Vec::with_capacity(4 + 4 + 4 + 4 + 1 + 4 + frame.spectrum.len() * 4);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&frame.hop_seq.to_le_bytes());
    out.extend_from_slice(&frame.bpm.to_le_bytes());
    out.extend_from_slice(&frame.beat_phase01.to_le_bytes());
    out.push(flags);
    out.extend_from_slice(&frame.t_ms.to_le_bytes());
    out.extend_from_slice(&frame.novelty.to_le_bytes());
    out.extend_from_slice(&frame.confidence.to_le_bytes());
    out.extend_from_slice(&frame.signal_quality.rms.to_le_bytes());
    out.extend_from_slice(&frame.signal_quality.dc_offset.to_le_bytes());
    out.extend_from_slice(&frame.signal_quality.snr_est.to_le_bytes());
    out.extend_from_slice(&frame.signal_quality.clip_count.to_le_bytes());
    out.extend_from_slice(&(frame.spectrum.len() as u32).to_le_bytes());
    for &s in &frame.spectrum {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("truncated wire frame")]
    Truncated,
    #[error("bad magic number in wire frame header")]
    BadMagic,
}

/// Parse the wire layout produced by [`to_wire_bytes`] back into a frame.
pub fn from_wire_bytes(bytes: &[u8]) -> Result<ControlBusFrame, WireError> {
    let mut cursor = 0usize;
    macro_rules! take {
        ($n:expr) => {{
            if bytes.len() < cursor + $n {
                return Err(WireError::Truncated);
            }
            let slice = &bytes[cursor..cursor + $n];
            cursor += $n;
            slice
        }};
    }

    let magic = u32::from_le_bytes(take!(4).try_into().unwrap());
    if magic != MAGIC {
        return Err(WireError::BadMagic);
    }
    let hop_seq = u32::from_le_bytes(take!(4).try_into().unwrap());
    let bpm = f32::from_le_bytes(take!(4).try_into().unwrap());
    let beat_phase01 = f32::from_le_bytes(take!(4).try_into().unwrap());
    let flags = take!(1)[0];
    let t_ms = u32::from_le_bytes(take!(4).try_into().unwrap());
    let novelty = f32::from_le_bytes(take!(4).try_into().unwrap());
    let confidence = f32::from_le_bytes(take!(4).try_into().unwrap());
    let rms = f32::from_le_bytes(take!(4).try_into().unwrap());
    let dc_offset = f32::from_le_bytes(take!(4).try_into().unwrap());
    let snr_est = f32::from_le_bytes(take!(4).try_into().unwrap());
    let clip_count = u32::from_le_bytes(take!(4).try_into().unwrap());
    let spectrum_len = u32::from_le_bytes(take!(4).try_into().unwrap()) as usize;

    if bytes.len() < cursor + spectrum_len * 4 {
        return Err(WireError::Truncated);
    }
    let mut spectrum = Vec::with_capacity(spectrum_len);
    for i in 0..spectrum_len {
        let start = cursor + i * 4;
        spectrum.push(f32::from_le_bytes(bytes[start..start + 4].try_into().unwrap()));
    }

    Ok(ControlBusFrame {
        hop_seq,
        t_ms,
        spectrum,
        novelty,
        bpm,
        beat_phase01,
        beat_tick: flags & FLAG_BEAT_TICK != 0,
        downbeat_tick: flags & FLAG_DOWNBEAT_TICK != 0,
        confidence,
        locked: flags & FLAG_LOCKED != 0,
        signal_quality: SignalQuality {
            dc_offset,
            rms,
            peak: 0.0,
            clip_count,
            zero_count: 0,
            snr_est,
            clipping: false,
            mic_silent: false,
            calibration_missing: false,
        },
    })
}
