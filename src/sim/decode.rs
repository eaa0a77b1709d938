//! Waveform decoder.
//!
//! Reads recorded line edges the way a WS2812 does: each high pulse is one
//! bit, judged by its width alone, and a low period of at least the reset
//! threshold ends a frame.

use heapless::Vec;

use super::Edge;
use crate::config::{BitTiming, BridgeConfig};

/// Allowed deviation of a pulse from its nominal width (WS2812 datasheet).
pub const PULSE_TOLERANCE_NS: u64 = 150;

/// Error returned when a waveform is not a valid LED bit stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Two consecutive edges with the same level
    Glitch { at_ns: u64 },
    /// High pulse matching neither nominal width
    PulseWidth { at_ns: u64, high_ns: u64 },
    /// Frame ended in the middle of a byte
    PartialByte { frame: usize },
    /// Line still high at the end of the recording
    Unterminated,
    /// Output capacity exceeded
    Capacity,
}

fn classify(timing: BitTiming, rise_ns: u64, fall_ns: u64) -> Result<bool, DecodeError> {
    let high_ns = fall_ns - rise_ns;
    let near = |nominal: u32| high_ns.abs_diff(u64::from(nominal)) <= PULSE_TOLERANCE_NS;
    if near(timing.zero_high_ns) && high_ns < u64::from(timing.threshold_ns()) {
        Ok(false)
    } else if near(timing.one_high_ns) {
        Ok(true)
    } else {
        Err(DecodeError::PulseWidth {
            at_ns: rise_ns,
            high_ns,
        })
    }
}

/// Walk the edges as `(rise, fall)` pulse pairs
fn for_each_pulse(
    edges: &[Edge],
    mut f: impl FnMut(u64, u64) -> Result<(), DecodeError>,
) -> Result<(), DecodeError> {
    let mut high = false;
    let mut rise_ns = 0;
    for edge in edges {
        if edge.high == high {
            return Err(DecodeError::Glitch { at_ns: edge.at_ns });
        }
        high = edge.high;
        if high {
            rise_ns = edge.at_ns;
        } else {
            f(rise_ns, edge.at_ns)?;
        }
    }
    if high {
        return Err(DecodeError::Unterminated);
    }
    Ok(())
}

/// Decode every pulse into a bit, ignoring frame boundaries
pub fn decode_bits<const N: usize>(
    edges: &[Edge],
    timing: BitTiming,
) -> Result<Vec<bool, N>, DecodeError> {
    let mut bits = Vec::new();
    for_each_pulse(edges, |rise, fall| {
        let bit = classify(timing, rise, fall)?;
        bits.push(bit).map_err(|_| DecodeError::Capacity)
    })?;
    Ok(bits)
}

/// Decode the waveform into frames of bytes.
///
/// A frame ends wherever the line stays low for at least the configured
/// reset threshold between two pulses, and at the end of the recording.
pub fn decode_frames<const F: usize, const B: usize>(
    edges: &[Edge],
    config: &BridgeConfig,
) -> Result<Vec<Vec<u8, B>, F>, DecodeError> {
    let reset_ns = config.reset_threshold.as_micros() * 1000;
    let mut frames: Vec<Vec<u8, B>, F> = Vec::new();
    let mut current: Vec<u8, B> = Vec::new();
    let mut byte = 0u8;
    let mut bits = 0u8;
    let mut last_fall: Option<u64> = None;

    let mut close = |current: &mut Vec<u8, B>, bits: u8| -> Result<(), DecodeError> {
        if bits != 0 {
            return Err(DecodeError::PartialByte {
                frame: frames.len(),
            });
        }
        if !current.is_empty() {
            frames
                .push(core::mem::take(current))
                .map_err(|_| DecodeError::Capacity)?;
        }
        Ok(())
    };

    for_each_pulse(edges, |rise, fall| {
        if last_fall.is_some_and(|last| rise - last >= reset_ns) {
            close(&mut current, bits)?;
        }
        let bit = classify(config.timing, rise, fall)?;
        byte = (byte << 1) | u8::from(bit);
        bits += 1;
        if bits == 8 {
            current.push(byte).map_err(|_| DecodeError::Capacity)?;
            byte = 0;
            bits = 0;
        }
        last_fall = Some(fall);
        Ok(())
    })?;
    close(&mut current, bits)?;

    Ok(frames)
}

/// Low time between the last edge and `now_ns`.
///
/// Returns `None` while the line is high.
pub fn trailing_low_ns(edges: &[Edge], now_ns: u64) -> Option<u64> {
    match edges.last() {
        Some(edge) if edge.high => None,
        Some(edge) => Some(now_ns - edge.at_ns),
        None => Some(now_ns),
    }
}
