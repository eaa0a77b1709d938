//! Host-side simulation of the bridge hardware.
//!
//! A [`SimBus`] holds one virtual nanosecond timeline shared by a simulated
//! shift-register peripheral, the output line, the quantum clock and an
//! external producer. Time only moves when the scheduler waits on the
//! clock, so the scheduler's own work is instantaneous here; its cost is
//! covered by [`crate::timing`] instead.
//!
//! Recorded line edges can be turned back into bytes with [`decode_frames`].

mod bus;
mod decode;

pub use bus::{SimBus, SimClock, SimLine, SimPeripheral, SimSender};
pub use decode::{DecodeError, PULSE_TOLERANCE_NS, decode_bits, decode_frames, trailing_low_ns};

/// One transition of the output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Virtual time of the transition
    pub at_ns: u64,
    /// Level after the transition
    pub high: bool,
}

/// Error returned when the producer's wire queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFull;
