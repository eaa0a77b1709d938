//! Serial receiver adapter.
//!
//! Wraps a [`SerialPeripheral`] and turns its raw flags into the per-quantum
//! [`ReceiveStatus`]. Reception is split in two so the scheduler can keep the
//! variable-cost part away from the output deadline:
//!
//! 1. [`ReceiverAdapter::check`] reads the status flags only (fixed cost).
//! 2. [`ReceiverAdapter::collect`] reads the latched data register, which is
//!    also what clears the byte-complete flag on this class of hardware.
//!
//! There is no buffering here. A byte that is not collected before the next
//! one completes is overwritten in the peripheral and never seen. `collect`
//! should follow its `check` immediately: the time between two checks is the
//! shortest input byte time the caller can sustain.

use crate::SerialPeripheral;

/// Raw flags as read from the peripheral status register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStatus {
    /// Bit counter reached 8 since the last latched read
    pub byte_complete: bool,
    /// A completed byte was overwritten before it was read
    pub overrun: bool,
    /// Clock activity began while the counter was idle
    pub start: bool,
}

/// Per-quantum receive status, never stored across quanta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStatus {
    pub byte_ready: bool,
    pub overflowed: bool,
}

/// Adapter between the raw peripheral and the scheduler
#[derive(Debug)]
pub struct ReceiverAdapter<P> {
    peripheral: P,
    overflows: u32,
}

impl<P: SerialPeripheral> ReceiverAdapter<P> {
    pub const fn new(peripheral: P) -> Self {
        Self {
            peripheral,
            overflows: 0,
        }
    }

    /// Fixed-cost status poll
    #[inline]
    pub fn check(&mut self) -> ReceiveStatus {
        let raw = self.peripheral.status();
        ReceiveStatus {
            byte_ready: raw.byte_complete,
            overflowed: raw.overrun,
        }
    }

    /// Read the latched byte reported ready by `status`.
    ///
    /// The latched read clears the ready and overrun flags without touching
    /// the bit counter of a byte that may already be shifting in.
    #[inline]
    pub fn collect(&mut self, status: ReceiveStatus) -> u8 {
        if status.overflowed {
            self.overflows = self.overflows.wrapping_add(1);
        }
        self.peripheral.read_latched()
    }

    /// Return the next complete byte, if one arrived since the last poll
    pub fn poll_byte(&mut self) -> Option<u8> {
        let status = self.check();
        status.byte_ready.then(|| self.collect(status))
    }

    /// Returns `true` once per start-of-activity edge
    pub fn start_of_activity(&mut self) -> bool {
        self.peripheral.take_start()
    }

    /// Forget a pending start signal, keeping any byte in flight
    pub fn clear_activity(&mut self) {
        let _ = self.peripheral.take_start();
    }

    /// Drop any partial byte and pending start signal.
    ///
    /// Used after a spurious start so a glitch edge does not shift the bit
    /// alignment of the next real session.
    pub fn resync(&mut self) {
        self.peripheral.reset_counter();
        let _ = self.peripheral.take_start();
    }

    /// Number of bytes reported as overwritten before collection
    pub const fn overflows(&self) -> u32 {
        self.overflows
    }

    /// Get a reference to the wrapped peripheral
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Release the wrapped peripheral
    pub fn release(self) -> P {
        self.peripheral
    }
}
