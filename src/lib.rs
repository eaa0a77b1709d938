#![no_std]

pub mod config;
pub mod frame_buffer;
pub mod output;
pub mod receiver;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod timing;

pub use config::{BitTiming, BridgeConfig, ConfigError};
pub use frame_buffer::FrameBuffer;
pub use output::{BitGenerator, BitStep};
pub use receiver::{RawStatus, ReceiveStatus, ReceiverAdapter};
pub use scheduler::{QuantumLimits, TickResult, TranslationScheduler};
pub use session::{LateQuanta, SessionState, SessionStats};
pub use timing::{Branch, CostModel, TimingError};

pub use embassy_time::Duration;

/// Synchronous serial input peripheral
///
/// Implement this trait over the shift-register peripheral of the target
/// (USI, SPI in slave mode, ...). The scheduler polls it once per quantum.
pub trait SerialPeripheral {
    /// Read the status flags without side effects
    fn status(&mut self) -> RawStatus;

    /// Read the latched data register.
    ///
    /// Must clear the byte-complete and overrun flags without disturbing the
    /// bit counter of a byte that is already shifting in.
    fn read_latched(&mut self) -> u8;

    /// Return and clear the start-of-activity flag
    fn take_start(&mut self) -> bool;

    /// Discard a partially received byte
    fn reset_counter(&mut self);
}

/// Fixed-quantum timebase
///
/// A quantum is one output bit period. Offsets are relative to the most
/// recent [`QuantumClock::begin_quantum`] call.
///
/// On the target this is a free-running hardware timer. Reporting lateness
/// from it is how every scheduler branch gets measured against the bit
/// period; the scheduler counts late quanta per state in
/// [`SessionStats::late_quanta`].
pub trait QuantumClock {
    /// Mark the start of a quantum
    fn begin_quantum(&mut self);

    /// Busy-wait until `offset_ns` after the start of the quantum.
    ///
    /// Returns `true` if that point had already passed when called.
    fn wait_until(&mut self, offset_ns: u32) -> bool;
}
