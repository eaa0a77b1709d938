//! Translation scheduler.
//!
//! The cooperative loop that owns every other component. One call to
//! [`TranslationScheduler::tick`] is one quantum: one output bit period in
//! which at most one output bit is emitted and the receiver is serviced once.
//! No interrupts are involved; the producer's clock and the local timebase are
//! reconciled only by the fixed order of work inside each quantum.
//!
//! The receiver is serviced at the same point in every quantum: right after
//! the fall of a streaming bit, and at the long-pulse mark otherwise. Two
//! consecutive services are therefore at most one period plus the difference
//! of the pulse widths apart, and an input byte lasting longer than that is
//! never overwritten before it is collected.
//!
//! # Usage
//!
//! ```ignore
//! let mut bridge: TranslationScheduler<_, _, _, 256> =
//!     TranslationScheduler::new(BridgeConfig::default(), usi, led_pin, timer)?;
//!
//! bridge.run();
//! ```

use embedded_hal::digital::OutputPin;

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::config::{BridgeConfig, ConfigError};
use crate::frame_buffer::FrameBuffer;
use crate::output::{BitGenerator, BitStep};
use crate::receiver::ReceiverAdapter;
use crate::session::{SessionState, SessionStats};
use crate::{QuantumClock, SerialPeripheral};

/// Timeouts of a [`BridgeConfig`] converted to quanta once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumLimits {
    /// Per-byte prefill wait
    pub prefill: u32,
    /// Trailing wait after the buffer drains
    pub drain: u32,
    /// Minimum low time between two sessions' output
    pub reset: u32,
}

impl QuantumLimits {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            prefill: config.quanta(config.prefill_timeout),
            drain: config.quanta(config.drain_timeout),
            reset: config.quanta(config.reset_threshold),
        }
    }
}

/// Result of one quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    /// State after the quantum
    pub state: SessionState,
    /// Bit emitted during the quantum, if the line carried data
    pub emitted: Option<bool>,
    /// The quantum's work overran one of its clock deadlines
    pub late: bool,
}

/// Cooperative scheduler bridging a synchronous serial input to a
/// WS2812 output line.
///
/// `N` is the capacity of the elastic frame buffer in bytes.
pub struct TranslationScheduler<P, O, C, const N: usize> {
    config: BridgeConfig,
    limits: QuantumLimits,

    receiver: ReceiverAdapter<P>,
    output: BitGenerator<O>,
    clock: C,

    buffer: FrameBuffer<N>,
    state: SessionState,
    /// Quanta since the line last carried a bit
    quiet: u32,
    stats: SessionStats,
}

impl<P, O, C, const N: usize> TranslationScheduler<P, O, C, N>
where
    P: SerialPeripheral,
    O: OutputPin,
    C: QuantumClock,
{
    /// Create a scheduler in the idle state.
    ///
    /// The output line is driven low immediately.
    pub fn new(
        config: BridgeConfig,
        peripheral: P,
        line: O,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate(N)?;
        let limits = QuantumLimits::from_config(&config);
        Ok(Self {
            config,
            limits,
            receiver: ReceiverAdapter::new(peripheral),
            output: BitGenerator::new(line),
            clock,
            buffer: FrameBuffer::new(),
            state: SessionState::Idle,
            // The line has been low since power-on
            quiet: limits.reset,
            stats: SessionStats::default(),
        })
    }

    /// Run one quantum.
    ///
    /// Always returns after exactly one bit period of the clock.
    pub fn tick(&mut self) -> TickResult {
        let started_in = self.state;
        self.clock.begin_quantum();
        let (emitted, mut late) = match started_in {
            SessionState::Idle => {
                let late = self.service_mark();
                self.idle_quantum();
                (None, late)
            }
            SessionState::Prefill { waited } => {
                let late = self.service_mark();
                self.prefill_quantum(waited);
                (None, late)
            }
            SessionState::Streaming => {
                let (bit, late) = self.stream_quantum();
                (Some(bit), late)
            }
            SessionState::DrainTimeout { waited } => {
                let late = self.service_mark();
                self.drain_quantum(waited);
                (None, late)
            }
        };
        if self.clock.wait_until(self.config.timing.period_ns) {
            late = true;
        }
        if late {
            self.stats.late_quanta.record(started_in);
        }

        TickResult {
            state: self.state,
            emitted,
            late,
        }
    }

    /// Wait for the point where a streaming quantum services the receiver
    fn service_mark(&mut self) -> bool {
        self.clock.wait_until(self.config.timing.one_high_ns)
    }

    /// Run `quanta` ticks and return the resulting state
    pub fn run_for(&mut self, quanta: u32) -> SessionState {
        for _ in 0..quanta {
            self.tick();
        }
        self.state
    }

    /// Run forever
    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    fn idle_quantum(&mut self) {
        self.quiet = self.quiet.saturating_add(1);
        // A byte that completed after its start flag was cleared still opens
        // a session; prefill collects it on the next quantum.
        if self.receiver.start_of_activity() || self.receiver.check().byte_ready {
            self.buffer.reset_to_origin();
            self.stats.begin_session();
            self.state = SessionState::Prefill { waited: 0 };
        }
    }

    fn prefill_quantum(&mut self, waited: u32) {
        self.quiet = self.quiet.saturating_add(1);
        let mut waited = waited.saturating_add(1);
        if let Some(byte) = self.receiver.poll_byte() {
            self.buffer.push(byte);
            self.stats.bytes_in = self.stats.bytes_in.saturating_add(1);
            waited = 0;
        }

        let timed_out = waited >= self.limits.prefill;
        let buffered = self.buffer.len();
        if buffered == 0 {
            if timed_out {
                self.reject_noise();
            } else {
                self.state = SessionState::Prefill { waited };
            }
            return;
        }

        // A short frame starts on timeout with whatever arrived
        let ready = buffered >= self.config.prefill_count || timed_out;
        if ready && self.quiet >= self.limits.reset {
            if let Some(first) = self.buffer.pop() {
                self.output.load(first);
                self.stats.sessions = self.stats.sessions.wrapping_add(1);
                self.state = SessionState::Streaming;
                #[cfg(feature = "esp32-log")]
                println!("bridge: streaming after {} bytes", buffered);
                return;
            }
        }
        self.state = SessionState::Prefill { waited };
    }

    /// Emit one bit and service the receiver.
    ///
    /// Only the line rise and the bit select happen before the fall
    /// deadline. The status poll, the latched read, the store and the byte
    /// reload all happen with the line already low.
    fn stream_quantum(&mut self) -> (bool, bool) {
        self.output.rise();
        let bit = self.output.current_bit();
        let late = self
            .clock
            .wait_until(self.output.high_time(&self.config.timing));
        self.output.fall();

        let status = self.receiver.check();
        if status.byte_ready {
            let byte = self.receiver.collect(status);
            self.buffer.push(byte);
            self.stats.bytes_in = self.stats.bytes_in.saturating_add(1);
        }

        match self.output.finish_bit(&mut self.buffer) {
            BitStep::Continue => {}
            BitStep::Reloaded => {
                self.stats.bytes_out = self.stats.bytes_out.saturating_add(1);
            }
            BitStep::Drained => {
                self.stats.bytes_out = self.stats.bytes_out.saturating_add(1);
                self.state = SessionState::DrainTimeout { waited: 0 };
            }
        }
        self.quiet = 0;
        (bit, late)
    }

    fn drain_quantum(&mut self, waited: u32) {
        self.quiet = self.quiet.saturating_add(1);
        if let Some(byte) = self.receiver.poll_byte() {
            self.buffer.push(byte);
            self.stats.bytes_in = self.stats.bytes_in.saturating_add(1);
            if let Some(next) = self.buffer.pop() {
                self.output.load(next);
            }
            self.state = SessionState::Streaming;
            return;
        }

        let waited = waited.saturating_add(1);
        if waited >= self.limits.drain {
            self.end_session();
        } else {
            self.state = SessionState::DrainTimeout { waited };
        }
    }

    fn end_session(&mut self) {
        self.output.idle();
        self.receiver.clear_activity();
        self.state = SessionState::Idle;
        #[cfg(feature = "esp32-log")]
        println!(
            "bridge: session end, {} bytes in, {} bytes out, {} overflows, {} late quanta",
            self.stats.bytes_in,
            self.stats.bytes_out,
            self.receiver.overflows(),
            self.stats.late_quanta.total()
        );
    }

    fn reject_noise(&mut self) {
        self.stats.noise_starts = self.stats.noise_starts.wrapping_add(1);
        self.receiver.resync();
        self.state = SessionState::Idle;
        #[cfg(feature = "esp32-log")]
        println!("bridge: start signal without data, ignored");
    }

    /// Current session state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Diagnostic counters
    pub const fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Bytes the receiver reported as overwritten before collection
    pub const fn overflows(&self) -> u32 {
        self.receiver.overflows()
    }

    /// Timeouts in quanta
    pub const fn limits(&self) -> QuantumLimits {
        self.limits
    }

    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get a reference to the frame buffer
    pub const fn buffer(&self) -> &FrameBuffer<N> {
        &self.buffer
    }

    /// Get a reference to the clock
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Get a mutable reference to the clock
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Release the peripheral, output line and clock
    pub fn release(self) -> (P, O, C) {
        (self.receiver.release(), self.output.release(), self.clock)
    }
}
