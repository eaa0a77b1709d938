//! Output bit generator.
//!
//! Emits the WS2812 waveform one bit per quantum, most-significant bit first.
//! The scheduler calls [`BitGenerator::rise`] at the start of the quantum,
//! waits until [`BitGenerator::high_time`] and calls [`BitGenerator::fall`].
//! After the fall the remaining work of the quantum happens with the line
//! already low.

// Timings for ws2812 from https://cpldcpu.files.wordpress.com/2014/01/ws2812_timing_table.png

use embedded_hal::digital::OutputPin;

use crate::config::BitTiming;
use crate::frame_buffer::FrameBuffer;

/// Result of finishing one output bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitStep {
    /// More bits of the current byte remain
    Continue,
    /// The byte is done and the next one was loaded from the buffer
    Reloaded,
    /// The byte is done and the buffer was empty
    Drained,
}

/// Self-clocked single-wire bit generator
#[derive(Debug)]
pub struct BitGenerator<O> {
    line: O,
    current: u8,
    /// Index of the bit being emitted, 7 down to 0
    index: u8,
}

impl<O: OutputPin> BitGenerator<O> {
    /// Take the output line and drive it low
    pub fn new(mut line: O) -> Self {
        line.set_low().ok();
        Self {
            line,
            current: 0,
            index: 7,
        }
    }

    /// Load the next byte to emit, starting at its most significant bit
    #[inline]
    pub fn load(&mut self, byte: u8) {
        self.current = byte;
        self.index = 7;
    }

    /// Value of the bit emitted this quantum
    #[inline]
    pub const fn current_bit(&self) -> bool {
        self.current & (1 << self.index) != 0
    }

    /// Offset into the quantum at which the line must fall
    #[inline]
    pub const fn high_time(&self, timing: &BitTiming) -> u32 {
        timing.high_ns(self.current_bit())
    }

    #[inline]
    pub fn rise(&mut self) {
        self.line.set_high().ok();
    }

    #[inline]
    pub fn fall(&mut self) {
        self.line.set_low().ok();
    }

    /// Hold the line low between sessions
    pub fn idle(&mut self) {
        self.line.set_low().ok();
    }

    /// Advance past the bit just emitted.
    ///
    /// After bit 0 the next byte is taken from `buffer`; an empty buffer is
    /// reported as [`BitStep::Drained`] and the generator keeps its old byte.
    #[inline]
    pub fn finish_bit<const N: usize>(&mut self, buffer: &mut FrameBuffer<N>) -> BitStep {
        if self.index > 0 {
            self.index -= 1;
            return BitStep::Continue;
        }
        match buffer.pop() {
            Some(byte) => {
                self.load(byte);
                BitStep::Reloaded
            }
            None => BitStep::Drained,
        }
    }

    /// Byte currently held by the generator
    pub const fn current_byte(&self) -> u8 {
        self.current
    }

    /// Release the output line
    pub fn release(self) -> O {
        self.line
    }
}
