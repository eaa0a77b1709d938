//! Bridge configuration.
//!
//! Every historical tuning of the engine (prefill depth, timeouts, pulse
//! widths) is a value of [`BridgeConfig`]; there is only one engine.

use core::fmt;

use embassy_time::Duration;

/// Nominal WS2812 bit period in nanoseconds (800 kHz).
pub const DEFAULT_PERIOD_NS: u32 = 1250;

/// High time of a `0` bit in nanoseconds.
pub const DEFAULT_ZERO_HIGH_NS: u32 = 400;

/// High time of a `1` bit in nanoseconds.
pub const DEFAULT_ONE_HIGH_NS: u32 = 850;

/// Bytes collected before the first output bit of a session.
pub const DEFAULT_PREFILL_COUNT: usize = 3;

/// Per-byte wait during prefill before the start signal is treated as noise.
pub const DEFAULT_PREFILL_TIMEOUT: Duration = Duration::from_micros(40);

/// Wait for one more byte once the buffer drains mid-session.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_micros(20);

/// Low time after which WS2811/WS2812 strings latch their data.
pub const DEFAULT_RESET_THRESHOLD: Duration = Duration::from_micros(50);

/// Output pulse shape of one LED-protocol bit.
///
/// The line rises at the start of every period and falls after
/// `zero_high_ns` or `one_high_ns` depending on the bit value. LEDs decode
/// the bit purely from the high-phase duration, so these are the values to
/// keep exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    /// Full bit period
    pub period_ns: u32,
    /// High phase of a `0` bit
    pub zero_high_ns: u32,
    /// High phase of a `1` bit
    pub one_high_ns: u32,
}

impl BitTiming {
    /// WS2812(b) timing: 1.25 µs period, 0.4 µs / 0.85 µs pulses.
    pub const WS2812: Self = Self {
        period_ns: DEFAULT_PERIOD_NS,
        zero_high_ns: DEFAULT_ZERO_HIGH_NS,
        one_high_ns: DEFAULT_ONE_HIGH_NS,
    };

    /// High-phase duration for a bit value
    #[inline]
    pub const fn high_ns(self, bit: bool) -> u32 {
        if bit { self.one_high_ns } else { self.zero_high_ns }
    }

    /// Midpoint between the two pulse widths.
    ///
    /// A receiver reads pulses at least this long as `1`.
    pub const fn threshold_ns(self) -> u32 {
        (self.zero_high_ns + self.one_high_ns) / 2
    }
}

impl Default for BitTiming {
    fn default() -> Self {
        Self::WS2812
    }
}

/// Error returned by [`BridgeConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Pulse widths must satisfy `0 < zero_high < one_high < period`
    PhaseOrder,
    /// More prefill bytes requested than the buffer can hold
    PrefillExceedsCapacity { count: usize, capacity: usize },
    /// Prefill needs at least one byte and a non-zero timeout
    EmptyPrefill,
    /// Drain timeout must last longer than one bit period
    DrainTimeoutTooShort,
    /// Drain timeout, rounded up to whole quanta, must end before the LEDs
    /// latch
    DrainTimeoutExceedsReset,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PhaseOrder => write!(f, "bit timing must satisfy 0 < T0H < T1H < period"),
            Self::PrefillExceedsCapacity { count, capacity } => write!(
                f,
                "prefill of {} bytes exceeds buffer capacity {}",
                count, capacity
            ),
            Self::EmptyPrefill => write!(f, "prefill count and timeout must be non-zero"),
            Self::DrainTimeoutTooShort => write!(f, "drain timeout must exceed one bit period"),
            Self::DrainTimeoutExceedsReset => {
                write!(f, "drain timeout must be shorter than the reset threshold")
            }
        }
    }
}

/// Configuration for the translation scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    pub timing: BitTiming,
    pub prefill_count: usize,
    pub prefill_timeout: Duration,
    pub drain_timeout: Duration,
    pub reset_threshold: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timing: BitTiming::WS2812,
            prefill_count: DEFAULT_PREFILL_COUNT,
            prefill_timeout: DEFAULT_PREFILL_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            reset_threshold: DEFAULT_RESET_THRESHOLD,
        }
    }
}

impl BridgeConfig {
    /// Set the output bit timing
    #[must_use]
    pub fn with_timing(mut self, timing: BitTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Set how many bytes are collected before output starts
    #[must_use]
    pub fn with_prefill(mut self, count: usize, timeout: Duration) -> Self {
        self.prefill_count = count;
        self.prefill_timeout = timeout;
        self
    }

    /// Set the trailing wait used to detect end of frame
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the LED latch threshold
    #[must_use]
    pub fn with_reset_threshold(mut self, threshold: Duration) -> Self {
        self.reset_threshold = threshold;
        self
    }

    /// Convert a duration to whole quanta, rounding up.
    #[allow(clippy::cast_possible_truncation)]
    pub fn quanta(&self, duration: Duration) -> u32 {
        let nanos = duration.as_micros() * 1000;
        let period = u64::from(self.timing.period_ns.max(1));
        nanos.div_ceil(period).min(u64::from(u32::MAX)) as u32
    }

    /// Check the configuration against a buffer of `capacity` bytes.
    pub fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        let t = self.timing;
        if t.zero_high_ns == 0 || t.zero_high_ns >= t.one_high_ns || t.one_high_ns >= t.period_ns {
            return Err(ConfigError::PhaseOrder);
        }
        if self.prefill_count == 0 || self.quanta(self.prefill_timeout) == 0 {
            return Err(ConfigError::EmptyPrefill);
        }
        // One slot stays unused so a full prefill never reads as empty
        if self.prefill_count >= capacity {
            return Err(ConfigError::PrefillExceedsCapacity {
                count: self.prefill_count,
                capacity,
            });
        }
        if self.quanta(self.drain_timeout) <= 1 {
            return Err(ConfigError::DrainTimeoutTooShort);
        }
        // Longest low time before a late byte resumes output: the tail of a
        // `0` bit plus every drain quantum
        let drain_low_ns = u64::from(self.quanta(self.drain_timeout)) * u64::from(t.period_ns)
            + u64::from(t.period_ns - t.zero_high_ns);
        if drain_low_ns >= self.reset_threshold.as_micros() * 1000 {
            return Err(ConfigError::DrainTimeoutExceedsReset);
        }
        Ok(())
    }
}
