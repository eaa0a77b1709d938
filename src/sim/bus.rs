//! Shared virtual timeline and its handles.
//!
//! The bus state lives behind a `critical-section` mutex and every handle is
//! a lightweight reference to it, so the peripheral, line and clock can be
//! moved into the scheduler while the test keeps feeding the producer side.

use core::cell::RefCell;
use core::convert::Infallible;

use critical_section::Mutex;
use embedded_hal::digital::{ErrorType, OutputPin};
use heapless::{Deque, Vec};
use smart_leds::{RGB8, SmartLedsWrite};

use super::{Edge, WireFull};
use crate::receiver::RawStatus;
use crate::{QuantumClock, SerialPeripheral};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireEvent {
    /// Eight clock edges carrying a byte
    Byte(u8),
    /// A single spurious clock edge
    Glitch,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    /// First clock edge
    start_ns: u64,
    /// Eighth clock edge
    complete_ns: u64,
    event: WireEvent,
    begun: bool,
}

#[derive(Debug)]
struct BusState<const WIRE: usize, const EDGES: usize> {
    now_ns: u64,
    quantum_start_ns: u64,

    // Producer
    wire: Deque<Scheduled, WIRE>,
    send_cursor_ns: u64,

    // Shift register
    shifting: bool,
    latched: u8,
    complete: bool,
    overrun: bool,
    start: bool,

    // Output line
    line_high: bool,
    edges: Vec<Edge, EDGES>,
    dropped_edges: u32,
    late_waits: u32,
}

impl<const WIRE: usize, const EDGES: usize> BusState<WIRE, EDGES> {
    const fn new() -> Self {
        Self {
            now_ns: 0,
            quantum_start_ns: 0,
            wire: Deque::new(),
            send_cursor_ns: 0,
            shifting: false,
            latched: 0,
            complete: false,
            overrun: false,
            start: false,
            line_high: false,
            edges: Vec::new(),
            dropped_edges: 0,
            late_waits: 0,
        }
    }

    /// Move time forward, clocking in every wire event due by `t`
    fn advance_to(&mut self, t: u64) {
        while let Some(front) = self.wire.front_mut() {
            if front.start_ns > t {
                break;
            }
            if !front.begun {
                front.begun = true;
                if !self.shifting {
                    self.start = true;
                }
                self.shifting = true;
            }
            let event = front.event;
            let complete_ns = front.complete_ns;

            match event {
                // The counter is left mid-byte until someone resets it
                WireEvent::Glitch => {
                    self.wire.pop_front();
                }
                WireEvent::Byte(value) => {
                    if complete_ns > t {
                        break;
                    }
                    self.wire.pop_front();
                    self.shifting = false;
                    if self.complete {
                        self.overrun = true;
                    }
                    self.latched = value;
                    self.complete = true;
                }
            }
        }
        self.now_ns = self.now_ns.max(t);
    }

    fn schedule(&mut self, event: WireEvent, duration_ns: u64) -> Result<(), WireFull> {
        let start_ns = self.send_cursor_ns.max(self.now_ns);
        let complete_ns = start_ns + duration_ns;
        self.wire
            .push_back(Scheduled {
                start_ns,
                complete_ns,
                event,
                begun: false,
            })
            .map_err(|_| WireFull)?;
        self.send_cursor_ns = complete_ns;
        Ok(())
    }

    fn set_line(&mut self, high: bool) {
        if self.line_high == high {
            return;
        }
        self.line_high = high;
        let edge = Edge {
            at_ns: self.now_ns,
            high,
        };
        if self.edges.push(edge).is_err() {
            self.dropped_edges += 1;
        }
    }

    fn reset_counter(&mut self) {
        if let Some(front) = self.wire.front() {
            if front.begun {
                self.wire.pop_front();
            }
        }
        self.shifting = false;
    }
}

/// Simulated hardware shared by the scheduler and a test producer.
///
/// `WIRE` bounds the number of queued producer events, `EDGES` the number of
/// recorded output transitions.
pub struct SimBus<const WIRE: usize, const EDGES: usize> {
    inner: Mutex<RefCell<BusState<WIRE, EDGES>>>,
}

impl<const WIRE: usize, const EDGES: usize> SimBus<WIRE, EDGES> {
    /// Create a bus at time zero with an idle wire and a low line
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(BusState::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut BusState<WIRE, EDGES>) -> R) -> R {
        critical_section::with(|cs| {
            let mut state = self.inner.borrow(cs).borrow_mut();
            f(&mut state)
        })
    }

    /// Get the peripheral handle
    pub const fn peripheral(&self) -> SimPeripheral<'_, WIRE, EDGES> {
        SimPeripheral { bus: self }
    }

    /// Get the output line handle
    pub const fn line(&self) -> SimLine<'_, WIRE, EDGES> {
        SimLine { bus: self }
    }

    /// Get the quantum clock handle
    pub const fn clock(&self) -> SimClock<'_, WIRE, EDGES> {
        SimClock { bus: self }
    }

    /// Get a producer clocking bits at `bit_ns` per bit
    pub const fn sender(&self, bit_ns: u32) -> SimSender<'_, WIRE, EDGES> {
        SimSender { bus: self, bit_ns }
    }

    /// Current virtual time
    pub fn now_ns(&self) -> u64 {
        self.with(|state| state.now_ns)
    }

    /// Copy of the recorded line transitions
    pub fn edges(&self) -> Vec<Edge, EDGES> {
        self.with(|state| state.edges.clone())
    }

    /// Returns `true` while the output line is high
    pub fn line_is_high(&self) -> bool {
        self.with(|state| state.line_high)
    }

    /// Producer events not yet fully clocked in
    pub fn pending(&self) -> usize {
        self.with(|state| state.wire.len())
    }

    /// Edges that did not fit the recording
    pub fn dropped_edges(&self) -> u32 {
        self.with(|state| state.dropped_edges)
    }

    /// Clock waits that were already past their deadline
    pub fn late_waits(&self) -> u32 {
        self.with(|state| state.late_waits)
    }
}

impl<const WIRE: usize, const EDGES: usize> Default for SimBus<WIRE, EDGES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated shift-register input peripheral
#[derive(Clone, Copy)]
pub struct SimPeripheral<'a, const WIRE: usize, const EDGES: usize> {
    bus: &'a SimBus<WIRE, EDGES>,
}

impl<const WIRE: usize, const EDGES: usize> SerialPeripheral for SimPeripheral<'_, WIRE, EDGES> {
    fn status(&mut self) -> RawStatus {
        self.bus.with(|state| RawStatus {
            byte_complete: state.complete,
            overrun: state.overrun,
            start: state.start,
        })
    }

    fn read_latched(&mut self) -> u8 {
        self.bus.with(|state| {
            state.complete = false;
            state.overrun = false;
            state.latched
        })
    }

    fn take_start(&mut self) -> bool {
        self.bus
            .with(|state| core::mem::replace(&mut state.start, false))
    }

    fn reset_counter(&mut self) {
        self.bus.with(BusState::reset_counter);
    }
}

/// Simulated output line recording every transition
#[derive(Clone, Copy)]
pub struct SimLine<'a, const WIRE: usize, const EDGES: usize> {
    bus: &'a SimBus<WIRE, EDGES>,
}

impl<const WIRE: usize, const EDGES: usize> ErrorType for SimLine<'_, WIRE, EDGES> {
    type Error = Infallible;
}

impl<const WIRE: usize, const EDGES: usize> OutputPin for SimLine<'_, WIRE, EDGES> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.bus.with(|state| state.set_line(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.bus.with(|state| state.set_line(true));
        Ok(())
    }
}

/// Simulated quantum timebase
#[derive(Clone, Copy)]
pub struct SimClock<'a, const WIRE: usize, const EDGES: usize> {
    bus: &'a SimBus<WIRE, EDGES>,
}

impl<const WIRE: usize, const EDGES: usize> QuantumClock for SimClock<'_, WIRE, EDGES> {
    fn begin_quantum(&mut self) {
        self.bus.with(|state| state.quantum_start_ns = state.now_ns);
    }

    fn wait_until(&mut self, offset_ns: u32) -> bool {
        self.bus.with(|state| {
            let target = state.quantum_start_ns + u64::from(offset_ns);
            if state.now_ns > target {
                state.late_waits += 1;
                true
            } else {
                state.advance_to(target);
                false
            }
        })
    }
}

/// External producer clocking bytes onto the serial wire.
///
/// Events are queued back to back from the later of the current virtual
/// time and the end of the previous event.
#[derive(Clone, Copy)]
pub struct SimSender<'a, const WIRE: usize, const EDGES: usize> {
    bus: &'a SimBus<WIRE, EDGES>,
    bit_ns: u32,
}

impl<const WIRE: usize, const EDGES: usize> SimSender<'_, WIRE, EDGES> {
    /// Queue bytes, most significant bit first
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), WireFull> {
        let duration = 8 * u64::from(self.bit_ns);
        self.bus.with(|state| {
            bytes
                .iter()
                .try_for_each(|&byte| state.schedule(WireEvent::Byte(byte), duration))
        })
    }

    /// Queue a single spurious clock edge
    pub fn glitch(&mut self) -> Result<(), WireFull> {
        let duration = u64::from(self.bit_ns);
        self.bus
            .with(|state| state.schedule(WireEvent::Glitch, duration))
    }

    /// Keep the wire quiet for `ns` before the next event
    pub fn pause(&mut self, ns: u64) {
        self.bus.with(|state| {
            state.send_cursor_ns = state.send_cursor_ns.max(state.now_ns) + ns;
        });
    }

    /// Virtual time at which the last queued event completes
    pub fn finished_at_ns(&self) -> u64 {
        self.bus.with(|state| state.send_cursor_ns)
    }
}

impl<const WIRE: usize, const EDGES: usize> SmartLedsWrite for SimSender<'_, WIRE, EDGES> {
    type Error = WireFull;
    type Color = RGB8;

    /// Queue pixels in WS2812 wire order (green, red, blue)
    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        for item in iterator {
            let item = item.into();
            self.send(&[item.g, item.r, item.b])?;
        }
        Ok(())
    }
}
