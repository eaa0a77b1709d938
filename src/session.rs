/// Where the scheduler is in the session lifecycle
///
/// Counters carried by the waiting states are measured in quanta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Line low, waiting for a start-of-activity signal
    #[default]
    Idle,
    /// Collecting the head-start bytes before output begins
    Prefill {
        /// Quanta since the last byte (or since the start signal)
        waited: u32,
    },
    /// Emitting one bit per quantum
    Streaming,
    /// Buffer drained at a byte boundary; waiting for a byte in flight
    DrainTimeout {
        /// Quanta since the buffer drained
        waited: u32,
    },
}

impl SessionState {
    /// Returns `true` while the output line carries data
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Returns `true` when no session is in progress
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Diagnostic counters.
///
/// Observation only; nothing in the scheduler branches on these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions that reached streaming
    pub sessions: u32,
    /// Start signals rejected as noise
    pub noise_starts: u32,
    /// Bytes received in the current or last session
    pub bytes_in: u32,
    /// Bytes emitted in the current or last session
    pub bytes_out: u32,
    /// Quanta whose work overran a clock deadline, since power-on
    pub late_quanta: LateQuanta,
}

impl SessionStats {
    pub(crate) fn begin_session(&mut self) {
        self.bytes_in = 0;
        self.bytes_out = 0;
    }
}

/// Late quanta counted by the state the quantum started in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LateQuanta {
    pub idle: u32,
    pub prefill: u32,
    pub streaming: u32,
    pub drain: u32,
}

impl LateQuanta {
    pub(crate) fn record(&mut self, state: SessionState) {
        let counter = match state {
            SessionState::Idle => &mut self.idle,
            SessionState::Prefill { .. } => &mut self.prefill,
            SessionState::Streaming => &mut self.streaming,
            SessionState::DrainTimeout { .. } => &mut self.drain,
        };
        *counter = counter.saturating_add(1);
    }

    /// Late quanta across all states
    pub const fn total(&self) -> u32 {
        self.idle
            .saturating_add(self.prefill)
            .saturating_add(self.streaming)
            .saturating_add(self.drain)
    }
}
