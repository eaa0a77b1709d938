//! Static worst-case timing model.
//!
//! Every quantum must fit inside one output bit period whatever happens in
//! it: a byte arriving or not, a cursor wrapping or not, the buffer draining
//! or not. The set of branches the scheduler can take is small and
//! enumerable, so it is checked exhaustively here instead of by example.
//!
//! Costs are counted in CPU cycles per primitive operation of the scheduler
//! and converted to nanoseconds with the CPU clock. Two constraints apply to
//! a streaming quantum:
//!
//! - the fixed-cost work before the fall (line rise, bit select) must
//!   complete before the short pulse ends;
//! - the line falls no earlier than the long pulse width, and everything
//!   after the fall must complete before the period ends.
//!
//! Non-streaming quanta service the receiver at the long-pulse mark, so
//! their work must fit between that mark and the end of the period.
//!
//! This is a design-time estimate. The figures of a [`CostModel`] come from
//! the target's instruction timings and are confirmed on the target by a
//! [`QuantumClock`](crate::QuantumClock) that reports late deadlines; the
//! scheduler counts those per state in
//! [`SessionStats::late_quanta`](crate::SessionStats::late_quanta).

use core::fmt;

use heapless::Vec;

use crate::config::BridgeConfig;

/// Upper bound on the number of distinct scheduler branches
pub const MAX_BRANCHES: usize = 32;

/// Scheduler state a branch belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Idle,
    Prefill,
    Streaming,
    DrainTimeout,
}

/// One reachable path through a single quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub state: BranchState,
    /// A byte (or start signal, when idle) was seen this quantum
    pub byte_arrived: bool,
    /// The write cursor wrapped to the origin
    pub push_wraps: bool,
    /// A byte was loaded into the generator (byte boundary or stream start)
    pub reload: bool,
    /// The read cursor wrapped to the origin
    pub pop_wraps: bool,
    /// The buffer was found empty at a byte boundary
    pub drained: bool,
}

impl Branch {
    const fn new(state: BranchState) -> Self {
        Self {
            state,
            byte_arrived: false,
            push_wraps: false,
            reload: false,
            pop_wraps: false,
            drained: false,
        }
    }
}

/// Modeled cost of one branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchCost {
    /// Work before the fall edge (streaming only)
    pub pre_fall_ns: u32,
    /// Time from quantum start until the last instruction of the quantum
    pub total_ns: u32,
}

/// Cycle costs of the scheduler primitives on a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    pub cpu_hz: u32,
    /// Drive the line high
    pub rise: u32,
    /// Drive the line low
    pub fall: u32,
    /// Read the receiver status flags
    pub status_check: u32,
    /// Read and clear the start-of-activity flag
    pub start_check: u32,
    /// Select the pulse width for the current bit
    pub bit_select: u32,
    /// Read the latched data register
    pub collect: u32,
    /// Store a byte at the write cursor and advance it
    pub store: u32,
    /// Compare a cursor against the end of the ring
    pub wrap_check: u32,
    /// Move a cursor back to the origin
    pub wrap_reset: u32,
    /// Compare the two cursors
    pub empty_check: u32,
    /// Load a byte at the read cursor and advance it
    pub pop: u32,
    /// Step to the next bit of the current byte
    pub bit_advance: u32,
    /// Reset both cursors at session start
    pub cursor_reset: u32,
    /// Update a wait counter and compare it with its limit
    pub counter: u32,
    /// State dispatch and loop back
    pub dispatch: u32,
}

impl Default for CostModel {
    /// Costs for an 80 MHz single-issue core with single-cycle GPIO
    fn default() -> Self {
        Self {
            cpu_hz: 80_000_000,
            rise: 2,
            fall: 2,
            status_check: 3,
            start_check: 3,
            bit_select: 2,
            collect: 2,
            store: 2,
            wrap_check: 2,
            wrap_reset: 1,
            empty_check: 3,
            pop: 2,
            bit_advance: 3,
            cursor_reset: 2,
            counter: 3,
            dispatch: 4,
        }
    }
}

impl CostModel {
    /// Set the CPU clock
    #[must_use]
    pub fn with_cpu_hz(mut self, cpu_hz: u32) -> Self {
        self.cpu_hz = cpu_hz;
        self
    }

    /// Convert cycles to nanoseconds, rounding up
    #[allow(clippy::cast_possible_truncation)]
    pub fn ns(&self, cycles: u32) -> u32 {
        let ns = (u64::from(cycles) * 1_000_000_000).div_ceil(u64::from(self.cpu_hz.max(1)));
        ns.min(u64::from(u32::MAX)) as u32
    }

    fn push_cycles(&self, branch: &Branch) -> u32 {
        if !branch.byte_arrived {
            return 0;
        }
        let wrap = if branch.push_wraps { self.wrap_reset } else { 0 };
        self.collect + self.store + self.wrap_check + wrap
    }

    fn reload_cycles(&self, branch: &Branch) -> u32 {
        if !branch.reload {
            return 0;
        }
        let wrap = if branch.pop_wraps { self.wrap_reset } else { 0 };
        self.pop + self.wrap_check + wrap
    }

    /// Modeled cost of a branch under `config`
    pub fn cost(&self, branch: &Branch, config: &BridgeConfig) -> BranchCost {
        match branch.state {
            BranchState::Streaming => {
                let pre_fall = self.rise + self.bit_select;
                let post_fall = self.fall
                    + self.status_check
                    + self.push_cycles(branch)
                    + self.bit_advance
                    + self.empty_check
                    + self.reload_cycles(branch)
                    + self.dispatch;
                let pre_fall_ns = self.ns(pre_fall);
                let fall_at = pre_fall_ns.max(config.timing.one_high_ns);
                BranchCost {
                    pre_fall_ns,
                    total_ns: fall_at + self.ns(post_fall),
                }
            }
            BranchState::Idle => {
                let reset = if branch.byte_arrived { self.cursor_reset } else { 0 };
                let cycles =
                    self.counter + self.start_check + self.status_check + reset + self.dispatch;
                BranchCost {
                    pre_fall_ns: 0,
                    total_ns: config.timing.one_high_ns + self.ns(cycles),
                }
            }
            BranchState::Prefill | BranchState::DrainTimeout => {
                let cycles = self.counter
                    + self.status_check
                    + self.push_cycles(branch)
                    + self.empty_check
                    + self.reload_cycles(branch)
                    + self.dispatch;
                BranchCost {
                    pre_fall_ns: 0,
                    total_ns: config.timing.one_high_ns + self.ns(cycles),
                }
            }
        }
    }
}

/// A branch that does not fit the bit period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingError {
    /// Fixed work before the fall edge outlasts the short pulse
    FallDeadline {
        branch: Branch,
        pre_fall_ns: u32,
        deadline_ns: u32,
    },
    /// The quantum's work outlasts the bit period
    PeriodOverrun {
        branch: Branch,
        total_ns: u32,
        period_ns: u32,
    },
    /// More branches than the list can hold
    BranchCapacity { capacity: usize },
}

impl fmt::Display for TimingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallDeadline {
                branch,
                pre_fall_ns,
                deadline_ns,
            } => write!(
                f,
                "{:?}: {} ns of work before a {} ns fall deadline",
                branch.state, pre_fall_ns, deadline_ns
            ),
            Self::PeriodOverrun {
                branch,
                total_ns,
                period_ns,
            } => write!(
                f,
                "{:?}: {} ns of work in a {} ns period",
                branch.state, total_ns, period_ns
            ),
            Self::BranchCapacity { capacity } => {
                write!(f, "more than {} scheduler branches", capacity)
            }
        }
    }
}

/// Outcome of a successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Most expensive branch
    pub worst: Branch,
    /// Its modeled duration
    pub worst_ns: u32,
    /// Remaining time in the period on the worst branch
    pub slack_ns: u32,
    /// Number of branches checked
    pub branches: usize,
}

/// Every path the scheduler can take through one quantum
pub fn branches() -> Result<Vec<Branch, MAX_BRANCHES>, TimingError> {
    collect_branches()
}

/// Enumerate the branches into a list of capacity `M`.
///
/// Fails rather than dropping a branch when `M` is too small.
pub fn collect_branches<const M: usize>() -> Result<Vec<Branch, M>, TimingError> {
    let mut all: Vec<Branch, M> = Vec::new();
    let mut add = |branch: Branch| {
        all.push(branch)
            .map_err(|_| TimingError::BranchCapacity { capacity: M })
    };
    let bools = [false, true];

    for start in bools {
        let mut branch = Branch::new(BranchState::Idle);
        branch.byte_arrived = start;
        add(branch)?;
    }

    for state in [BranchState::Prefill, BranchState::DrainTimeout] {
        for arrived in bools {
            for push_wraps in bools {
                if push_wraps && !arrived {
                    continue;
                }
                for reload in bools {
                    for pop_wraps in bools {
                        if pop_wraps && !reload {
                            continue;
                        }
                        // Drain only reloads on the byte it just received
                        if state == BranchState::DrainTimeout && reload != arrived {
                            continue;
                        }
                        add(Branch {
                            state,
                            byte_arrived: arrived,
                            push_wraps,
                            reload,
                            pop_wraps,
                            drained: false,
                        })?;
                    }
                }
            }
        }
    }

    for arrived in bools {
        for push_wraps in bools {
            if push_wraps && !arrived {
                continue;
            }
            let mut branch = Branch::new(BranchState::Streaming);
            branch.byte_arrived = arrived;
            branch.push_wraps = push_wraps;
            add(branch)?;

            for pop_wraps in bools {
                add(Branch {
                    reload: true,
                    pop_wraps,
                    ..branch
                })?;
            }
            // A byte stored this quantum keeps the buffer non-empty
            if !arrived {
                add(Branch {
                    drained: true,
                    ..branch
                })?;
            }
        }
    }

    Ok(all)
}

/// Check every reachable branch against the bit timing of `config`.
pub fn verify(config: &BridgeConfig, model: &CostModel) -> Result<Budget, TimingError> {
    let timing = config.timing;
    let mut worst: Option<(Branch, u32)> = None;
    let all = branches()?;

    for branch in &all {
        let cost = model.cost(branch, config);
        if branch.state == BranchState::Streaming && cost.pre_fall_ns > timing.zero_high_ns {
            return Err(TimingError::FallDeadline {
                branch: *branch,
                pre_fall_ns: cost.pre_fall_ns,
                deadline_ns: timing.zero_high_ns,
            });
        }
        if cost.total_ns > timing.period_ns {
            return Err(TimingError::PeriodOverrun {
                branch: *branch,
                total_ns: cost.total_ns,
                period_ns: timing.period_ns,
            });
        }
        if worst.is_none_or(|(_, ns)| cost.total_ns > ns) {
            worst = Some((*branch, cost.total_ns));
        }
    }

    let (worst, worst_ns) = worst.unwrap_or((Branch::new(BranchState::Idle), 0));
    Ok(Budget {
        worst,
        worst_ns,
        slack_ns: timing.period_ns - worst_ns,
        branches: all.len(),
    })
}
