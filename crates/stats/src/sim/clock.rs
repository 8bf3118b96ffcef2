//! Clock domains.
//!
//! A clock converts scheduler ticks into cycles. Every node resolves its clock by
//! walking up to the nearest ancestor with one assigned; the root always has one.

use crate::sim::scheduler::Tick;

/// Index of a clock registered in a [`SimTree`](crate::sim::SimTree).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockId(pub(crate) usize);

/// A clock domain with a fixed period.
#[derive(Clone, Debug, PartialEq)]
pub struct Clock {
    name: String,
    period: Tick,
    frequency_mhz: f64,
}

impl Clock {
    /// Creates a clock. A zero period is clamped to one tick.
    pub fn new(name: impl Into<String>, period: Tick, frequency_mhz: f64) -> Self {
        Self {
            name: name.into(),
            period: period.max(1),
            frequency_mhz,
        }
    }

    /// Clock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticks per cycle.
    #[inline]
    pub const fn period(&self) -> Tick {
        self.period
    }

    /// Frequency in MHz, exposed to expressions as `freq_mhz`.
    #[inline]
    pub const fn frequency_mhz(&self) -> f64 {
        self.frequency_mhz
    }

    /// Cycle containing `tick`.
    #[inline]
    pub const fn cycle_at(&self, tick: Tick) -> u64 {
        tick / self.period
    }

    /// First tick of `cycle`.
    #[inline]
    pub const fn tick_of(&self, cycle: u64) -> Tick {
        cycle.saturating_mul(self.period)
    }
}
