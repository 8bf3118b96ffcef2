//! Counter family.
//!
//! Counters are the cheapest observation points: a 64-bit unsigned value updated by
//! model code. Three update disciplines exist:
//! 1. **Plain:** Value owned by the counter, incremented or assigned per its behavior.
//! 2. **Cycle:** Value grows by a multiplier every cycle while counting.
//! 3. **Read-only:** Value read from an externally owned integer.
//!
//! All three are carried by the tagged [`CounterNode`] variant; only `value` is
//! polymorphic. Values wrap silently on overflow.

/// Plain counter.
pub mod basic;

/// Cycle counter.
pub mod cycle;

/// Read-only counter.
pub mod read_only;

pub use basic::Counter;
pub use cycle::CycleCounter;
pub use read_only::{CounterSource, ReadOnlyCounter};

use thiserror::Error;

/// Update discipline of a counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CounterBehavior {
    /// Monotonically non-decreasing, add-only.
    #[default]
    Normal,
    /// Add-only running sum of a per-cycle variable.
    Integral,
    /// Most recent observation; may be assigned any value.
    Latest,
}

impl CounterBehavior {
    /// True for the add-only disciplines.
    #[inline]
    pub const fn is_add_only(self) -> bool {
        matches!(self, Self::Normal | Self::Integral)
    }
}

/// Why a counter rejected an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum IllegalUpdate {
    /// Assignment to an add-only counter.
    #[error("cannot assign to a {0:?} counter")]
    AssignAddOnly(CounterBehavior),
    /// Increment of a `Latest` counter.
    #[error("cannot increment a Latest counter")]
    IncrementLatest,
    /// `start_counting` while already counting.
    #[error("cycle counter is already counting")]
    AlreadyCounting,
    /// `stop_counting` while not counting.
    #[error("cycle counter is not counting")]
    NotCounting,
    /// Any write to a read-only counter.
    #[error("counter is read-only")]
    ReadOnly,
    /// Increment of a cycle counter, which only advances with its clock.
    #[error("cycle counters advance with their clock; use start_counting/stop_counting")]
    IncrementCycle,
    /// A cycle counter cannot use `Latest`.
    #[error("cycle counters must be Normal or Integral")]
    LatestCycleCounter,
}

/// Tagged counter variant stored in the simulation tree.
#[derive(Debug)]
pub enum CounterNode {
    /// Plain counter.
    Plain(Counter),
    /// Cycle counter.
    Cycle(CycleCounter),
    /// Read-only counter.
    ReadOnly(ReadOnlyCounter),
}

impl CounterNode {
    /// Current value given the current cycle of the counter's clock.
    pub fn value(&self, current_cycle: u64) -> u64 {
        match self {
            Self::Plain(c) => c.get(),
            Self::Cycle(c) => c.value_at(current_cycle),
            Self::ReadOnly(c) => c.get(),
        }
    }

    /// Update discipline.
    pub const fn behavior(&self) -> CounterBehavior {
        match self {
            Self::Plain(c) => c.behavior(),
            Self::Cycle(c) => c.behavior(),
            Self::ReadOnly(c) => c.behavior(),
        }
    }

    /// Serializer hint; every integral counter compresses well.
    pub const fn supports_compression(&self) -> bool {
        true
    }
}
