//! Cycle counter.
//!
//! While counting, the logical value is `stored + (now - start) * multiplier`, measured
//! in cycles of the counter's clock; while idle it is frozen at `stored`. Delayed
//! starts and stops are applied by the tree's deferred-operation queue, so this type
//! tracks both the applied state and the state the queue will eventually produce.

use super::{CounterBehavior, IllegalUpdate};
use crate::sim::clock::ClockId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Span {
    start: u64,
    multiplier: u64,
}

/// Counter that accumulates elapsed cycles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleCounter {
    behavior: CounterBehavior,
    clock: ClockId,
    stored: u64,
    span: Option<Span>,
    multiplier: u64,
    scheduled_counting: bool,
}

impl CycleCounter {
    /// Creates an idle cycle counter on `clock` with multiplier 1.
    pub const fn new(behavior: CounterBehavior, clock: ClockId) -> Result<Self, IllegalUpdate> {
        if !behavior.is_add_only() {
            return Err(IllegalUpdate::LatestCycleCounter);
        }
        Ok(Self {
            behavior,
            clock,
            stored: 0,
            span: None,
            multiplier: 1,
            scheduled_counting: false,
        })
    }

    /// Update discipline.
    #[inline]
    pub const fn behavior(&self) -> CounterBehavior {
        self.behavior
    }

    /// Clock whose cycles are counted.
    #[inline]
    pub const fn clock(&self) -> ClockId {
        self.clock
    }

    /// Value at `cycle`.
    #[inline]
    pub const fn value_at(&self, cycle: u64) -> u64 {
        match self.span {
            Some(span) => self
                .stored
                .wrapping_add(cycle.saturating_sub(span.start).wrapping_mul(span.multiplier)),
            None => self.stored,
        }
    }

    /// True while the counter is accumulating.
    #[inline]
    pub const fn is_counting(&self) -> bool {
        self.span.is_some()
    }

    /// True if the counter will be counting once queued operations apply.
    #[inline]
    pub const fn will_be_counting(&self) -> bool {
        self.scheduled_counting
    }

    /// Multiplier applied to newly started spans.
    #[inline]
    pub const fn multiplier(&self) -> u64 {
        self.multiplier
    }

    /// Records a start request; fails if one is already outstanding.
    pub(crate) const fn request_start(&mut self) -> Result<(), IllegalUpdate> {
        if self.scheduled_counting {
            return Err(IllegalUpdate::AlreadyCounting);
        }
        self.scheduled_counting = true;
        Ok(())
    }

    /// Records a stop request; fails if no start is outstanding.
    pub(crate) const fn request_stop(&mut self) -> Result<(), IllegalUpdate> {
        if !self.scheduled_counting {
            return Err(IllegalUpdate::NotCounting);
        }
        self.scheduled_counting = false;
        Ok(())
    }

    /// Starts counting at `cycle`.
    pub(crate) const fn begin(&mut self, cycle: u64) {
        if self.span.is_none() {
            self.span = Some(Span {
                start: cycle,
                multiplier: self.multiplier,
            });
        }
    }

    /// Stops counting at `cycle`, folding the span into the stored value.
    pub(crate) const fn end(&mut self, cycle: u64) {
        self.stored = self.value_at(cycle);
        self.span = None;
    }

    /// Stops and restarts at `cycle` with a new multiplier, preserving the value.
    pub(crate) const fn rebase(&mut self, cycle: u64, multiplier: u64) {
        let counting = self.span.is_some();
        if counting {
            self.end(cycle);
        }
        self.multiplier = multiplier;
        if counting {
            self.begin(cycle);
        }
    }
}
