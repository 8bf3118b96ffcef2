//! Threshold watches on plain counters.
//!
//! A watch is the scheduler hook a simple trigger lowers to: instead of polling
//! `counter OP threshold` every cycle, the tree checks the comparison each time the
//! counter is written and records the tick of the first write that satisfies it,
//! together with a sample of every counter taken right after that write.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::expr::ast::Comparison;
use crate::expr::eval::Baseline;
use crate::sim::node::NodeId;
use crate::sim::scheduler::Tick;

/// One-shot `counter OP threshold` watch.
#[derive(Debug)]
pub struct CounterWatch {
    counter: NodeId,
    comparison: Comparison,
    threshold: f64,
    fired_at: Cell<Option<Tick>>,
    sample: RefCell<Option<Rc<Baseline>>>,
}

impl CounterWatch {
    /// Creates an armed watch.
    pub const fn new(counter: NodeId, comparison: Comparison, threshold: f64) -> Self {
        Self {
            counter,
            comparison,
            threshold,
            fired_at: Cell::new(None),
            sample: RefCell::new(None),
        }
    }

    /// Watched counter.
    pub const fn counter(&self) -> NodeId {
        self.counter
    }

    /// Comparison applied as `value OP threshold`.
    pub const fn comparison(&self) -> Comparison {
        self.comparison
    }

    /// Right-hand side of the comparison.
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Tick at which the watch fired, if it has.
    pub fn fired_at(&self) -> Option<Tick> {
        self.fired_at.get()
    }

    /// Tree sample taken when the watch fired.
    pub fn sample(&self) -> Option<Rc<Baseline>> {
        self.sample.borrow().clone()
    }

    /// Re-arms the watch.
    pub fn reset(&self) {
        self.fired_at.set(None);
        let _ = self.sample.borrow_mut().take();
    }

    pub(crate) fn record_sample(&self, sample: Rc<Baseline>) {
        *self.sample.borrow_mut() = Some(sample);
    }

    /// Records `now` if `value` satisfies the comparison and the watch is armed.
    ///
    /// Returns true when this call fired the watch.
    pub(crate) fn observe(&self, value: u64, now: Tick) -> bool {
        if self.fired_at.get().is_some() {
            return false;
        }
        if self.comparison.apply(value as f64, self.threshold) {
            self.fired_at.set(Some(now));
            return true;
        }
        false
    }
}
