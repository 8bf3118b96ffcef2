//! Minimal discrete-event time base.
//!
//! The instrumentation core only needs two things from a scheduler: the current tick
//! and a way to apply a mutation some cycles in the future. This module provides:
//! 1. **Time:** A shared [`SimTime`] handle that observers clone to read "now".
//! 2. **Payload Queue:** A due-ordered queue of deferred payloads with cancellation.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::sim::node::NodeId;

/// Absolute scheduler time.
pub type Tick = u64;

/// Shared read handle on the scheduler's current tick.
#[derive(Clone, Debug, Default)]
pub struct SimTime(Rc<Cell<Tick>>);

impl SimTime {
    /// Current tick.
    #[inline]
    pub fn now(&self) -> Tick {
        self.0.get()
    }

    fn set(&self, tick: Tick) {
        self.0.set(tick);
    }
}

/// Queue of payloads ordered by due tick, then by insertion order.
#[derive(Debug)]
pub struct PayloadQueue<T> {
    events: BTreeMap<(Tick, u64), T>,
    next_seq: u64,
}

impl<T> Default for PayloadQueue<T> {
    fn default() -> Self {
        Self {
            events: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> PayloadQueue<T> {
    /// Queues `payload` for delivery at `due`.
    pub fn schedule(&mut self, due: Tick, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let _ = self.events.insert((due, seq), payload);
    }

    /// Removes every queued payload for which `pred` returns true.
    ///
    /// Returns the number removed. Payloads already delivered are not counted.
    pub fn cancel_if(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.events.len();
        self.events.retain(|_, payload| !pred(payload));
        before - self.events.len()
    }

    /// Removes every queued payload equal to `payload`.
    pub fn cancel(&mut self, payload: &T) -> usize
    where
        T: PartialEq,
    {
        self.cancel_if(|p| p == payload)
    }

    /// Due tick of the earliest payload.
    pub fn next_due(&self) -> Option<Tick> {
        self.events.keys().next().map(|(due, _)| *due)
    }

    /// Pops the earliest payload if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Tick) -> Option<(Tick, T)> {
        let (&(due, seq), _) = self.events.iter().next()?;
        if due > now {
            return None;
        }
        self.events.remove(&(due, seq)).map(|p| (due, p))
    }

    /// Number of queued payloads.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A structural mutation deferred by a caller-supplied cycle delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferredOp {
    /// Start a cycle counter.
    StartCounting(NodeId),
    /// Stop a cycle counter.
    StopCounting(NodeId),
    /// Move a cycle histogram to a new value.
    SetHistogramValue(NodeId, u64),
}

impl DeferredOp {
    /// Node the operation targets.
    pub const fn target(&self) -> NodeId {
        match *self {
            Self::StartCounting(id) | Self::StopCounting(id) | Self::SetHistogramValue(id, _) => {
                id
            }
        }
    }
}

/// Scheduler state owned by the simulation tree.
#[derive(Debug, Default)]
pub struct Scheduler {
    time: SimTime,
    deferred: PayloadQueue<DeferredOp>,
}

impl Scheduler {
    /// Current tick.
    #[inline]
    pub fn now(&self) -> Tick {
        self.time.now()
    }

    /// Cloneable handle on the current tick.
    pub fn time(&self) -> SimTime {
        self.time.clone()
    }

    /// Queues `op` for `due`.
    pub fn defer(&mut self, due: Tick, op: DeferredOp) {
        self.deferred.schedule(due, op);
    }

    /// Deferred-operation queue.
    pub const fn deferred(&self) -> &PayloadQueue<DeferredOp> {
        &self.deferred
    }

    /// Mutable deferred-operation queue, used for cancellation.
    pub const fn deferred_mut(&mut self) -> &mut PayloadQueue<DeferredOp> {
        &mut self.deferred
    }

    pub(crate) fn set_now(&self, tick: Tick) {
        self.time.set(tick);
    }
}
