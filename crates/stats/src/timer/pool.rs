//! Timer pool and handles.

use std::any::{TypeId, type_name};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::common::{Result, StatsError};
use crate::histogram::StateEnum;
use crate::sim::node::NodeId;
use crate::sim::scheduler::{SimTime, Tick};

/// Per-state-set bookkeeping shared by every timer.
#[derive(Debug)]
pub(crate) struct StateSet {
    pub(crate) name: String,
    pub(crate) names: Vec<String>,
    pub(crate) cells: Vec<Rc<Cell<u64>>>,
    pub(crate) histogram: NodeId,
}

/// One timer's view of one state set.
#[derive(Clone, Debug, Default)]
struct SetTimer {
    deltas: Vec<u64>,
    active: Option<(usize, u64)>,
}

impl SetTimer {
    fn with_states(n: usize) -> Self {
        Self {
            deltas: vec![0; n],
            active: None,
        }
    }

    fn close_span(&mut self, cycle: u64) {
        if let Some((state, start)) = self.active {
            if let Some(delta) = self.deltas.get_mut(state) {
                *delta += cycle.saturating_sub(start);
            }
            self.active = Some((state, cycle));
        }
    }
}

#[derive(Clone, Debug, Default)]
struct TimerState {
    generation: u32,
    sets: Vec<SetTimer>,
}

/// Slot and generation of a handed-out timer. The generation advances every time the
/// slot is released, so a handle from an earlier allocation no longer matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TimerId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

/// Pool shared between a unit and its handles.
#[derive(Debug)]
pub(crate) struct Pool {
    pub(crate) unit: String,
    time: SimTime,
    period: Tick,
    timers: Vec<TimerState>,
    free: Vec<usize>,
    active: BTreeSet<usize>,
    pub(crate) sets: Vec<StateSet>,
    set_index: HashMap<TypeId, usize>,
    growth: usize,
    cap: usize,
}

impl Pool {
    pub(crate) fn new(
        unit: String,
        time: SimTime,
        period: Tick,
        initial: usize,
        growth: usize,
        cap: usize,
    ) -> Self {
        let initial = initial.min(cap);
        Self {
            unit,
            time,
            period: period.max(1),
            timers: vec![TimerState::default(); initial],
            free: (0..initial).rev().collect(),
            active: BTreeSet::new(),
            sets: Vec::new(),
            set_index: HashMap::new(),
            growth: growth.max(1),
            cap,
        }
    }

    fn cycle(&self) -> u64 {
        self.time.now() / self.period
    }

    pub(crate) fn capacity(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn num_active(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn add_set<S: StateEnum>(&mut self, set: StateSet) -> usize {
        let index = self.sets.len();
        let states = set.names.len();
        self.sets.push(set);
        let _ = self.set_index.insert(TypeId::of::<S>(), index);
        for timer in &mut self.timers {
            timer.sets.push(SetTimer::with_states(states));
        }
        index
    }

    pub(crate) fn set_of<S: StateEnum>(&self) -> Result<usize> {
        self.set_index
            .get(&TypeId::of::<S>())
            .copied()
            .ok_or_else(|| StatsError::unresolved(type_name::<S>(), self.unit.clone()))
    }

    fn fresh_timer(&self) -> TimerState {
        TimerState {
            generation: 0,
            sets: self
                .sets
                .iter()
                .map(|s| SetTimer::with_states(s.names.len()))
                .collect(),
        }
    }

    pub(crate) fn allocate(&mut self) -> Result<TimerId> {
        if self.free.is_empty() {
            let len = self.timers.len();
            if len >= self.cap {
                return Err(StatsError::PoolExhausted { cap: self.cap });
            }
            let added = self.growth.min(self.cap - len);
            warn!(
                unit = %self.unit,
                from = len,
                to = len + added,
                "state timer pool growing"
            );
            for i in 0..added {
                self.timers.push(self.fresh_timer());
                self.free.push(len + added - 1 - i);
            }
        }
        let index = self
            .free
            .pop()
            .ok_or(StatsError::PoolExhausted { cap: self.cap })?;
        let mut fresh = self.fresh_timer();
        let timer = self
            .timers
            .get_mut(index)
            .ok_or(StatsError::PoolExhausted { cap: self.cap })?;
        fresh.generation = timer.generation;
        *timer = fresh;
        let _ = self.active.insert(index);
        Ok(TimerId {
            index,
            generation: timer.generation,
        })
    }

    fn owns(&self, id: TimerId) -> bool {
        self.active.contains(&id.index)
            && self
                .timers
                .get(id.index)
                .is_some_and(|t| t.generation == id.generation)
    }

    fn live_set_timer(&mut self, id: TimerId, set: usize) -> Result<&mut SetTimer> {
        if !self.owns(id) {
            return Err(StatsError::DetachedTimer);
        }
        self.set_timer(id.index, set)
    }

    fn set_timer(&mut self, timer: usize, set: usize) -> Result<&mut SetTimer> {
        self.timers
            .get_mut(timer)
            .and_then(|t| t.sets.get_mut(set))
            .ok_or(StatsError::DetachedTimer)
    }

    pub(crate) fn start_state(&mut self, timer: TimerId, set: usize, state: usize) -> Result<()> {
        let cycle = self.cycle();
        let st = self.live_set_timer(timer, set)?;
        st.close_span(cycle);
        st.active = Some((state, cycle));
        Ok(())
    }

    pub(crate) fn end_state(&mut self, timer: TimerId, set: usize, state: usize) -> Result<()> {
        let cycle = self.cycle();
        let st = self.live_set_timer(timer, set)?;
        match st.active {
            Some((active, _)) if active == state => {
                st.close_span(cycle);
                st.active = None;
                Ok(())
            }
            _ => {
                let set_data = &self.sets[set];
                Err(StatsError::NoActiveState {
                    set: set_data.name.clone(),
                    state: set_data
                        .names
                        .get(state)
                        .cloned()
                        .unwrap_or_else(|| state.to_string()),
                })
            }
        }
    }

    pub(crate) fn active_state(&self, timer: TimerId, set: usize) -> Result<Option<usize>> {
        if !self.owns(timer) {
            return Err(StatsError::DetachedTimer);
        }
        Ok(self
            .timers
            .get(timer.index)
            .and_then(|t| t.sets.get(set))
            .and_then(|st| st.active.map(|(state, _)| state)))
    }

    /// Moves accumulated deltas of `timer` in `set` into the histogram cells.
    fn flush(&mut self, timer: usize, set: usize, cycle: u64) {
        let Some(st) = self.timers.get_mut(timer).and_then(|t| t.sets.get_mut(set)) else {
            return;
        };
        st.close_span(cycle);
        let cells = &self.sets[set].cells;
        for (delta, cell) in st.deltas.iter_mut().zip(cells) {
            cell.set(cell.get() + *delta);
            *delta = 0;
        }
    }

    pub(crate) fn flush_active(&mut self, set: Option<usize>) {
        let cycle = self.cycle();
        let active: Vec<usize> = self.active.iter().copied().collect();
        let sets: Vec<usize> = match set {
            Some(s) => vec![s],
            None => (0..self.sets.len()).collect(),
        };
        for timer in active {
            for s in &sets {
                self.flush(timer, *s, cycle);
            }
        }
    }

    /// Returns the timer to the pool if `timer` still owns its slot.
    pub(crate) fn release(&mut self, timer: TimerId) {
        if self.owns(timer) {
            self.release_slot(timer.index);
        }
    }

    fn release_slot(&mut self, timer: usize) {
        if !self.active.remove(&timer) {
            return;
        }
        let cycle = self.cycle();
        for set in 0..self.sets.len() {
            self.flush(timer, set, cycle);
            if let Ok(st) = self.set_timer(timer, set) {
                st.active = None;
            }
        }
        if let Some(state) = self.timers.get_mut(timer) {
            state.generation = state.generation.wrapping_add(1);
        }
        self.free.push(timer);
    }

    pub(crate) fn release_all(&mut self) {
        let active: Vec<usize> = self.active.iter().copied().collect();
        for timer in active {
            self.release_slot(timer);
        }
    }

    pub(crate) fn display(&self, set: usize) -> String {
        let data = &self.sets[set];
        data.names
            .iter()
            .zip(&data.cells)
            .map(|(name, cell)| format!("{name}:{}", cell.get()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Handle on a pooled timer; dropping it flushes the timer and returns it to the pool.
///
/// A handle that outlives its unit, or whose timer was released by
/// [`teardown`](super::StateTimerUnit::teardown), becomes inert: every method fails
/// with [`StatsError::DetachedTimer`] and dropping it does nothing.
pub struct StateTimer {
    id: TimerId,
    pool: Weak<RefCell<Pool>>,
}

impl fmt::Debug for StateTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTimer")
            .field("index", &self.id.index)
            .field("generation", &self.id.generation)
            .field("attached", &(self.pool.strong_count() > 0))
            .finish()
    }
}

impl StateTimer {
    pub(crate) const fn new(id: TimerId, pool: Weak<RefCell<Pool>>) -> Self {
        Self { id, pool }
    }

    fn with_pool<T>(&self, f: impl FnOnce(&mut Pool) -> Result<T>) -> Result<T> {
        let pool = self.pool.upgrade().ok_or(StatsError::DetachedTimer)?;
        let mut pool = pool.try_borrow_mut().map_err(|_| StatsError::DetachedTimer)?;
        f(&mut pool)
    }

    /// Pool slot of this timer.
    pub const fn index(&self) -> usize {
        self.id.index
    }

    /// Enters `state`, ending whichever state of the same set was active.
    pub fn start_state<S: StateEnum>(&self, state: S) -> Result<()> {
        self.with_pool(|pool| {
            let set = pool.set_of::<S>()?;
            pool.start_state(self.id, set, state.index())
        })
    }

    /// Leaves `state`, which must be the active state of its set.
    pub fn end_state<S: StateEnum>(&self, state: S) -> Result<()> {
        self.with_pool(|pool| {
            let set = pool.set_of::<S>()?;
            pool.end_state(self.id, set, state.index())
        })
    }

    /// Index of the active state of set `S`.
    pub fn active_state<S: StateEnum>(&self) -> Result<Option<usize>> {
        self.with_pool(|pool| {
            let set = pool.set_of::<S>()?;
            pool.active_state(self.id, set)
        })
    }

    /// True while the owning unit is alive and this handle still owns its slot.
    pub fn is_attached(&self) -> bool {
        let Some(pool) = self.pool.upgrade() else {
            return false;
        };
        pool.try_borrow().is_ok_and(|p| p.owns(self.id))
    }
}

impl Drop for StateTimer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            if let Ok(mut pool) = pool.try_borrow_mut() {
                pool.release(self.id);
            }
        }
    }
}
