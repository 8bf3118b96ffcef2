//! State-timer unit.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info};

use super::pool::{Pool, StateSet, StateTimer};
use crate::common::{Result, Visibility};
use crate::config::StateTimerConfig;
use crate::histogram::StateEnum;
use crate::sim::node::NodeId;
use crate::sim::tree::SimTree;

/// Owns a pool of state timers and one state histogram per registered state set.
///
/// Dropping the unit releases every still-active timer first, so no cycles are lost.
#[derive(Debug)]
pub struct StateTimerUnit {
    node: NodeId,
    pool: Rc<RefCell<Pool>>,
}

impl StateTimerUnit {
    /// Creates the unit as a resource node `name` under `parent`.
    pub fn new(
        tree: &mut SimTree,
        parent: NodeId,
        name: &str,
        config: &StateTimerConfig,
    ) -> Result<Self> {
        let node = tree.add_resource(parent, name)?;
        let clock = tree.clock_of(node)?;
        let period = tree.clock(clock).period();
        let pool = Pool::new(
            tree.location(node),
            tree.time(),
            period,
            config.initial,
            config.growth,
            config.cap,
        );
        debug!(
            unit = %tree.location(node),
            initial = config.initial,
            cap = config.cap,
            "created state timer unit"
        );
        Ok(Self {
            node,
            pool: Rc::new(RefCell::new(pool)),
        })
    }

    /// Node hosting the unit's histograms.
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Registers state set `S` and creates its histogram, named `name`.
    pub fn register_state_set<S: StateEnum>(
        &self,
        tree: &mut SimTree,
        name: &str,
        visibility: Visibility,
    ) -> Result<NodeId> {
        let names: Vec<String> = S::names().iter().map(|s| (*s).to_string()).collect();
        let cells: Vec<Rc<Cell<u64>>> = (0..names.len()).map(|_| Rc::new(Cell::new(0))).collect();
        let histogram = tree.add_state_histogram(
            self.node,
            name,
            &format!("Cycles per state of {name}"),
            names.clone(),
            &cells,
            visibility,
        )?;
        let _ = self.pool.borrow_mut().add_set::<S>(StateSet {
            name: name.to_string(),
            names,
            cells,
            histogram,
        });
        Ok(histogram)
    }

    /// State histogram of set `S`.
    pub fn histogram_of<S: StateEnum>(&self) -> Result<NodeId> {
        let pool = self.pool.borrow();
        let set = pool.set_of::<S>()?;
        Ok(pool.sets[set].histogram)
    }

    /// Takes a timer from the pool, growing it when empty.
    pub fn allocate(&self) -> Result<StateTimer> {
        let id = self.pool.borrow_mut().allocate()?;
        Ok(StateTimer::new(id, Rc::downgrade(&self.pool)))
    }

    /// Flushes every active timer into the histograms without releasing any.
    pub fn dynamic_query(&self) {
        self.pool.borrow_mut().flush_active(None);
    }

    /// Flushes set `S` only and returns its cumulative per-state cycles as
    /// `name:cycles` pairs.
    pub fn dynamic_query_set<S: StateEnum>(&self) -> Result<String> {
        let mut pool = self.pool.borrow_mut();
        let set = pool.set_of::<S>()?;
        pool.flush_active(Some(set));
        Ok(pool.display(set))
    }

    /// Timers currently handed out.
    pub fn num_active(&self) -> usize {
        self.pool.borrow().num_active()
    }

    /// Timers allocated so far, active or free.
    pub fn capacity(&self) -> usize {
        self.pool.borrow().capacity()
    }

    /// Releases every active timer. Handles still held elsewhere become inert.
    pub fn teardown(&self) {
        let mut pool = self.pool.borrow_mut();
        let active = pool.num_active();
        pool.release_all();
        if active > 0 {
            info!(unit = %pool.unit, released = active, "state timer unit torn down");
        }
    }
}

impl Drop for StateTimerUnit {
    fn drop(&mut self) {
        if let Ok(mut pool) = self.pool.try_borrow_mut() {
            pool.release_all();
        }
    }
}
