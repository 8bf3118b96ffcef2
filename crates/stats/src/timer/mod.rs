//! State timers.
//!
//! A [`StateTimerUnit`] hands out pooled [`StateTimer`] handles. Each timer tracks,
//! per registered state set, which state is active and how many cycles each state
//! has accumulated. Deltas reach the set's state histogram when the timer is
//! released (its handle dropped), on [`StateTimerUnit::dynamic_query`], and when the
//! unit is torn down.
//!
//! ```
//! use perfstat_core::SimTree;
//! use perfstat_core::common::Visibility;
//! use perfstat_core::config::StateTimerConfig;
//! use perfstat_core::timer::StateTimerUnit;
//!
//! perfstat_core::state_enum! {
//!     pub enum Phase { Wait, Run }
//! }
//!
//! let mut tree = SimTree::new();
//! let root = tree.root();
//! let unit = StateTimerUnit::new(&mut tree, root, "lsu", &StateTimerConfig::default()).unwrap();
//! unit.register_state_set::<Phase>(&mut tree, "phase", Visibility::NORMAL).unwrap();
//!
//! let timer = unit.allocate().unwrap();
//! timer.start_state(Phase::Wait).unwrap();
//! tree.advance(3);
//! timer.start_state(Phase::Run).unwrap();
//! tree.advance(2);
//! drop(timer);
//! assert_eq!(unit.dynamic_query_set::<Phase>().unwrap(), "Wait:3 Run:2");
//! ```

mod pool;
mod unit;

pub use pool::StateTimer;
pub use unit::StateTimerUnit;
