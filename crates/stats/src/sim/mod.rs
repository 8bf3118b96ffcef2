//! Simulation substrate hosting the instrumentation core.
//!
//! This module provides the pieces of a discrete-event simulator the core depends on:
//! 1. **Tree:** An arena of nodes with relative and wildcard path lookup.
//! 2. **Clocks:** Tick-to-cycle conversion per clock domain.
//! 3. **Scheduler:** Current tick and a cancellable queue of deferred operations.
//! 4. **Lifecycle:** Phases gating construction, finalization, and teardown.

/// Clock domains.
pub mod clock;

/// Arena nodes and node kinds.
pub mod node;

/// Dotted paths and wildcard segments.
pub mod path;

/// Lifecycle phases.
pub mod phase;

/// Time base and deferred-operation queue.
pub mod scheduler;

/// The simulation tree.
pub mod tree;

/// Counter threshold watches.
pub mod watch;

pub use clock::{Clock, ClockId};
pub use node::{Group, Node, NodeId, NodeKind, Parameter};
pub use phase::Phase;
pub use scheduler::{DeferredOp, PayloadQueue, Scheduler, SimTime, Tick};
pub use tree::{PathMatch, SimTree};
pub use watch::CounterWatch;
