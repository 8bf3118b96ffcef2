//! Instrumentation, statistics, and report library for discrete-event performance models.
//!
//! This crate implements the observation side of a hardware model with the following:
//! 1. **Observables:** Counters, statistic definitions, context counters, and histograms.
//! 2. **Expressions:** Arithmetic over observables, evaluated as deltas between snapshots.
//! 3. **Timers:** Pooled state timers accumulating cycles per state into histograms.
//! 4. **Reports:** Nested statistic selections with triggers, filters, and text/CSV/JSON output.
//! 5. **Definitions:** YAML report definitions walked against the simulation tree.

/// Common types and constants (attributes, visibility, errors).
pub mod common;
/// Library configuration (histogram defaults, timer pools, triggers, definitions).
pub mod config;
/// Per-context counters with aggregation.
pub mod context_counter;
/// Plain, cycle, and read-only counters.
pub mod counter;
/// Expression language (lexer, parser, resolution, evaluation).
pub mod expr;
/// Attribute filter language.
pub mod filter;
/// Value, cycle, enumerated, and state histograms.
pub mod histogram;
/// Report model, population, triggers, and formatters.
pub mod report;
/// YAML report definitions.
pub mod report_def;
/// Simulation substrate (tree, clocks, scheduler, phases).
pub mod sim;
/// Statistic definitions and instances.
pub mod statistic;
/// State-timer units and handles.
pub mod timer;

/// Crate-wide error and result types.
pub use crate::common::{Result, StatsError};
/// Root configuration type; use `StatsConfig::default()` or deserialize from JSON.
pub use crate::config::StatsConfig;
/// Report tree; construct with `Report::new` or from a definition file.
pub use crate::report::Report;
/// Simulation tree hosting every observable; construct with `SimTree::new`.
pub use crate::sim::SimTree;
