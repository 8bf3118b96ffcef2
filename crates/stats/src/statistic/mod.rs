//! Statistic definitions and instances.
//!
//! A [`StatisticDef`] is a named expression living in the tree. A
//! [`StatisticInstance`] is one report's view of a counter, definition, or expression,
//! owning the start snapshot that makes reported values deltas.

/// Statistic definitions.
pub mod definition;

/// Statistic instances.
pub mod instance;

pub use definition::{ExpressionSource, SnapshotMode, StatisticDef, SubStatistic};
pub use instance::{InstanceTarget, StatisticInstance};
