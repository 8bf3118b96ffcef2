//! Reports: nested selections of statistics evaluated as deltas.
//!
//! This module provides the report model and its outputs. It includes:
//! 1. **Model:** [`Report`] trees holding statistic instances, styles, and headers.
//! 2. **Population:** Sub-tree traversal and filter-driven autopopulation.
//! 3. **Triggers:** Start/stop conditions lowered to counter watches or polled.
//! 4. **Output:** [`ReportSnapshot`]s rendered as text, CSV, or JSON.
//!
//! ```
//! use perfstat_core::SimTree;
//! use perfstat_core::counter::CounterBehavior;
//! use perfstat_core::report::Report;
//!
//! let mut tree = SimTree::new();
//! let stats = tree.statistic_set(tree.root()).unwrap();
//! let a = tree.add_counter(stats, "a", "Events", CounterBehavior::Normal).unwrap();
//! tree.finalize().unwrap();
//!
//! let mut report = Report::new("demo", tree.root());
//! report.add(&tree, "stats.a", "events").unwrap();
//! tree.increment(a, 4).unwrap();
//! assert_eq!(report.snapshot(&tree).stat("events"), Some(4.0));
//! ```

/// Output formats.
pub mod format;

mod model;
mod populate;
mod snapshot;
mod trigger;

pub use format::{
    CsvFormatter, JsonFormatter, ReportFormatter, TextFormatter, format_value,
    formatter_for_path, snapshot_to_json,
};
pub use model::{Report, StatTarget};
pub use populate::{IncludeFn, MakeSubreportFn, SubreportPlan, SubtreeOptions};
pub use snapshot::{ReportSnapshot, StatSnapshot};
pub use trigger::{ReportContainer, Trigger, TriggerRole};
