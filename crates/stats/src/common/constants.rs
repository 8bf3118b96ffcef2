//! Process-wide hard caps.

/// Upper bound on active state timers in one unit.
pub const STATE_TIMER_POOL_CAP: usize = 10_000;

/// Recommended upper bound on histogram bins.
pub const MAX_HISTOGRAM_BINS: u64 = 1 << 20;

/// Default limit on sub-report identifiers handed out by one definition parser.
pub const MAX_SUBREPORT_UIDS: u32 = 1 << 16;

/// Name of the statistic-set child created under units and histograms.
pub const STATISTIC_SET_NAME: &str = "stats";

/// Name of the node created by [`SimTree::new`](crate::sim::SimTree::new).
pub const ROOT_NAME: &str = "top";
