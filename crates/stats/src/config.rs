//! Configuration for the instrumentation subsystem.
//!
//! This module defines the tunables shared by histograms, state timers, triggers, and
//! the report-definition parser. It provides:
//! 1. **Defaults:** Baseline constants used when a field is omitted.
//! 2. **Structures:** One section per component, grouped under [`StatsConfig`].
//!
//! Configuration is supplied as JSON (for example from a run script) or built with
//! `StatsConfig::default()`.

use serde::Deserialize;

use crate::common::{Result, Visibility};

/// Default configuration constants.
mod defaults {
    use crate::common::Visibility;
    use crate::common::constants;

    /// Visibility of first/last bins and summary children of a histogram.
    pub const HISTOGRAM_VIS_GENERAL: Visibility = Visibility::HIDDEN;

    /// Visibility of interior bins of a histogram.
    pub const HISTOGRAM_VIS_DETAILED: Visibility = Visibility::HIDDEN;

    /// Number of largest values a value histogram remembers.
    pub const HISTOGRAM_MAX_VALUES: usize = 0;

    /// Timers created when a state-timer unit is constructed.
    pub const TIMER_INITIAL: usize = 16;

    /// Timers added each time the pool runs dry.
    pub const TIMER_GROWTH: usize = 16;

    /// Hard cap on timers in one pool.
    pub const TIMER_CAP: usize = constants::STATE_TIMER_POOL_CAP;

    /// Cycles between evaluations of a polled trigger.
    pub const TRIGGER_POLL_CYCLES: u64 = 1;

    /// Sub-report identifiers available to one definition parser.
    pub const MAX_SUBREPORT_UIDS: u32 = constants::MAX_SUBREPORT_UIDS;
}

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use perfstat_core::config::StatsConfig;
///
/// let json = r#"{
///     "state_timer": { "initial": 4, "growth": 2 },
///     "report_def": { "arch": "rv64" }
/// }"#;
/// let config = StatsConfig::from_json_str(json).unwrap();
/// assert_eq!(config.state_timer.initial, 4);
/// assert_eq!(config.state_timer.cap, 10_000);
/// assert_eq!(config.report_def.arch.as_deref(), Some("rv64"));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsConfig {
    /// Histogram defaults.
    #[serde(default)]
    pub histogram: HistogramConfig,
    /// State-timer pool sizing.
    #[serde(default)]
    pub state_timer: StateTimerConfig,
    /// Trigger evaluation.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Report-definition parser limits and run metadata.
    #[serde(default)]
    pub report_def: ReportDefConfig,
}

impl StatsConfig {
    /// Parses a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Histogram defaults applied when a histogram is built with `AUTO` visibilities.
#[derive(Debug, Clone, Deserialize)]
pub struct HistogramConfig {
    /// Visibility of first/last bins, under/overflow, totals, and derived statistics.
    #[serde(default = "HistogramConfig::default_vis_general")]
    pub vis_general: u32,
    /// Visibility of interior bins.
    #[serde(default = "HistogramConfig::default_vis_detailed")]
    pub vis_detailed: u32,
    /// Number of largest values a value histogram tracks (0 disables tracking).
    #[serde(default = "HistogramConfig::default_max_values")]
    pub max_values: usize,
}

impl HistogramConfig {
    fn default_vis_general() -> u32 {
        defaults::HISTOGRAM_VIS_GENERAL.0
    }

    fn default_vis_detailed() -> u32 {
        defaults::HISTOGRAM_VIS_DETAILED.0
    }

    fn default_max_values() -> usize {
        defaults::HISTOGRAM_MAX_VALUES
    }

    /// General visibility as a typed value.
    pub const fn general(&self) -> Visibility {
        Visibility(self.vis_general)
    }

    /// Detailed visibility as a typed value.
    pub const fn detailed(&self) -> Visibility {
        Visibility(self.vis_detailed)
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            vis_general: Self::default_vis_general(),
            vis_detailed: Self::default_vis_detailed(),
            max_values: Self::default_max_values(),
        }
    }
}

/// State-timer pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct StateTimerConfig {
    /// Timers created up front.
    #[serde(default = "StateTimerConfig::default_initial")]
    pub initial: usize,
    /// Timers added on each growth step.
    #[serde(default = "StateTimerConfig::default_growth")]
    pub growth: usize,
    /// Hard cap; allocation beyond it fails with `PoolExhausted`.
    #[serde(default = "StateTimerConfig::default_cap")]
    pub cap: usize,
}

impl StateTimerConfig {
    fn default_initial() -> usize {
        defaults::TIMER_INITIAL
    }

    fn default_growth() -> usize {
        defaults::TIMER_GROWTH
    }

    fn default_cap() -> usize {
        defaults::TIMER_CAP
    }
}

impl Default for StateTimerConfig {
    fn default() -> Self {
        Self {
            initial: Self::default_initial(),
            growth: Self::default_growth(),
            cap: Self::default_cap(),
        }
    }
}

/// Trigger evaluation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    /// Cycles between evaluations of triggers that cannot be lowered to a counter watch.
    #[serde(default = "TriggerConfig::default_poll_cycles")]
    pub poll_cycles: u64,
}

impl TriggerConfig {
    fn default_poll_cycles() -> u64 {
        defaults::TRIGGER_POLL_CYCLES
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_cycles: Self::default_poll_cycles(),
        }
    }
}

/// Report-definition parser settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportDefConfig {
    /// Maximum sub-report identifiers one document may consume.
    #[serde(default = "ReportDefConfig::default_max_uids")]
    pub max_subreport_uids: u32,
    /// Architecture name used to honor `<arch>-arch-content` blocks.
    #[serde(default)]
    pub arch: Option<String>,
}

impl ReportDefConfig {
    fn default_max_uids() -> u32 {
        defaults::MAX_SUBREPORT_UIDS
    }
}

impl Default for ReportDefConfig {
    fn default() -> Self {
        Self {
            max_subreport_uids: Self::default_max_uids(),
            arch: None,
        }
    }
}
