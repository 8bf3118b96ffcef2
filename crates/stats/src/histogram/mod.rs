//! Histogram family.
//!
//! Every histogram is a tree node with a child statistic set `stats` holding its
//! counters and derived statistics. Three kinds exist:
//! 1. **Value:** `add_value` counts occurrences per bin and tracks total and sum.
//! 2. **Cycle:** Each bin is a cycle counter; exactly one bin counts at any instant,
//!    so the bins always add up to the cycles elapsed since construction.
//! 3. **State:** Enumerated bins read from cells fed by a state-timer unit.
//!
//! Bins are laid out by a runtime [`BinLayout`], either an integer range split into
//! power-of-two bins or one bin per enum variant. Derived statistics (probabilities,
//! averages, saturation) are ordinary statistic definitions evaluated lazily.

/// Cycle histograms.
pub mod cycle;

/// Enumerated value types.
pub mod enumeration;

/// Bin layout.
pub mod layout;

/// Registered histogram functions.
pub mod registry;

/// Value histograms.
pub mod value;

use std::collections::BTreeMap;

use crate::common::constants::STATISTIC_SET_NAME;
use crate::common::{InstrumentAttrs, InstrumentType, Result, StatsError, ValueSemantic, Visibility};
use crate::config::HistogramConfig;
use crate::expr::ast::Expression;
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::tree::SimTree;
use crate::statistic::{SnapshotMode, StatisticDef};

pub use enumeration::StateEnum;
pub use layout::{BinLayout, BinSlot};
pub use registry::{HistogramFunctionRegistry, builtin_functions};

/// Signature of a histogram statistic function.
pub type HistogramFn = fn(&HistogramView<'_>) -> f64;

/// Histogram kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HistogramKind {
    /// Occurrence counts.
    Value,
    /// Cycles spent at each value.
    Cycle,
    /// Cycles spent in each state, fed by a state-timer unit.
    State,
}

/// Construction parameters for integer-range histograms.
///
/// # Examples
///
/// ```
/// use perfstat_core::common::Visibility;
/// use perfstat_core::histogram::HistogramSpec;
///
/// let spec = HistogramSpec::new(0, 63, 4)
///     .with_visibilities(Some(Visibility::NORMAL), None)
///     .with_max_values(3);
/// assert_eq!(spec.values_per_bin, 4);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramSpec {
    /// Lowest in-range value.
    pub lower: u64,
    /// Highest in-range value.
    pub upper: u64,
    /// Bin width (power of two).
    pub values_per_bin: u64,
    /// Visibility of first/last bins and summary statistics; `None` is AUTO.
    pub vis_general: Option<Visibility>,
    /// Visibility of interior bins; `None` is AUTO.
    pub vis_detailed: Option<Visibility>,
    /// Largest values remembered by a value histogram (0 disables).
    pub max_values: usize,
    /// Value a cycle histogram counts when nothing else is set.
    pub idle_value: u64,
}

impl HistogramSpec {
    /// Range with AUTO visibilities, no max tracking, and idle value `lower`.
    pub const fn new(lower: u64, upper: u64, values_per_bin: u64) -> Self {
        Self {
            lower,
            upper,
            values_per_bin,
            vis_general: None,
            vis_detailed: None,
            max_values: 0,
            idle_value: lower,
        }
    }

    /// Sets explicit visibilities.
    #[must_use]
    pub const fn with_visibilities(
        mut self,
        general: Option<Visibility>,
        detailed: Option<Visibility>,
    ) -> Self {
        self.vis_general = general;
        self.vis_detailed = detailed;
        self
    }

    /// Tracks the `n` largest values.
    #[must_use]
    pub const fn with_max_values(mut self, n: usize) -> Self {
        self.max_values = n;
        self
    }

    /// Sets the idle value of a cycle histogram.
    #[must_use]
    pub const fn with_idle_value(mut self, idle: u64) -> Self {
        self.idle_value = idle;
        self
    }

    /// Fills AUTO fields from configuration.
    #[must_use]
    pub fn with_config(mut self, config: &HistogramConfig) -> Self {
        self.vis_general = Some(Visibility::resolve(self.vis_general, config.general()));
        self.vis_detailed = Some(Visibility::resolve(self.vis_detailed, config.detailed()));
        if self.max_values == 0 {
            self.max_values = config.max_values;
        }
        self
    }

    pub(crate) fn general(&self) -> Visibility {
        Visibility::resolve(self.vis_general, Visibility::HIDDEN)
    }

    pub(crate) fn detailed(&self) -> Visibility {
        Visibility::resolve(self.vis_detailed, Visibility::HIDDEN)
    }
}

/// Bounded multiset of the largest values seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaxTracker {
    capacity: usize,
    len: usize,
    values: BTreeMap<u64, usize>,
}

impl MaxTracker {
    /// Tracker keeping `capacity` values.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            len: 0,
            values: BTreeMap::new(),
        }
    }

    /// Offers a value, evicting the smallest kept value when full.
    pub fn offer(&mut self, value: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.len == self.capacity {
            let Some((&smallest, _)) = self.values.iter().next() else {
                return;
            };
            if value <= smallest {
                return;
            }
            if let Some(count) = self.values.get_mut(&smallest) {
                *count -= 1;
                if *count == 0 {
                    let _ = self.values.remove(&smallest);
                }
            }
            self.len -= 1;
        }
        *self.values.entry(value).or_insert(0) += 1;
        self.len += 1;
    }

    /// Kept values, largest first.
    pub fn values(&self) -> Vec<u64> {
        self.values
            .iter()
            .rev()
            .flat_map(|(v, n)| std::iter::repeat_n(*v, *n))
            .collect()
    }

    /// Largest value seen.
    pub fn max(&self) -> Option<u64> {
        self.values.keys().next_back().copied()
    }
}

/// Counters and derived statistics of one histogram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramNodes {
    /// Child statistic set.
    pub stats: NodeId,
    /// Underflow counter (integer ranges only).
    pub underflow: Option<NodeId>,
    /// Regular bins.
    pub bins: Vec<NodeId>,
    /// Overflow counter (integer ranges only).
    pub overflow: Option<NodeId>,
    /// Total: a counter for value histograms, a definition otherwise.
    pub total: NodeId,
    /// Sum of values (value histograms only).
    pub sum: Option<NodeId>,
    /// Largest value seen (`Latest` counter), when tracked.
    pub max_value: Option<NodeId>,
    /// Derived statistic definitions in registration order.
    pub derived: Vec<NodeId>,
}

impl HistogramNodes {
    /// Every bin-like counter in order: underflow, bins, overflow.
    pub fn all_bins(&self) -> Vec<NodeId> {
        self.underflow
            .iter()
            .chain(self.bins.iter())
            .chain(self.overflow.iter())
            .copied()
            .collect()
    }
}

/// Histogram node payload.
#[derive(Clone, Debug)]
pub struct Histogram {
    kind: HistogramKind,
    layout: BinLayout,
    nodes: HistogramNodes,
    max_tracker: MaxTracker,
    idle: u64,
    current: Option<u64>,
}

impl Histogram {
    /// Histogram kind.
    pub const fn kind(&self) -> HistogramKind {
        self.kind
    }

    /// Bin layout.
    pub const fn layout(&self) -> &BinLayout {
        &self.layout
    }

    /// Counter and statistic handles.
    pub const fn nodes(&self) -> &HistogramNodes {
        &self.nodes
    }

    /// Largest tracked values, largest first.
    pub fn max_values(&self) -> Vec<u64> {
        self.max_tracker.values()
    }

    /// Idle value of a cycle histogram.
    pub const fn idle_value(&self) -> u64 {
        self.idle
    }

    /// Value a cycle histogram is currently counting.
    pub const fn current_value(&self) -> Option<u64> {
        self.current
    }

    /// Counter for `slot`.
    pub fn counter_for(&self, slot: BinSlot) -> Option<NodeId> {
        match slot {
            BinSlot::Underflow => self.nodes.underflow,
            BinSlot::Overflow => self.nodes.overflow,
            BinSlot::Bin(i) => self.nodes.bins.get(i).copied(),
        }
    }
}

/// Read-only view of a histogram passed to registered functions.
#[derive(Clone, Copy, Debug)]
pub struct HistogramView<'a> {
    tree: &'a SimTree,
    id: NodeId,
    histogram: &'a Histogram,
}

impl<'a> HistogramView<'a> {
    /// Wraps a histogram node.
    pub const fn new(tree: &'a SimTree, id: NodeId, histogram: &'a Histogram) -> Self {
        Self {
            tree,
            id,
            histogram,
        }
    }

    /// Histogram node.
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Histogram payload.
    pub const fn histogram(&self) -> &'a Histogram {
        self.histogram
    }

    /// Histogram kind.
    pub const fn kind(&self) -> HistogramKind {
        self.histogram.kind
    }

    /// Bin layout.
    pub const fn layout(&self) -> &'a BinLayout {
        &self.histogram.layout
    }

    fn read(&self, id: Option<NodeId>) -> f64 {
        id.and_then(|id| self.tree.counter_value(id).ok())
            .map_or(0.0, |v| v as f64)
    }

    /// Number of regular bins.
    pub fn num_bins(&self) -> usize {
        self.histogram.nodes.bins.len()
    }

    /// Value of regular bin `i`.
    pub fn bin(&self, i: usize) -> f64 {
        self.read(self.histogram.nodes.bins.get(i).copied())
    }

    /// Values of every regular bin.
    pub fn bins(&self) -> Vec<f64> {
        (0..self.num_bins()).map(|i| self.bin(i)).collect()
    }

    /// Underflow count (0 when absent).
    pub fn underflow(&self) -> f64 {
        self.read(self.histogram.nodes.underflow)
    }

    /// Overflow count (0 when absent).
    pub fn overflow(&self) -> f64 {
        self.read(self.histogram.nodes.overflow)
    }

    /// Total observations or cycles.
    pub fn total(&self) -> f64 {
        self.underflow() + self.bins().iter().sum::<f64>() + self.overflow()
    }

    /// Sum of values added (value histograms only).
    pub fn sum(&self) -> Option<f64> {
        self.histogram.nodes.sum.map(|id| self.read(Some(id)))
    }
}

impl SimTree {
    /// Histogram payload by handle.
    pub fn histogram(&self, id: NodeId) -> Result<&Histogram> {
        match self.node(id)?.kind() {
            NodeKind::Histogram(h) => Ok(h),
            _ => Err(StatsError::WrongNodeKind {
                location: self.location(id),
                expected: "histogram",
            }),
        }
    }

    pub(crate) fn histogram_mut(&mut self, id: NodeId) -> Result<&mut Histogram> {
        let location = self.location(id);
        match &mut self.node_mut(id)?.kind {
            NodeKind::Histogram(h) => Ok(h),
            _ => Err(StatsError::WrongNodeKind {
                location,
                expected: "histogram",
            }),
        }
    }

    /// Records `value` in a value histogram, or pulses it for one cycle in a cycle
    /// histogram.
    pub fn histogram_add_value(&mut self, id: NodeId, value: u64) -> Result<()> {
        match self.histogram(id)?.kind {
            HistogramKind::Value => self.value_histogram_add(id, value),
            HistogramKind::Cycle => self.cycle_histogram_pulse(id, value),
            HistogramKind::State => Err(StatsError::WrongNodeKind {
                location: self.location(id),
                expected: "value or cycle histogram",
            }),
        }
    }

    /// Evaluates a registered function against a histogram.
    pub fn histogram_function(&self, id: NodeId, function: HistogramFn) -> Result<f64> {
        let histogram = self.histogram(id)?;
        Ok(function(&HistogramView::new(self, id, histogram)))
    }

    /// Creates the histogram node and its statistic set, returning both.
    fn begin_histogram(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        general: Visibility,
    ) -> Result<(NodeId, NodeId)> {
        match self.node(parent)?.kind() {
            NodeKind::Root | NodeKind::Generic | NodeKind::Resource | NodeKind::StatisticSet => {}
            other => {
                return Err(StatsError::BadParent {
                    name: name.to_string(),
                    reason: format!("a {} cannot host a histogram", other.label()),
                });
            }
        }
        let attrs =
            InstrumentAttrs::new(InstrumentType::Histogram, description).with_visibility(general);
        let id = self.insert(parent, name, NodeKind::Generic, Some(attrs))?;
        let stats = self.insert(id, STATISTIC_SET_NAME, NodeKind::StatisticSet, None)?;
        Ok((id, stats))
    }

    fn finish_histogram(
        &mut self,
        id: NodeId,
        kind: HistogramKind,
        layout: BinLayout,
        nodes: HistogramNodes,
        max_values: usize,
        idle: u64,
    ) -> Result<()> {
        self.node_mut(id)?.kind = NodeKind::Histogram(Histogram {
            kind,
            layout,
            nodes,
            max_tracker: MaxTracker::new(max_values),
            idle,
            current: None,
        });
        Ok(())
    }

    fn add_derived(
        &mut self,
        stats: NodeId,
        name: &str,
        description: &str,
        expression: Expression,
        semantic: ValueSemantic,
        mode: SnapshotMode,
        visibility: Visibility,
    ) -> Result<NodeId> {
        let def = StatisticDef::new(expression)
            .with_semantic(semantic)
            .with_snapshot_mode(mode)
            .with_visibility(visibility);
        self.add_statistic_def(stats, name, description, def)
    }

    /// Adds `<bin>_probability` for every bin, each `bin / total`.
    fn add_probabilities(
        &mut self,
        stats: NodeId,
        total: NodeId,
        bins: &[(NodeId, Visibility)],
    ) -> Result<Vec<NodeId>> {
        let mut out = Vec::with_capacity(bins.len());
        for (bin, visibility) in bins {
            let bin_name = self.node(*bin)?.name().to_string();
            let expr = Expression::node(*bin, bin_name.clone()) / Expression::node(total, "total");
            out.push(self.add_derived(
                stats,
                &format!("{bin_name}_probability"),
                &format!("Fraction of total in {bin_name}"),
                expr,
                ValueSemantic::Fractional,
                SnapshotMode::Leafwise,
                *visibility,
            )?);
        }
        Ok(out)
    }

    /// Visibility of regular bin `i` out of `n`.
    fn bin_visibility(spec_general: Visibility, spec_detailed: Visibility, i: usize, n: usize) -> Visibility {
        if i == 0 || i + 1 == n {
            spec_general
        } else {
            spec_detailed
        }
    }
}
