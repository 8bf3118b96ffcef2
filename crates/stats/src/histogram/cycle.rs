//! Cycle histograms: cycles spent at each value.
//!
//! One cycle counter per bin, plus `UF`/`OF` for integer ranges. Exactly one of them
//! counts at any instant, starting with the bin of the idle value, so their sum is
//! always the number of cycles since construction.

use tracing::debug;

use super::{BinLayout, HistogramKind, HistogramNodes, HistogramSpec};
use crate::common::{Result, StatsError, ValueSemantic, Visibility};
use crate::counter::CounterBehavior;
use crate::expr::ast::Expression;
use crate::sim::node::NodeId;
use crate::sim::scheduler::DeferredOp;
use crate::sim::tree::SimTree;
use crate::statistic::SnapshotMode;

impl SimTree {
    /// Adds a cycle histogram under `parent`, counting the idle value's bin from now.
    ///
    /// Children, in order: `UF`, one cycle counter per bin, `OF`, `total`, a
    /// `_probability` statistic per counter, `max_value`, `weighted_avg` and
    /// `weighted_nonzero_avg` (single-value bins only), `full`, and `full_probability`.
    pub fn add_cycle_histogram(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        spec: &HistogramSpec,
    ) -> Result<NodeId> {
        let layout = BinLayout::new(name, spec.lower, spec.upper, spec.values_per_bin)?;
        self.build_cycle_histogram(parent, name, description, layout, spec)
    }

    pub(super) fn build_cycle_histogram(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        layout: BinLayout,
        spec: &HistogramSpec,
    ) -> Result<NodeId> {
        let general = spec.general();
        let detailed = spec.detailed();
        let ranged = !layout.is_named();
        let (id, stats) = self.begin_histogram(parent, name, description, general)?;

        let underflow = if ranged {
            let uf = self.add_cycle_counter(stats, "UF", "Cycles below the lower bound", CounterBehavior::Normal)?;
            self.set_visibility(uf, general)?;
            Some(uf)
        } else {
            None
        };
        let n = layout.num_bins();
        let mut bins = Vec::with_capacity(n);
        for i in 0..n {
            let bin_name = layout.bin_name(i);
            let desc = format!("Cycles at {bin_name}");
            let bin = self.add_cycle_counter(stats, &bin_name, &desc, CounterBehavior::Normal)?;
            self.set_visibility(bin, Self::bin_visibility(general, detailed, i, n))?;
            bins.push(bin);
        }
        let overflow = if ranged {
            let of = self.add_cycle_counter(stats, "OF", "Cycles above the upper bound", CounterBehavior::Normal)?;
            self.set_visibility(of, general)?;
            Some(of)
        } else {
            None
        };

        let all: Vec<NodeId> = underflow
            .iter()
            .chain(bins.iter())
            .chain(overflow.iter())
            .copied()
            .collect();
        let mut labelled = Vec::with_capacity(all.len());
        for counter in &all {
            let label = self.node(*counter)?.name().to_string();
            labelled.push(Expression::node(*counter, label));
        }
        let total = self.add_derived(
            stats,
            "total",
            "Total cycles",
            Expression::sum(labelled),
            ValueSemantic::Absolute,
            SnapshotMode::Difference,
            general,
        )?;

        let mut weighted: Vec<(NodeId, Visibility)> = Vec::with_capacity(all.len());
        weighted.extend(underflow.map(|uf| (uf, general)));
        weighted.extend(
            bins.iter()
                .enumerate()
                .map(|(i, b)| (*b, Self::bin_visibility(general, detailed, i, n))),
        );
        weighted.extend(overflow.map(|of| (of, general)));
        let mut derived = self.add_probabilities(stats, total, &weighted)?;

        let max_value = self.add_counter(stats, "max_value", "Largest value set", CounterBehavior::Latest)?;
        self.set_visibility(max_value, general)?;

        if ranged && layout.values_per_bin() == 1 {
            derived.extend(self.add_weighted_averages(stats, &layout, &bins, underflow, overflow, total, general)?);
        }

        if let Some(last) = bins.last().copied() {
            let last_name = self.node(last)?.name().to_string();
            let mut full_expr = Expression::node(last, last_name);
            if let Some(of) = overflow {
                full_expr = full_expr + Expression::node(of, "OF");
            }
            let full = self.add_derived(
                stats,
                "full",
                "Cycles at or above the last bin",
                full_expr,
                ValueSemantic::Absolute,
                SnapshotMode::Difference,
                general,
            )?;
            derived.push(full);
            derived.push(self.add_derived(
                stats,
                "full_probability",
                "Fraction of cycles at or above the last bin",
                Expression::node(full, "full") / Expression::node(total, "total"),
                ValueSemantic::Fractional,
                SnapshotMode::Leafwise,
                general,
            )?);
        }

        let nodes = HistogramNodes {
            stats,
            underflow,
            bins,
            overflow,
            total,
            sum: None,
            max_value: Some(max_value),
            derived,
        };
        let idle = spec.idle_value;
        self.finish_histogram(id, HistogramKind::Cycle, layout, nodes, 0, idle)?;
        self.cycle_histogram_set(id, idle)?;
        debug!(histogram = %self.location(id), bins = n, idle, "added cycle histogram");
        Ok(id)
    }

    fn add_weighted_averages(
        &mut self,
        stats: NodeId,
        layout: &BinLayout,
        bins: &[NodeId],
        underflow: Option<NodeId>,
        overflow: Option<NodeId>,
        total: NodeId,
        visibility: Visibility,
    ) -> Result<Vec<NodeId>> {
        let mut terms = Vec::with_capacity(bins.len() + 2);
        let mut zero_bin = None;
        for (i, bin) in bins.iter().enumerate() {
            let value = layout.bin_start(i);
            if value == 0 {
                zero_bin = Some(*bin);
            }
            let label = self.node(*bin)?.name().to_string();
            terms.push(Expression::constant(value as f64) * Expression::node(*bin, label));
        }
        if let Some(uf) = underflow {
            terms.push(Expression::constant(layout.lower() as f64) * Expression::node(uf, "UF"));
        }
        if let Some(of) = overflow {
            terms.push(Expression::constant(layout.upper() as f64) * Expression::node(of, "OF"));
        }
        let numerator = Expression::sum(terms);
        let weighted_avg = self.add_derived(
            stats,
            "weighted_avg",
            "Cycle-weighted average value",
            numerator.clone() / Expression::node(total, "total"),
            ValueSemantic::Absolute,
            SnapshotMode::Leafwise,
            visibility,
        )?;
        let nonzero_expr = match zero_bin {
            Some(zero) => {
                let label = self.node(zero)?.name().to_string();
                numerator / (Expression::node(total, "total") - Expression::node(zero, label))
            }
            None => Expression::node(weighted_avg, "weighted_avg"),
        };
        let weighted_nonzero_avg = self.add_derived(
            stats,
            "weighted_nonzero_avg",
            "Cycle-weighted average value excluding zero",
            nonzero_expr,
            ValueSemantic::Absolute,
            SnapshotMode::Leafwise,
            visibility,
        )?;
        Ok(vec![weighted_avg, weighted_nonzero_avg])
    }

    /// Moves a cycle histogram to `value` now.
    pub fn histogram_set_value(&mut self, id: NodeId, value: u64) -> Result<()> {
        if self.histogram(id)?.kind != HistogramKind::Cycle {
            return Err(StatsError::WrongNodeKind {
                location: self.location(id),
                expected: "cycle histogram",
            });
        }
        self.cycle_histogram_set(id, value)
    }

    fn cycle_histogram_set(&mut self, id: NodeId, value: u64) -> Result<()> {
        let histogram = self.histogram(id)?;
        if histogram.current == Some(value) {
            return Ok(());
        }
        let next = histogram
            .counter_for(histogram.layout.slot(value))
            .ok_or_else(|| StatsError::InvalidHistogram {
                name: self.location(id),
                reason: format!("value {value} has no bin"),
            })?;
        let previous = histogram
            .current
            .and_then(|v| histogram.counter_for(histogram.layout.slot(v)));
        let max_counter = histogram.nodes.max_value;
        if let Some(previous) = previous {
            self.stop_counting(previous, 0)?;
        }
        self.start_counting(next, 0)?;
        if let Some(max_counter) = max_counter {
            let seen = self.counter_value(max_counter)?;
            if value > seen {
                let _ = self.set(max_counter, value)?;
            }
        }
        self.histogram_mut(id)?.current = Some(value);
        Ok(())
    }

    /// Pulses `value` for one cycle, then returns to idle.
    ///
    /// A later pulse in the same tick wins: the earlier one is clipped to zero cycles
    /// and its pending return to idle is replaced.
    pub(super) fn cycle_histogram_pulse(&mut self, id: NodeId, value: u64) -> Result<()> {
        let idle = self.histogram(id)?.idle;
        let cancelled = self
            .scheduler_mut()
            .deferred_mut()
            .cancel_if(|op| matches!(op, DeferredOp::SetHistogramValue(target, _) if *target == id));
        if cancelled > 0 {
            debug!(histogram = %self.location(id), cancelled, "replaced pending return to idle");
        }
        self.cycle_histogram_set(id, value)?;
        let clock = self.clock_of(id)?;
        let clk = self.clock(clock);
        let due = clk.tick_of(clk.cycle_at(self.now()) + 1);
        self.scheduler_mut()
            .defer(due, DeferredOp::SetHistogramValue(id, idle));
        Ok(())
    }

    pub(crate) fn apply_histogram_value(&mut self, id: NodeId, value: u64) -> Result<()> {
        self.cycle_histogram_set(id, value)
    }
}
