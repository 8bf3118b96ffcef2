//! Value histograms: occurrence counts per bin.

use tracing::debug;

use super::{BinLayout, HistogramKind, HistogramNodes, HistogramSpec};
use crate::common::{Result, StatsError, ValueSemantic, Visibility};
use crate::counter::CounterBehavior;
use crate::expr::ast::Expression;
use crate::sim::node::NodeId;
use crate::sim::tree::SimTree;
use crate::statistic::SnapshotMode;

impl SimTree {
    /// Adds a value histogram under `parent`.
    ///
    /// Children, in order: `total`, `sum`, `UF`, one counter per bin, `OF`, a
    /// `_probability` statistic per counter, `average`, and `max_value` when max
    /// tracking is enabled.
    pub fn add_histogram(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        spec: &HistogramSpec,
    ) -> Result<NodeId> {
        let layout = BinLayout::new(name, spec.lower, spec.upper, spec.values_per_bin)?;
        self.build_value_histogram(parent, name, description, layout, spec)
    }

    pub(super) fn build_value_histogram(
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

        let total = self.add_counter(stats, "total", "Number of values added", CounterBehavior::Normal)?;
        self.set_visibility(total, general)?;
        let sum = self.add_counter(stats, "sum", "Sum of values added", CounterBehavior::Normal)?;
        self.set_visibility(sum, general)?;

        let underflow = if ranged {
            let uf = self.add_counter(stats, "UF", "Values below the lower bound", CounterBehavior::Normal)?;
            self.set_visibility(uf, general)?;
            Some(uf)
        } else {
            None
        };
        let n = layout.num_bins();
        let mut bins = Vec::with_capacity(n);
        for i in 0..n {
            let bin_name = layout.bin_name(i);
            let desc = format!(
                "Values in [{}, {}]",
                layout.bin_start(i),
                layout.bin_start(i) + layout.values_per_bin() - 1
            );
            let bin = self.add_counter(stats, &bin_name, &desc, CounterBehavior::Normal)?;
            self.set_visibility(bin, Self::bin_visibility(general, detailed, i, n))?;
            bins.push(bin);
        }
        let overflow = if ranged {
            let of = self.add_counter(stats, "OF", "Values above the upper bound", CounterBehavior::Normal)?;
            self.set_visibility(of, general)?;
            Some(of)
        } else {
            None
        };

        let mut weighted: Vec<(NodeId, Visibility)> = Vec::with_capacity(n + 2);
        weighted.extend(underflow.map(|uf| (uf, general)));
        weighted.extend(
            bins.iter()
                .enumerate()
                .map(|(i, b)| (*b, Self::bin_visibility(general, detailed, i, n))),
        );
        weighted.extend(overflow.map(|of| (of, general)));
        let mut derived = self.add_probabilities(stats, total, &weighted)?;

        derived.push(self.add_derived(
            stats,
            "average",
            "Mean of values added",
            Expression::node(sum, "sum") / Expression::node(total, "total"),
            ValueSemantic::Absolute,
            SnapshotMode::Leafwise,
            general,
        )?);

        let max_value = if spec.max_values > 0 {
            let max = self.add_counter(stats, "max_value", "Largest value added", CounterBehavior::Latest)?;
            self.set_visibility(max, general)?;
            Some(max)
        } else {
            None
        };

        let nodes = HistogramNodes {
            stats,
            underflow,
            bins,
            overflow,
            total,
            sum: Some(sum),
            max_value,
            derived,
        };
        let lower = layout.lower();
        self.finish_histogram(id, HistogramKind::Value, layout, nodes, spec.max_values, lower)?;
        debug!(histogram = %self.location(id), bins = n, "added value histogram");
        Ok(id)
    }

    pub(super) fn value_histogram_add(&mut self, id: NodeId, value: u64) -> Result<()> {
        let histogram = self.histogram(id)?;
        let slot = histogram.layout().slot(value);
        let Some(counter) = histogram.counter_for(slot) else {
            return Err(StatsError::InvalidHistogram {
                name: self.location(id),
                reason: format!("value {value} has no bin"),
            });
        };
        let nodes = histogram.nodes().clone();
        let _ = self.increment(nodes.total, 1)?;
        if let Some(sum) = nodes.sum {
            let _ = self.increment(sum, value)?;
        }
        let _ = self.increment(counter, 1)?;
        if let Some(max_counter) = nodes.max_value {
            let histogram = self.histogram_mut(id)?;
            histogram.max_tracker.offer(value);
            if let Some(max) = histogram.max_tracker.max() {
                let _ = self.set(max_counter, max)?;
            }
        }
        Ok(())
    }
}
