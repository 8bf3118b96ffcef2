//! Context counters.
//!
//! A context counter is a statistic definition that owns N homogeneous child
//! counters `ctx0 .. ctxN-1`. Its expression defaults to their sum and may be
//! overridden. Aggregation callbacks registered on the counter compute extra values
//! (for example a weighted average) into shared cells just before a report snapshot;
//! the callbacks live inside the node and vanish with it.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::common::{InstrumentAttrs, InstrumentType, Result, StatsError};
use crate::counter::{Counter, CounterBehavior, CounterNode, CycleCounter};
use crate::expr::ast::{Expression, ReferenceVariable};
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::tree::SimTree;
use crate::statistic::{ExpressionSource, SnapshotMode, StatisticDef};

/// Counter type used for every context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    /// Plain counters.
    Plain(CounterBehavior),
    /// Cycle counters on the context counter's clock.
    Cycle(CounterBehavior),
}

/// How formatters emit the per-context values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GroupedMode {
    /// The value of the definition plus an array of context values.
    #[default]
    Grouped,
    /// Only the value of the definition.
    GroupedReduced,
    /// The value plus one object per context with name, value, and weight.
    GroupedDetail,
}

/// Read-only view handed to aggregation callbacks.
#[derive(Clone, Copy, Debug)]
pub struct ContextView<'a> {
    tree: &'a SimTree,
    contexts: &'a [NodeId],
    weights: &'a [f64],
}

impl ContextView<'_> {
    /// Number of contexts.
    pub const fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Value of context `i`, NaN if out of range.
    pub fn value(&self, i: usize) -> f64 {
        self.contexts
            .get(i)
            .and_then(|id| self.tree.counter_value(*id).ok())
            .map_or(f64::NAN, |v| v as f64)
    }

    /// Weight of context `i` (1 when unweighted).
    pub fn weight(&self, i: usize) -> f64 {
        self.weights.get(i).copied().unwrap_or(1.0)
    }

    /// All context values in order.
    pub fn values(&self) -> Vec<f64> {
        (0..self.num_contexts()).map(|i| self.value(i)).collect()
    }
}

/// Aggregation callback.
pub type AggregationFn = Box<dyn Fn(&ContextView<'_>) -> f64>;

struct Aggregation {
    name: String,
    target: Rc<Cell<f64>>,
    function: AggregationFn,
}

/// N-way counter with pluggable aggregation.
pub struct ContextCounter {
    def: StatisticDef,
    contexts: Vec<NodeId>,
    weights: Vec<f64>,
    aggregations: Vec<Aggregation>,
    mode: GroupedMode,
}

impl fmt::Debug for ContextCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCounter")
            .field("def", &self.def)
            .field("contexts", &self.contexts)
            .field("weights", &self.weights)
            .field(
                "aggregations",
                &self.aggregations.iter().map(|a| &a.name).collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

impl ContextCounter {
    /// Underlying definition.
    pub const fn definition(&self) -> &StatisticDef {
        &self.def
    }

    pub(crate) const fn definition_mut(&mut self) -> &mut StatisticDef {
        &mut self.def
    }

    /// Context counters in index order.
    pub fn contexts(&self) -> &[NodeId] {
        &self.contexts
    }

    /// Number of contexts.
    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Per-context weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Serialization mode.
    pub const fn grouped_mode(&self) -> GroupedMode {
        self.mode
    }

    /// Names of registered aggregations.
    pub fn aggregation_names(&self) -> impl Iterator<Item = &str> {
        self.aggregations.iter().map(|a| a.name.as_str())
    }

    /// Emits `name` into `out` per the grouped mode.
    ///
    /// `values` holds the definition value followed by one value per context, in the
    /// order the report created the sub-statistics; the names of sub-statistics
    /// consumed here are added to `do_not_print`.
    pub fn write_grouped(
        &self,
        name: &str,
        values: &[(String, f64)],
        do_not_print: &mut HashSet<String>,
        out: &mut Map<String, Value>,
    ) {
        let Some(((_, total), contexts)) = values.split_first() else {
            return;
        };
        for (sub_name, _) in contexts {
            let _ = do_not_print.insert(sub_name.clone());
        }
        let value = match self.mode {
            GroupedMode::GroupedReduced => json!(total),
            GroupedMode::Grouped => json!({
                "value": total,
                "contexts": contexts.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            }),
            GroupedMode::GroupedDetail => json!({
                "value": total,
                "contexts": contexts
                    .iter()
                    .enumerate()
                    .map(|(i, (n, v))| json!({
                        "name": n,
                        "value": v,
                        "weight": self.weights.get(i).copied().unwrap_or(1.0),
                    }))
                    .collect::<Vec<_>>(),
            }),
        };
        let _ = out.insert(name.to_string(), value);
    }
}

impl SimTree {
    /// Adds a context counter with `n` contexts to a statistic set.
    ///
    /// Without an explicit expression the definition is `ctx0 + ... + ctxN-1`, resolved
    /// relative to the context counter itself.
    pub fn add_context_counter(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        kind: ContextKind,
        n: usize,
        expression: Option<ExpressionSource>,
    ) -> Result<NodeId> {
        if !matches!(self.node(parent)?.kind(), NodeKind::StatisticSet) {
            return Err(StatsError::BadParent {
                name: name.to_string(),
                reason: "context counters must live in a statistic set".to_string(),
            });
        }
        if n == 0 {
            return Err(StatsError::illegal(
                format!("{}.{name}", self.location(parent)),
                "a context counter needs at least one context",
            ));
        }
        let source = expression.unwrap_or_else(|| {
            ExpressionSource::Tree(Expression::sum(
                (0..n).map(|i| Expression::path(format!("ctx{i}"))),
            ))
        });
        let cc = ContextCounter {
            def: StatisticDef::new(source),
            contexts: Vec::with_capacity(n),
            weights: vec![1.0; n],
            aggregations: Vec::new(),
            mode: GroupedMode::default(),
        };
        let attrs = InstrumentAttrs::new(InstrumentType::StatisticDef, description);
        let id = self.insert(parent, name, NodeKind::ContextCounter(cc), Some(attrs))?;
        let clock = self.clock_of(id)?;

        let mut contexts = Vec::with_capacity(n);
        for i in 0..n {
            let counter = match kind {
                ContextKind::Plain(behavior) => CounterNode::Plain(Counter::new(behavior)),
                ContextKind::Cycle(behavior) => {
                    CounterNode::Cycle(CycleCounter::new(behavior, clock).map_err(|e| {
                        StatsError::illegal(self.location(id), e.to_string())
                    })?)
                }
            };
            let ctx = self.insert_counter(id, &format!("ctx{i}"), description, counter)?;
            contexts.push(ctx);
        }

        let location = self.location(id);
        let cc = self.context_counter_mut(id)?;
        cc.def = cc.def.clone().with_context(id);
        for (i, ctx) in contexts.iter().enumerate() {
            cc.def.push_sub_statistic(format!("ctx{i}"), *ctx);
        }
        cc.contexts = contexts;
        debug!(context_counter = %location, contexts = n, "added context counter");
        Ok(id)
    }

    fn context_counter_mut(&mut self, id: NodeId) -> Result<&mut ContextCounter> {
        let location = self.location(id);
        match &mut self.node_mut(id)?.kind {
            NodeKind::ContextCounter(cc) => Ok(cc),
            _ => Err(StatsError::WrongNodeKind {
                location,
                expected: "context counter",
            }),
        }
    }

    /// Context counter by handle.
    pub fn context_counter(&self, id: NodeId) -> Result<&ContextCounter> {
        match self.node(id)?.kind() {
            NodeKind::ContextCounter(cc) => Ok(cc),
            _ => Err(StatsError::WrongNodeKind {
                location: self.location(id),
                expected: "context counter",
            }),
        }
    }

    /// Counter of context `i`.
    pub fn context(&self, id: NodeId, i: usize) -> Result<NodeId> {
        let cc = self.context_counter(id)?;
        cc.contexts.get(i).copied().ok_or_else(|| {
            StatsError::unresolved(format!("ctx{i}"), self.location(id))
        })
    }

    /// Replaces the per-context weights; missing entries default to 1.
    pub fn set_context_weights(&mut self, id: NodeId, weights: &[f64]) -> Result<()> {
        let cc = self.context_counter_mut(id)?;
        let n = cc.contexts.len();
        cc.weights = (0..n).map(|i| weights.get(i).copied().unwrap_or(1.0)).collect();
        Ok(())
    }

    /// Selects how formatters emit the context values.
    pub fn set_grouped_mode(&mut self, id: NodeId, mode: GroupedMode) -> Result<()> {
        self.context_counter_mut(id)?.mode = mode;
        Ok(())
    }

    /// Registers an aggregation; the returned variable receives its result whenever
    /// [`run_aggregations`](Self::run_aggregations) runs.
    pub fn register_aggregation(
        &mut self,
        id: NodeId,
        name: &str,
        function: impl Fn(&ContextView<'_>) -> f64 + 'static,
    ) -> Result<ReferenceVariable> {
        let location = self.location(id);
        let cc = self.context_counter_mut(id)?;
        if cc.aggregations.iter().any(|a| a.name == name) {
            return Err(StatsError::DuplicateRegistration(format!("{location}:{name}")));
        }
        let variable = ReferenceVariable::new(format!("{location}.{name}"), 0.0);
        cc.aggregations.push(Aggregation {
            name: name.to_string(),
            target: variable.cell(),
            function: Box::new(function),
        });
        Ok(variable)
    }

    /// Registers an aggregation and exposes it as a sibling statistic definition.
    ///
    /// The definition reports the aggregation's latest value without delta subtraction.
    pub fn add_aggregate_statistic(
        &mut self,
        id: NodeId,
        name: &str,
        description: &str,
        function: impl Fn(&ContextView<'_>) -> f64 + 'static,
    ) -> Result<NodeId> {
        let parent = self.node(id)?.parent().ok_or_else(|| StatsError::BadParent {
            name: name.to_string(),
            reason: "context counter has no parent".to_string(),
        })?;
        let variable = self.register_aggregation(id, name, function)?;
        let def = StatisticDef::new(Expression::from(variable))
            .with_snapshot_mode(SnapshotMode::Absolute);
        self.add_statistic_def(parent, name, description, def)
    }

    /// Runs every registered aggregation callback.
    pub fn run_aggregations(&self) {
        for id in self.descendants(self.root()) {
            let Ok(NodeKind::ContextCounter(cc)) = self.node(id).map(|n| n.kind()) else {
                continue;
            };
            let view = ContextView {
                tree: self,
                contexts: &cc.contexts,
                weights: &cc.weights,
            };
            for aggregation in &cc.aggregations {
                aggregation.target.set((aggregation.function)(&view));
            }
        }
    }
}
