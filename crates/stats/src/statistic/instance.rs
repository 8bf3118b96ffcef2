//! Statistic instances: the per-report view of one statistic.
//!
//! An instance reads its target (a counter, a statistic definition, or a free-standing
//! expression) and reports the change since it was last started. When the target is
//! about to disappear, [`StatisticInstance::accumulate`] folds the current delta into
//! the accumulator and detaches, after which the instance is a constant.

use crate::common::{Result, StatsError, ValueSemantic, Visibility};
use crate::expr::ast::Expression;
use crate::expr::eval::{Baseline, Evaluator};
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::tree::SimTree;
use crate::statistic::definition::SnapshotMode;

/// What an instance reads.
#[derive(Clone, Debug, PartialEq)]
pub enum InstanceTarget {
    /// A counter, statistic definition, or context counter.
    Node(NodeId),
    /// A resolved free-standing expression.
    Expression(Expression),
}

/// Runtime view of one statistic in a report.
#[derive(Clone, Debug)]
pub struct StatisticInstance {
    name: String,
    location: String,
    description: String,
    expression_text: String,
    semantic: ValueSemantic,
    visibility: Visibility,
    mode: SnapshotMode,
    target: Option<InstanceTarget>,
    initial: f64,
    baseline: Option<Baseline>,
    accumulator: f64,
}

impl StatisticInstance {
    /// Binds an instance to a valued node and starts it.
    pub fn for_node(tree: &SimTree, node: NodeId, name: impl Into<String>) -> Result<Self> {
        let n = tree.node(node)?;
        let location = tree.location(node);
        let (mode, semantic, expression_text) = match n.kind() {
            NodeKind::Counter(_) => (SnapshotMode::Difference, ValueSemantic::Absolute, location.clone()),
            NodeKind::StatisticDef(_) | NodeKind::ContextCounter(_) => {
                let def = tree.definition(node).ok_or_else(|| StatsError::WrongNodeKind {
                    location: location.clone(),
                    expected: "statistic definition",
                })?;
                let text = def
                    .resolved()
                    .map_or_else(|| location.clone(), ToString::to_string);
                let mode = match def.resolved() {
                    Some(expr) if !expr.is_time_varying() => SnapshotMode::Absolute,
                    _ => def.snapshot_mode(),
                };
                (mode, def.semantic(), text)
            }
            _ => {
                return Err(StatsError::WrongNodeKind {
                    location,
                    expected: "counter or statistic",
                });
            }
        };
        let (description, visibility) = n
            .attrs()
            .map_or((String::new(), Visibility::NORMAL), |a| {
                (a.description.clone(), a.visibility)
            });
        let mut instance = Self {
            name: name.into(),
            location,
            description,
            expression_text,
            semantic,
            visibility,
            mode,
            target: Some(InstanceTarget::Node(node)),
            initial: 0.0,
            baseline: None,
            accumulator: 0.0,
        };
        instance.start(tree);
        Ok(instance)
    }

    /// Binds an instance to a resolved expression and starts it.
    ///
    /// Expressions without a time-varying leaf report absolutely.
    pub fn for_expression(
        tree: &SimTree,
        expression: Expression,
        name: impl Into<String>,
        mode: SnapshotMode,
    ) -> Self {
        let mode = if expression.is_time_varying() {
            mode
        } else {
            SnapshotMode::Absolute
        };
        let text = expression.to_string();
        let mut instance = Self {
            name: name.into(),
            location: text.clone(),
            description: String::new(),
            expression_text: text,
            semantic: ValueSemantic::Absolute,
            visibility: Visibility::NORMAL,
            mode,
            target: Some(InstanceTarget::Expression(expression)),
            initial: 0.0,
            baseline: None,
            accumulator: 0.0,
        };
        instance.start(tree);
        instance
    }

    /// Sets the description shown by formatters.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn evaluator<'a>(tree: &'a SimTree, sample: Option<&'a Baseline>) -> Evaluator<'a> {
        let evaluator = Evaluator::new(tree);
        match sample {
            Some(sample) => evaluator.at_sample(sample),
            None => evaluator,
        }
    }

    fn eval_target(evaluator: &Evaluator<'_>, target: &InstanceTarget) -> f64 {
        match target {
            InstanceTarget::Node(id) => evaluator.eval(&Expression::node(*id, String::new())),
            InstanceTarget::Expression(expr) => evaluator.eval(expr),
        }
    }

    fn absolute(tree: &SimTree, target: &InstanceTarget) -> f64 {
        Self::eval_target(&Evaluator::new(tree), target)
    }

    fn baseline_expression(tree: &SimTree, target: &InstanceTarget) -> Option<Expression> {
        match target {
            InstanceTarget::Node(id) => match tree.resolved_expression(*id) {
                Some(expr) => Some(expr.clone()),
                None => Some(Expression::node(*id, String::new())),
            },
            InstanceTarget::Expression(expr) => Some(expr.clone()),
        }
    }

    /// Captures the start snapshot; subsequent values are relative to now.
    pub fn start(&mut self, tree: &SimTree) {
        self.start_at(tree, None);
    }

    /// Captures the start snapshot from `sample` when given, otherwise from the live
    /// tree.
    pub fn start_at(&mut self, tree: &SimTree, sample: Option<&Baseline>) {
        let Some(target) = &self.target else {
            return;
        };
        let evaluator = Self::evaluator(tree, sample);
        match self.mode {
            SnapshotMode::Difference => {
                let now = Self::eval_target(&evaluator, target);
                self.initial = if now.is_finite() { now } else { 0.0 };
            }
            SnapshotMode::Leafwise => {
                self.baseline = Self::baseline_expression(tree, target)
                    .map(|expr| Baseline::capture_with(&evaluator, &expr));
            }
            SnapshotMode::Absolute => {}
        }
    }

    fn delta(&self, tree: &SimTree, target: &InstanceTarget, sample: Option<&Baseline>) -> f64 {
        match self.mode {
            SnapshotMode::Difference => {
                Self::eval_target(&Self::evaluator(tree, sample), target) - self.initial
            }
            SnapshotMode::Leafwise => match &self.baseline {
                Some(baseline) => {
                    let evaluator = Evaluator::with_baseline(tree, baseline);
                    let evaluator = match sample {
                        Some(sample) => evaluator.at_sample(sample),
                        None => evaluator,
                    };
                    Self::eval_target(&evaluator, target)
                }
                None => Self::eval_target(&Self::evaluator(tree, sample), target),
            },
            SnapshotMode::Absolute => Self::eval_target(&Self::evaluator(tree, sample), target),
        }
    }

    /// Reported value: the delta since start, plus anything accumulated.
    pub fn value(&self, tree: &SimTree) -> f64 {
        self.value_at(tree, None)
    }

    fn value_at(&self, tree: &SimTree, sample: Option<&Baseline>) -> f64 {
        match &self.target {
            Some(target) => self.accumulator + self.delta(tree, target, sample),
            None => self.accumulator,
        }
    }

    /// Absolute value of the target, ignoring the start snapshot.
    pub fn absolute_value(&self, tree: &SimTree) -> f64 {
        self.target
            .as_ref()
            .map_or(self.accumulator, |target| Self::absolute(tree, target))
    }

    /// Folds the current delta into the accumulator and detaches from the target.
    pub fn accumulate(&mut self, tree: &SimTree) {
        self.accumulate_at(tree, None);
    }

    /// Like [`accumulate`](Self::accumulate), reading the target from `sample` when
    /// given.
    pub fn accumulate_at(&mut self, tree: &SimTree, sample: Option<&Baseline>) {
        self.accumulator = self.value_at(tree, sample);
        self.target = None;
        self.baseline = None;
        self.initial = 0.0;
    }

    /// Folds the current delta into the accumulator and restarts from now.
    pub fn accumulate_and_continue(&mut self, tree: &SimTree) {
        if self.mode == SnapshotMode::Absolute {
            return;
        }
        self.accumulator = self.value(tree);
        self.start(tree);
    }

    /// True once detached from its target.
    pub const fn is_detached(&self) -> bool {
        self.target.is_none()
    }

    /// Node this instance reads, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self.target {
            Some(InstanceTarget::Node(id)) => Some(id),
            _ => None,
        }
    }

    /// Human-readable form of what is being read. Diagnostic only.
    pub fn expression_string(&self) -> &str {
        &self.expression_text
    }

    /// Name in the report (may be empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the target, or the expression text for free-standing expressions.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Description copied from the target's attributes.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Value semantic.
    pub const fn semantic(&self) -> ValueSemantic {
        self.semantic
    }

    /// Visibility copied from the target's attributes.
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Snapshot mode in effect.
    pub const fn snapshot_mode(&self) -> SnapshotMode {
        self.mode
    }

    /// Start snapshot used by `Difference` mode.
    pub const fn initial(&self) -> f64 {
        self.initial
    }
}
