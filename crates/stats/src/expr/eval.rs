//! Resolution and evaluation of expressions against a simulation tree.
//!
//! Resolution turns every path into a node reference and binds clock-dependent free
//! variables to the context node's clock. Evaluation walks the resolved tree and
//! yields an absolute double; a [`Baseline`] optionally replaces every time-varying
//! leaf by its delta from a captured start value. A sample taken with
//! [`Baseline::sample`] freezes every counter and clock of the tree, so an evaluator
//! reading through it sees the tree as it was at that tick.

use std::collections::HashMap;

use crate::common::{Result, StatsError};
use crate::expr::ast::{BinaryOp, Expression, FreeVariable, UnaryOp};
use crate::expr::function::Function;
use crate::histogram::HistogramView;
use crate::sim::clock::ClockId;
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::scheduler::Tick;
use crate::sim::tree::SimTree;

/// Identity of a time-varying leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LeafKey {
    /// A counter node.
    Counter(NodeId),
    /// `g_ticks`.
    Ticks,
    /// `cycles` of a clock.
    Cycles(ClockId),
    /// A reference variable, by name.
    Variable(String),
    /// A histogram function bound to a histogram.
    Histogram(NodeId, String),
}

/// Values of time-varying leaves: the start values of those reachable from one
/// expression, or a [`sample`](Self::sample) of the whole tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Baseline {
    values: HashMap<LeafKey, f64>,
}

impl Baseline {
    /// Captures the current value of every leaf reachable from `expr`.
    pub fn capture(tree: &SimTree, expr: &Expression) -> Self {
        Self::capture_with(&Evaluator::new(tree), expr)
    }

    /// Captures every leaf reachable from `expr` as `evaluator` sees it.
    pub fn capture_with(evaluator: &Evaluator<'_>, expr: &Expression) -> Self {
        let mut baseline = Self::default();
        baseline.capture_into(evaluator, expr, 0);
        baseline
    }

    /// Captures every live counter, `g_ticks`, and the cycle count of every clock.
    pub fn sample(tree: &SimTree) -> Self {
        let mut values = HashMap::new();
        for id in tree.counter_ids() {
            if let Ok(v) = tree.counter_value(id) {
                let _ = values.insert(LeafKey::Counter(id), v as f64);
            }
        }
        for clock in tree.clock_ids() {
            let _ = values.insert(LeafKey::Cycles(clock), tree.current_cycle(clock) as f64);
        }
        let _ = values.insert(LeafKey::Ticks, tree.now() as f64);
        Self { values }
    }

    fn capture_into(&mut self, evaluator: &Evaluator<'_>, expr: &Expression, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let tree = evaluator.tree;
        expr.walk(&mut |e| match e {
            Expression::Node(r) => match tree.node(r.id).map(|n| n.kind()) {
                Ok(NodeKind::Counter(_)) => {
                    let _ = self
                        .values
                        .insert(LeafKey::Counter(r.id), evaluator.eval(e));
                }
                Ok(NodeKind::StatisticDef(_) | NodeKind::ContextCounter(_)) => {
                    if let Some(inner) = tree.resolved_expression(r.id) {
                        self.capture_into(evaluator, inner, depth + 1);
                    }
                }
                _ => {}
            },
            Expression::Free(FreeVariable::Ticks) => {
                let _ = self.values.insert(LeafKey::Ticks, evaluator.eval(e));
            }
            Expression::Free(FreeVariable::Cycles(Some(clock))) => {
                let _ = self
                    .values
                    .insert(LeafKey::Cycles(*clock), evaluator.eval(e));
            }
            Expression::Variable(v) => {
                let _ = self
                    .values
                    .insert(LeafKey::Variable(v.name().to_string()), v.get());
            }
            Expression::Histogram(h) => {
                let _ = self.values.insert(
                    LeafKey::Histogram(h.node, h.function_name.clone()),
                    evaluator.eval(e),
                );
            }
            _ => {}
        });
    }

    /// Tick a tree sample was taken at.
    pub fn tick(&self) -> Option<Tick> {
        self.get(&LeafKey::Ticks).map(|t| t as Tick)
    }

    /// Start value of `key`, if captured.
    pub fn get(&self, key: &LeafKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Number of captured leaves.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Statistic definitions nest at most this deep; finalization rejects cycles, so this
/// only bounds pathological but acyclic chains built outside the tree.
const MAX_DEPTH: usize = 256;

/// Evaluates expressions against a tree.
#[derive(Clone, Copy, Debug)]
pub struct Evaluator<'a> {
    tree: &'a SimTree,
    baseline: Option<&'a Baseline>,
    sample: Option<&'a Baseline>,
}

impl<'a> Evaluator<'a> {
    /// Absolute evaluator.
    pub const fn new(tree: &'a SimTree) -> Self {
        Self {
            tree,
            baseline: None,
            sample: None,
        }
    }

    /// Evaluator that subtracts `baseline` from every captured leaf.
    pub const fn with_baseline(tree: &'a SimTree, baseline: &'a Baseline) -> Self {
        Self {
            tree,
            baseline: Some(baseline),
            sample: None,
        }
    }

    /// Reads sampled leaves from `sample` instead of the live tree.
    #[must_use]
    pub const fn at_sample(mut self, sample: &'a Baseline) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Evaluates `expr`.
    pub fn eval(&self, expr: &Expression) -> f64 {
        self.eval_at(expr, 0)
    }

    fn leaf(&self, key: &LeafKey, live: f64) -> f64 {
        let current = self.sample.and_then(|s| s.get(key)).unwrap_or(live);
        match self.baseline.and_then(|b| b.get(key)) {
            Some(start) => current - start,
            None => current,
        }
    }

    fn eval_at(&self, expr: &Expression, depth: usize) -> f64 {
        if depth > MAX_DEPTH {
            return f64::NAN;
        }
        match expr {
            Expression::Constant(v) => *v,
            Expression::Path(_) | Expression::Free(FreeVariable::Cycles(None) | FreeVariable::FreqMhz(None)) => {
                f64::NAN
            }
            Expression::Node(r) => self.eval_node(r.id, depth),
            Expression::Variable(v) => self.leaf(&LeafKey::Variable(v.name().to_string()), v.get()),
            Expression::Free(FreeVariable::Ticks) => {
                self.leaf(&LeafKey::Ticks, self.tree.now() as f64)
            }
            Expression::Free(FreeVariable::Cycles(Some(clock))) => {
                let cycles = self.tree.clock(*clock).cycle_at(self.tree.now()) as f64;
                self.leaf(&LeafKey::Cycles(*clock), cycles)
            }
            Expression::Free(FreeVariable::FreqMhz(Some(clock))) => {
                self.tree.clock(*clock).frequency_mhz()
            }
            Expression::Unary(op, operand) => {
                let x = self.eval_at(operand, depth + 1);
                match op {
                    UnaryOp::Neg => -x,
                    UnaryOp::Not => f64::from(u8::from(x == 0.0)),
                }
            }
            Expression::Binary(op, lhs, rhs) => {
                let a = self.eval_at(lhs, depth + 1);
                let b = self.eval_at(rhs, depth + 1);
                apply_binary(*op, a, b)
            }
            Expression::Call(function, args) => self.eval_call(*function, args, depth),
            Expression::Histogram(h) => {
                let current = self
                    .tree
                    .node(h.node)
                    .ok()
                    .and_then(|n| match n.kind() {
                        NodeKind::Histogram(hist) => {
                            Some((h.function)(&HistogramView::new(self.tree, h.node, hist)))
                        }
                        _ => None,
                    })
                    .unwrap_or(f64::NAN);
                self.leaf(&LeafKey::Histogram(h.node, h.function_name.clone()), current)
            }
        }
    }

    fn eval_node(&self, id: NodeId, depth: usize) -> f64 {
        let Ok(node) = self.tree.node(id) else {
            return f64::NAN;
        };
        match node.kind() {
            NodeKind::Counter(_) => {
                let current = self.tree.counter_value(id).map_or(f64::NAN, |v| v as f64);
                self.leaf(&LeafKey::Counter(id), current)
            }
            NodeKind::StatisticDef(_) | NodeKind::ContextCounter(_) => self
                .tree
                .resolved_expression(id)
                .map_or(f64::NAN, |inner| self.eval_at(inner, depth + 1)),
            _ => f64::NAN,
        }
    }

    fn eval_call(&self, function: Function, args: &[Expression], depth: usize) -> f64 {
        let arg = |i: usize| {
            args.get(i)
                .map_or(f64::NAN, |a| self.eval_at(a, depth + 1))
        };
        match function {
            Function::IfNan => {
                let a = arg(0);
                if a.is_finite() { a } else { arg(1) }
            }
            Function::Cond => {
                if arg(0) > 0.5 {
                    arg(1)
                } else {
                    arg(2)
                }
            }
            Function::Min | Function::Max | Function::Pow => function.apply_binary(arg(0), arg(1)),
            _ => function.apply_unary(arg(0)),
        }
    }
}

fn truthy(x: f64) -> bool {
    x != 0.0
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Compare(cmp) => f64::from(u8::from(cmp.apply(a, b))),
        BinaryOp::And => f64::from(u8::from(truthy(a) && truthy(b))),
        BinaryOp::Or => f64::from(u8::from(truthy(a) || truthy(b))),
    }
}

impl Expression {
    /// Parses `input` into an unresolved expression.
    pub fn parse(input: &str) -> Result<Self> {
        crate::expr::parser::parse(input)
    }

    /// Resolves every path relative to `context` and binds clock variables to its clock.
    ///
    /// Paths must name a counter, statistic definition, or context counter.
    pub fn resolve(&self, tree: &SimTree, context: NodeId) -> Result<Self> {
        Ok(match self {
            Self::Path(path) => {
                let id = tree.find(context, path)?;
                let node = tree.node(id)?;
                if !node.kind().is_valued() {
                    return Err(StatsError::WrongNodeKind {
                        location: tree.location(id),
                        expected: "counter or statistic",
                    });
                }
                Self::node(id, path.clone())
            }
            Self::Free(FreeVariable::Cycles(None)) => {
                Self::Free(FreeVariable::Cycles(Some(tree.clock_of(context)?)))
            }
            Self::Free(FreeVariable::FreqMhz(None)) => {
                Self::Free(FreeVariable::FreqMhz(Some(tree.clock_of(context)?)))
            }
            Self::Unary(op, operand) => Self::Unary(*op, Box::new(operand.resolve(tree, context)?)),
            Self::Binary(op, lhs, rhs) => Self::binary(
                *op,
                lhs.resolve(tree, context)?,
                rhs.resolve(tree, context)?,
            ),
            Self::Call(function, args) => Self::Call(
                *function,
                args.iter()
                    .map(|a| a.resolve(tree, context))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Constant(_)
            | Self::Node(_)
            | Self::Variable(_)
            | Self::Free(_)
            | Self::Histogram(_) => self.clone(),
        })
    }

    /// Evaluates to an absolute value.
    pub fn evaluate(&self, tree: &SimTree) -> f64 {
        Evaluator::new(tree).eval(self)
    }
}
