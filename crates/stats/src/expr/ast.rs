//! Expression tree.
//!
//! Expressions are plain values: cloning one copies the tree. Leaves that refer to
//! observables hold a [`NodeId`] into the simulation tree, never a borrow, so an
//! expression can outlive the node it names; evaluation of a stale reference yields NaN.

use std::cell::Cell;
use std::fmt;
use std::ops;
use std::rc::Rc;

use crate::expr::function::Function;
use crate::histogram::HistogramFn;
use crate::sim::clock::ClockId;
use crate::sim::node::NodeId;

/// Comparison operator shared by statistics and triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl Comparison {
    /// Applies the comparison.
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }

    /// Source spelling.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Parses a source spelling.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }
}

/// Prefix operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not (`1` if the operand is zero, else `0`).
    Not,
}

/// Infix operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `**`
    Pow,
    /// Comparison yielding `1` or `0`.
    Compare(Comparison),
    /// Logical and (`&&`, `logical_and`).
    And,
    /// Logical or (`||`, `logical_or`).
    Or,
}

impl BinaryOp {
    /// Source spelling.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::Compare(c) => c.symbol(),
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Free variable read from the evaluation context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FreeVariable {
    /// Absolute scheduler tick.
    Ticks,
    /// Cycles of the context clock; `None` until resolved.
    Cycles(Option<ClockId>),
    /// Frequency of the context clock in MHz; `None` until resolved.
    FreqMhz(Option<ClockId>),
}

impl FreeVariable {
    /// Source spelling.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ticks => "g_ticks",
            Self::Cycles(_) => "cycles",
            Self::FreqMhz(_) => "freq_mhz",
        }
    }
}

/// Resolved reference to a valued node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRef {
    /// Target node.
    pub id: NodeId,
    /// Path as written, kept for display.
    pub label: String,
}

/// A named double owned outside the tree.
#[derive(Clone)]
pub struct ReferenceVariable {
    name: String,
    cell: Rc<Cell<f64>>,
}

impl ReferenceVariable {
    /// Creates a variable holding `initial`.
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self::from_cell(name, Rc::new(Cell::new(initial)))
    }

    /// Wraps an existing shared cell.
    pub fn from_cell(name: impl Into<String>, cell: Rc<Cell<f64>>) -> Self {
        Self {
            name: name.into(),
            cell,
        }
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> f64 {
        self.cell.get()
    }

    /// Assigns a new value.
    #[inline]
    pub fn set(&self, value: f64) {
        self.cell.set(value);
    }

    /// Shared cell backing the variable.
    pub fn cell(&self) -> Rc<Cell<f64>> {
        Rc::clone(&self.cell)
    }
}

impl fmt::Debug for ReferenceVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceVariable")
            .field("name", &self.name)
            .field("value", &self.cell.get())
            .finish()
    }
}

impl PartialEq for ReferenceVariable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Rc::ptr_eq(&self.cell, &other.cell)
    }
}

/// A registered histogram function bound to one histogram.
#[derive(Clone, Debug)]
pub struct HistogramCall {
    /// Histogram node.
    pub node: NodeId,
    /// Histogram path as written.
    pub label: String,
    /// Registered function name.
    pub function_name: String,
    /// The function itself.
    pub function: HistogramFn,
}

impl PartialEq for HistogramCall {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.function_name == other.function_name
    }
}

/// Arithmetic expression over counters, statistics, and free variables.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// Literal.
    Constant(f64),
    /// Path not yet resolved against a context node.
    Path(String),
    /// Resolved reference to a counter, statistic definition, or context counter.
    Node(NodeRef),
    /// Externally owned double.
    Variable(ReferenceVariable),
    /// Scheduler/clock variable.
    Free(FreeVariable),
    /// Prefix operation.
    Unary(UnaryOp, Box<Expression>),
    /// Infix operation.
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    /// Built-in function call.
    Call(Function, Vec<Expression>),
    /// Registered histogram function.
    Histogram(HistogramCall),
}

impl Expression {
    /// Literal constructor.
    pub const fn constant(value: f64) -> Self {
        Self::Constant(value)
    }

    /// Unresolved path constructor.
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// Resolved node reference constructor.
    pub fn node(id: NodeId, label: impl Into<String>) -> Self {
        Self::Node(NodeRef {
            id,
            label: label.into(),
        })
    }

    /// Binary operation constructor.
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Function call constructor.
    pub const fn call(function: Function, args: Vec<Self>) -> Self {
        Self::Call(function, args)
    }

    /// Sums `terms`, yielding `0` for an empty list.
    pub fn sum(terms: impl IntoIterator<Item = Self>) -> Self {
        terms
            .into_iter()
            .reduce(|acc, term| acc + term)
            .unwrap_or(Self::Constant(0.0))
    }

    /// Visits every node of the tree in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self)) {
        visit(self);
        match self {
            Self::Unary(_, operand) => operand.walk(visit),
            Self::Binary(_, lhs, rhs) => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Self::Call(_, args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Self::Constant(_)
            | Self::Path(_)
            | Self::Node(_)
            | Self::Variable(_)
            | Self::Free(_)
            | Self::Histogram(_) => {}
        }
    }

    /// True if any leaf changes as the simulation advances.
    ///
    /// Constants and `freq_mhz` are fixed; everything else varies.
    pub fn is_time_varying(&self) -> bool {
        let mut varying = false;
        self.walk(&mut |e| {
            varying |= matches!(
                e,
                Self::Path(_)
                    | Self::Node(_)
                    | Self::Variable(_)
                    | Self::Histogram(_)
                    | Self::Free(FreeVariable::Ticks | FreeVariable::Cycles(_))
            );
        });
        varying
    }

    /// True once no unresolved path or free variable remains.
    pub fn is_resolved(&self) -> bool {
        let mut resolved = true;
        self.walk(&mut |e| {
            resolved &= !matches!(
                e,
                Self::Path(_) | Self::Free(FreeVariable::Cycles(None) | FreeVariable::FreqMhz(None))
            );
        });
        resolved
    }

    /// Nodes referenced directly by this expression.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(&mut |e| match e {
            Self::Node(r) => out.push(r.id),
            Self::Histogram(h) => out.push(h.node),
            _ => {}
        });
        out
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<ReferenceVariable> for Expression {
    fn from(var: ReferenceVariable) -> Self {
        Self::Variable(var)
    }
}

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expression {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                Self::binary($op, self, rhs)
            }
        }
    };
}

impl_binary_operator!(Add, add, BinaryOp::Add);
impl_binary_operator!(Sub, sub, BinaryOp::Sub);
impl_binary_operator!(Mul, mul, BinaryOp::Mul);
impl_binary_operator!(Div, div, BinaryOp::Div);

impl ops::Neg for Expression {
    type Output = Self;

    fn neg(self) -> Self {
        Self::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v}"),
            Self::Path(p) => f.write_str(p),
            Self::Node(r) => f.write_str(&r.label),
            Self::Variable(v) => f.write_str(v.name()),
            Self::Free(var) => f.write_str(var.name()),
            Self::Unary(UnaryOp::Neg, operand) => write!(f, "-{operand}"),
            Self::Unary(UnaryOp::Not, operand) => write!(f, "!{operand}"),
            Self::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Self::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Histogram(h) => write!(f, "hist_def.{}.{}", h.label, h.function_name),
        }
    }
}
