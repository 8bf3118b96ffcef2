//! Built-in function and constant table.

use crate::expr::ast::{BinaryOp, Comparison, Expression, FreeVariable};

/// Built-in function with a fixed arity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    /// `abs(x)`
    Abs,
    /// `sqrt(x)`
    Sqrt,
    /// `exp(x)`
    Exp,
    /// `log2(x)`
    Log2,
    /// `log10(x)`
    Log10,
    /// `ln(x)`
    Ln,
    /// `floor(x)`
    Floor,
    /// `ceil(x)`
    Ceil,
    /// `round(x)`
    Round,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
    /// `pow(a, b)`
    Pow,
    /// `ifnan(a, b)`: `b` when `a` is NaN or infinite.
    IfNan,
    /// `cond(p, t, f)`: `t` when `p > 0.5`, else `f`.
    Cond,
}

impl Function {
    /// Source spelling.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log2 => "log2",
            Self::Log10 => "log10",
            Self::Ln => "ln",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Min => "min",
            Self::Max => "max",
            Self::Pow => "pow",
            Self::IfNan => "ifnan",
            Self::Cond => "cond",
        }
    }

    /// Number of arguments.
    pub const fn arity(self) -> usize {
        match self {
            Self::Abs
            | Self::Sqrt
            | Self::Exp
            | Self::Log2
            | Self::Log10
            | Self::Ln
            | Self::Floor
            | Self::Ceil
            | Self::Round => 1,
            Self::Min | Self::Max | Self::Pow | Self::IfNan => 2,
            Self::Cond => 3,
        }
    }

    /// Applies a one-argument function.
    pub fn apply_unary(self, x: f64) -> f64 {
        match self {
            Self::Abs => x.abs(),
            Self::Sqrt => x.sqrt(),
            Self::Exp => x.exp(),
            Self::Log2 => x.log2(),
            Self::Log10 => x.log10(),
            Self::Ln => x.ln(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Round => x.round(),
            _ => f64::NAN,
        }
    }

    /// Applies a two-argument function other than `ifnan`.
    pub fn apply_binary(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Pow => a.powf(b),
            _ => f64::NAN,
        }
    }
}

/// What a name in call position binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callable {
    /// A built-in function.
    Function(Function),
    /// A primitive that lowers to an infix operator (`is_greater`, `logical_and`, ...).
    Operator(BinaryOp),
}

impl Callable {
    /// Number of arguments.
    pub const fn arity(self) -> usize {
        match self {
            Self::Function(f) => f.arity(),
            Self::Operator(_) => 2,
        }
    }
}

const FUNCTIONS: &[Function] = &[
    Function::Abs,
    Function::Sqrt,
    Function::Exp,
    Function::Log2,
    Function::Log10,
    Function::Ln,
    Function::Floor,
    Function::Ceil,
    Function::Round,
    Function::Min,
    Function::Max,
    Function::Pow,
    Function::IfNan,
    Function::Cond,
];

/// Looks up a name used in call position.
pub fn lookup_callable(name: &str) -> Option<Callable> {
    let op = match name {
        "is_greater" => Some(BinaryOp::Compare(Comparison::Gt)),
        "is_lesser" => Some(BinaryOp::Compare(Comparison::Lt)),
        "is_equal" => Some(BinaryOp::Compare(Comparison::Eq)),
        "is_not_equal" => Some(BinaryOp::Compare(Comparison::Ne)),
        "is_greater_equal" => Some(BinaryOp::Compare(Comparison::Ge)),
        "is_lesser_equal" => Some(BinaryOp::Compare(Comparison::Le)),
        "logical_and" => Some(BinaryOp::And),
        "logical_or" => Some(BinaryOp::Or),
        _ => None,
    };
    if let Some(op) = op {
        return Some(Callable::Operator(op));
    }
    FUNCTIONS
        .iter()
        .copied()
        .find(|f| f.name() == name)
        .map(Callable::Function)
}

/// Looks up a bare identifier that names a constant or free variable.
pub fn lookup_builtin(name: &str) -> Option<Expression> {
    match name {
        "inf" => Some(Expression::Constant(f64::INFINITY)),
        "nan" => Some(Expression::Constant(f64::NAN)),
        "g_ticks" => Some(Expression::Free(FreeVariable::Ticks)),
        "cycles" => Some(Expression::Free(FreeVariable::Cycles(None))),
        "freq_mhz" => Some(Expression::Free(FreeVariable::FreqMhz(None))),
        _ => None,
    }
}
