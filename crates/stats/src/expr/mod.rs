//! Statistic expression engine.
//!
//! Expressions are parsed from text or built programmatically, resolved against a
//! context node once the tree is finalized, and evaluated to an absolute double.
//! Delta reporting is layered on top by [`StatisticInstance`](crate::statistic::StatisticInstance).

/// Expression tree.
pub mod ast;

/// Resolution and evaluation.
pub mod eval;

/// Built-in functions and constants.
pub mod function;

/// Tokenizer.
pub mod lexer;

/// Recursive-descent parser.
pub mod parser;

pub use ast::{
    BinaryOp, Comparison, Expression, FreeVariable, HistogramCall, NodeRef, ReferenceVariable,
    UnaryOp,
};
pub use eval::{Baseline, Evaluator, LeafKey};
pub use function::Function;
