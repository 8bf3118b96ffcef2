//! Attribute filter language used by autopopulation.
//!
//! A filter is a boolean predicate over a node's instrumentation attributes:
//!
//! ```text
//! vis >= normal && type:counter
//! >=vis:summary || regex tag:"mem_.*"
//! !name:cycles ^^ false
//! ```
//!
//! Evaluation is total: attribute predicates on nodes without attributes are false,
//! and handles to removed nodes never match.

mod lexer;
mod parser;

use std::fmt;

use regex::Regex;

use crate::common::{InstrumentType, Result, Visibility};
use crate::expr::ast::Comparison;
use crate::sim::node::NodeId;
use crate::sim::tree::SimTree;

/// Text predicate on a tag or a name.
#[derive(Clone, Debug)]
pub enum TextMatch {
    /// Exact membership or equality.
    Equal(String),
    /// Negated membership or equality.
    NotEqual(String),
    /// Anchored regex.
    Regex(Regex),
}

impl TextMatch {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Equal(s) => s == candidate,
            Self::NotEqual(s) => s != candidate,
            Self::Regex(re) => re.is_match(candidate),
        }
    }
}

/// Parsed filter tree.
#[derive(Clone, Debug)]
pub enum FilterExpr {
    /// `true` / `false`.
    Literal(bool),
    /// `!x` / `not x`.
    Not(Box<FilterExpr>),
    /// `a && b`.
    And(Box<FilterExpr>, Box<FilterExpr>),
    /// `a || b`.
    Or(Box<FilterExpr>, Box<FilterExpr>),
    /// `a ^^ b`.
    Xor(Box<FilterExpr>, Box<FilterExpr>),
    /// Visibility comparison against a reference level.
    Vis(Comparison, Visibility),
    /// Instrument type identity.
    Type {
        /// `!=` rather than `==`.
        negate: bool,
        /// Type compared against.
        ty: InstrumentType,
    },
    /// Tag predicate.
    Tag(TextMatch),
    /// Name predicate.
    Name(TextMatch),
}

impl FilterExpr {
    fn eval(&self, tree: &SimTree, node: NodeId) -> bool {
        match self {
            Self::Literal(b) => *b,
            Self::Not(inner) => !inner.eval(tree, node),
            Self::And(a, b) => a.eval(tree, node) && b.eval(tree, node),
            Self::Or(a, b) => a.eval(tree, node) || b.eval(tree, node),
            Self::Xor(a, b) => a.eval(tree, node) ^ b.eval(tree, node),
            Self::Vis(cmp, level) => attrs_of(tree, node)
                .is_some_and(|a| cmp.apply(f64::from(a.visibility.0), f64::from(level.0))),
            Self::Type { negate, ty } => {
                attrs_of(tree, node).is_some_and(|a| (a.ty == *ty) != *negate)
            }
            Self::Tag(m) => attrs_of(tree, node).is_some_and(|a| match m {
                TextMatch::Equal(t) => a.tags.contains(t),
                TextMatch::NotEqual(t) => !a.tags.contains(t),
                TextMatch::Regex(_) => a.tags.iter().any(|t| m.matches(t)),
            }),
            Self::Name(m) => tree.node(node).is_ok_and(|n| m.matches(n.name())),
        }
    }
}

fn attrs_of(tree: &SimTree, node: NodeId) -> Option<&crate::common::InstrumentAttrs> {
    tree.node(node).ok().and_then(|n| n.attrs())
}

/// A compiled filter with its source text.
///
/// # Examples
///
/// ```
/// use perfstat_core::SimTree;
/// use perfstat_core::counter::CounterBehavior;
/// use perfstat_core::filter::Filter;
///
/// let mut tree = SimTree::new();
/// let stats = tree.statistic_set(tree.root()).unwrap();
/// let retired = tree.add_counter(stats, "retired", "Retired", CounterBehavior::Normal).unwrap();
///
/// let filter = Filter::parse("vis >= normal && type:counter").unwrap();
/// assert!(filter.matches(&tree, retired));
/// assert!(!filter.matches(&tree, stats));
/// ```
#[derive(Clone, Debug)]
pub struct Filter {
    source: String,
    expr: FilterExpr,
}

impl Filter {
    /// Compiles `source`.
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    /// Filter that accepts every instrumented node.
    pub fn accept_all() -> Self {
        Self {
            source: "true".to_string(),
            expr: FilterExpr::Literal(true),
        }
    }

    /// Source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed tree.
    pub const fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    /// Evaluates the filter on `node`.
    pub fn matches(&self, tree: &SimTree, node: NodeId) -> bool {
        self.expr.eval(tree, node)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
