//! Statistic definitions.

use crate::common::{ValueSemantic, Visibility};
use crate::expr::ast::Expression;
use crate::sim::node::NodeId;

/// How a definition's expression was supplied.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpressionSource {
    /// Source text, parsed at resolution time.
    Text(String),
    /// A pre-built tree, possibly holding unresolved paths.
    Tree(Expression),
}

impl From<&str> for ExpressionSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ExpressionSource {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Expression> for ExpressionSource {
    fn from(tree: Expression) -> Self {
        Self::Tree(tree)
    }
}

/// How a statistic instance turns absolute evaluations into reported values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SnapshotMode {
    /// `eval(now) - eval(start)`.
    #[default]
    Difference,
    /// Every time-varying leaf is replaced by its own delta before evaluation.
    ///
    /// Ratios such as `hits / accesses` report the ratio of the deltas.
    Leafwise,
    /// No subtraction.
    Absolute,
}

/// A statistic the report should create next to this one (e.g. per-context counters).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubStatistic {
    /// Name suffix in the report.
    pub name: String,
    /// Node the sub-statistic reads.
    pub node: NodeId,
}

/// Named arithmetic expression over counters and other statistics.
///
/// Paths in the expression are resolved relative to the context node, which defaults
/// to the statistic set holding the definition.
///
/// # Examples
///
/// ```
/// use perfstat_core::common::ValueSemantic;
/// use perfstat_core::statistic::{SnapshotMode, StatisticDef};
///
/// let ipc = StatisticDef::new("retired / cycles")
///     .with_semantic(ValueSemantic::Absolute)
///     .with_snapshot_mode(SnapshotMode::Leafwise);
/// assert_eq!(ipc.snapshot_mode(), SnapshotMode::Leafwise);
/// assert!(ipc.resolved().is_none());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct StatisticDef {
    source: ExpressionSource,
    context: Option<NodeId>,
    semantic: ValueSemantic,
    snapshot: SnapshotMode,
    visibility: Visibility,
    sub_statistics: Vec<SubStatistic>,
    resolved: Option<Expression>,
}

impl StatisticDef {
    /// Creates a definition from text or a tree.
    pub fn new(expression: impl Into<ExpressionSource>) -> Self {
        Self {
            source: expression.into(),
            context: None,
            semantic: ValueSemantic::default(),
            snapshot: SnapshotMode::default(),
            visibility: Visibility::NORMAL,
            sub_statistics: Vec::new(),
            resolved: None,
        }
    }

    /// Resolves paths relative to `context` instead of the parent statistic set.
    #[must_use]
    pub const fn with_context(mut self, context: NodeId) -> Self {
        self.context = Some(context);
        self
    }

    /// Sets the value semantic.
    #[must_use]
    pub const fn with_semantic(mut self, semantic: ValueSemantic) -> Self {
        self.semantic = semantic;
        self
    }

    /// Sets the snapshot mode.
    #[must_use]
    pub const fn with_snapshot_mode(mut self, mode: SnapshotMode) -> Self {
        self.snapshot = mode;
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Queues a sub-statistic.
    #[must_use]
    pub fn with_sub_statistic(mut self, name: impl Into<String>, node: NodeId) -> Self {
        self.sub_statistics.push(SubStatistic {
            name: name.into(),
            node,
        });
        self
    }

    /// Expression as supplied.
    pub const fn source(&self) -> &ExpressionSource {
        &self.source
    }

    /// Explicit context node.
    pub const fn context(&self) -> Option<NodeId> {
        self.context
    }

    /// Value semantic.
    pub const fn semantic(&self) -> ValueSemantic {
        self.semantic
    }

    /// Snapshot mode.
    pub const fn snapshot_mode(&self) -> SnapshotMode {
        self.snapshot
    }

    /// Visibility given at construction.
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Pending sub-statistics.
    pub fn sub_statistics(&self) -> &[SubStatistic] {
        &self.sub_statistics
    }

    pub(crate) fn push_sub_statistic(&mut self, name: String, node: NodeId) {
        self.sub_statistics.push(SubStatistic { name, node });
    }

    pub(crate) fn set_source(&mut self, source: ExpressionSource) {
        self.source = source;
        self.resolved = None;
    }

    /// Resolved expression, once resolved.
    pub const fn resolved(&self) -> Option<&Expression> {
        self.resolved.as_ref()
    }

    pub(crate) fn set_resolved(&mut self, expression: Expression) {
        self.resolved = Some(expression);
    }
}
