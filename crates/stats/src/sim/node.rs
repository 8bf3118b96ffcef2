//! Simulation tree nodes.
//!
//! Nodes live in an arena owned by [`SimTree`](crate::sim::SimTree) and are addressed by
//! a [`NodeId`] carrying a generation, so a handle to a removed node is detected rather
//! than silently aliasing whatever reuses its slot.

use std::fmt;

use crate::common::InstrumentAttrs;
use crate::context_counter::ContextCounter;
use crate::counter::CounterNode;
use crate::histogram::Histogram;
use crate::sim::clock::ClockId;
use crate::statistic::StatisticDef;

/// Stable handle on an arena slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    /// Arena index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// A model parameter exposed for filtering and reporting.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Printable value.
    pub value: String,
}

/// What a node is.
#[derive(Debug)]
pub enum NodeKind {
    /// The single tree root.
    Root,
    /// A structural node with no instrumentation of its own.
    Generic,
    /// A modeled unit; reports open sub-reports at these boundaries.
    Resource,
    /// Container for counters and statistic definitions.
    StatisticSet,
    /// Plain, cycle, or read-only counter.
    Counter(CounterNode),
    /// Named expression.
    StatisticDef(StatisticDef),
    /// Statistic definition owning N context counters.
    ContextCounter(ContextCounter),
    /// Model parameter.
    Parameter(Parameter),
    /// Value, cycle, or state histogram.
    Histogram(Histogram),
}

impl NodeKind {
    /// Short name used in diagnostics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Generic => "node",
            Self::Resource => "resource",
            Self::StatisticSet => "statistic set",
            Self::Counter(_) => "counter",
            Self::StatisticDef(_) => "statistic definition",
            Self::ContextCounter(_) => "context counter",
            Self::Parameter(_) => "parameter",
            Self::Histogram(_) => "histogram",
        }
    }

    /// True for nodes that evaluate to a number.
    pub const fn is_valued(&self) -> bool {
        matches!(
            self,
            Self::Counter(_) | Self::StatisticDef(_) | Self::ContextCounter(_)
        )
    }
}

/// Membership in a named group of siblings (e.g. `core` index 3).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Group {
    /// Group name.
    pub name: String,
    /// Index within the group.
    pub index: u32,
}

/// One node of the simulation tree.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) group: Option<Group>,
    pub(crate) clock: Option<ClockId>,
    pub(crate) kind: NodeKind,
    pub(crate) attrs: Option<InstrumentAttrs>,
}

impl Node {
    pub(crate) fn new(name: String, parent: Option<NodeId>, kind: NodeKind) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            group: None,
            clock: None,
            kind,
            attrs: None,
        }
    }

    /// Node name (last path segment).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent handle, `None` for the root.
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Group membership.
    pub const fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    /// Clock assigned directly to this node, if any.
    pub const fn own_clock(&self) -> Option<ClockId> {
        self.clock
    }

    /// Node kind.
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Instrumentation attributes, present on counters, statistics, parameters, and histograms.
    pub const fn attrs(&self) -> Option<&InstrumentAttrs> {
        self.attrs.as_ref()
    }
}
