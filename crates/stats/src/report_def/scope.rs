//! Walk state pushed and popped per map entry.

use std::path::PathBuf;

use crate::sim::node::NodeId;

/// One context node the current block applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Target {
    /// Node relative paths resolve against.
    pub(super) node: NodeId,
    /// Wildcard captures accumulated on the way here.
    pub(super) captures: Vec<String>,
    /// Sub-report indices from the root report to the report receiving leaves.
    pub(super) report: Vec<usize>,
}

/// Everything a block needs to know about where it sits.
#[derive(Clone, Debug)]
pub(super) struct Scope {
    pub(super) targets: Vec<Target>,
    pub(super) in_report: bool,
    pub(super) in_content: bool,
    pub(super) optional: bool,
    pub(super) skip_leaves: bool,
    /// Set while walking a file included from inside a content block.
    pub(super) content_include: bool,
    /// Directory includes are resolved against.
    pub(super) dir: PathBuf,
}

impl Scope {
    pub(super) fn root(node: NodeId, dir: PathBuf) -> Self {
        Self {
            targets: vec![Target {
                node,
                captures: Vec::new(),
                report: Vec::new(),
            }],
            in_report: false,
            in_content: false,
            optional: false,
            skip_leaves: false,
            content_include: false,
            dir,
        }
    }

    pub(super) fn with_targets(&self, targets: Vec<Target>) -> Self {
        Self {
            targets,
            ..self.clone()
        }
    }
}
