//! Sub-tree traversal and autopopulation.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::model::Report;
use crate::common::Result;
use crate::filter::Filter;
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::path::substitute;
use crate::sim::tree::SimTree;

/// Where a traversal opens a sub-report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubreportPlan {
    /// Sub-report name.
    pub name: String,
    /// Nest under the current sub-report rather than beside it.
    pub nested: bool,
}

/// Decides whether to open a sub-report at a node: `(tree, node, depth, report_depth)`.
pub type MakeSubreportFn<'a> = dyn Fn(&SimTree, NodeId, usize, usize) -> Option<SubreportPlan> + 'a;

/// Node predicate used to gate recursion and leaves.
pub type IncludeFn<'a> = dyn Fn(&SimTree, NodeId) -> bool + 'a;

/// Callbacks and limits for [`Report::add_subtree`].
pub struct SubtreeOptions<'a> {
    /// Sub-report placement.
    pub make_subreport: &'a MakeSubreportFn<'a>,
    /// Gates recursion into a non-valued node.
    pub include_branch: &'a IncludeFn<'a>,
    /// Gates adding a valued node.
    pub include_leaf: &'a IncludeFn<'a>,
    /// Add counters.
    pub add_counters: bool,
    /// Add statistic definitions and context counters.
    pub add_stats: bool,
    /// Deepest level visited below the traversal root; unlimited when `None`.
    pub max_recursion: Option<usize>,
}

struct PlanNode {
    name: String,
    anchor: NodeId,
    parent: Option<usize>,
    depth: usize,
    leaves: Vec<NodeId>,
    children: Vec<usize>,
}

struct Planner<'o, 'a> {
    options: &'o SubtreeOptions<'a>,
    plan: Vec<PlanNode>,
}

impl Planner<'_, '_> {
    fn visit(&mut self, tree: &SimTree, node: NodeId, depth: usize, current: usize) {
        let Ok(n) = tree.node(node) else {
            return;
        };
        for child in n.children() {
            let Ok(c) = tree.node(*child) else {
                continue;
            };
            match c.kind() {
                NodeKind::Counter(_) if self.options.add_counters => {
                    if (self.options.include_leaf)(tree, *child) {
                        self.plan[current].leaves.push(*child);
                    }
                }
                NodeKind::StatisticDef(_) | NodeKind::ContextCounter(_) if self.options.add_stats => {
                    if (self.options.include_leaf)(tree, *child) {
                        self.plan[current].leaves.push(*child);
                    }
                }
                NodeKind::Histogram(_)
                    if (self.options.add_counters || self.options.add_stats)
                        && (self.options.include_leaf)(tree, *child) =>
                {
                    self.plan[current].leaves.push(*child);
                }
                kind if kind.is_valued() => {}
                NodeKind::Parameter(_) => {}
                _ => {
                    let next_depth = depth + 1;
                    if self.options.max_recursion.is_some_and(|max| next_depth > max)
                        || !(self.options.include_branch)(tree, *child)
                    {
                        continue;
                    }
                    let target = self.open(tree, *child, next_depth, current);
                    self.visit(tree, *child, next_depth, target);
                }
            }
        }
    }

    fn open(&mut self, tree: &SimTree, node: NodeId, depth: usize, current: usize) -> usize {
        let report_depth = self.plan[current].depth;
        let Some(plan) = (self.options.make_subreport)(tree, node, depth, report_depth) else {
            return current;
        };
        let parent = if plan.nested {
            current
        } else {
            self.plan[current].parent.unwrap_or(0)
        };
        let index = self.plan.len();
        self.plan.push(PlanNode {
            name: plan.name,
            anchor: node,
            parent: Some(parent),
            depth: self.plan[parent].depth + 1,
            leaves: Vec::new(),
            children: Vec::new(),
        });
        self.plan[parent].children.push(index);
        index
    }
}

fn relative_name(tree: &SimTree, anchor: NodeId, leaf: NodeId) -> String {
    let anchor_loc = tree.location(anchor);
    let leaf_loc = tree.location(leaf);
    leaf_loc
        .strip_prefix(&anchor_loc)
        .and_then(|rest| rest.strip_prefix('.'))
        .map_or_else(|| leaf_loc.clone(), ToString::to_string)
}

impl Report {
    /// Adds the valued nodes below `root`, opening sub-reports where
    /// `options.make_subreport` asks for them.
    ///
    /// Leaves are named by their path relative to the node that anchors their
    /// sub-report. A histogram accepted by `include_leaf` is added whole, otherwise
    /// it is walked like a branch. Nodes already anywhere in the target report are
    /// skipped, and generated sub-reports left empty are pruned. Returns the number of
    /// statistics added.
    pub fn add_subtree(
        &mut self,
        tree: &SimTree,
        root: NodeId,
        options: &SubtreeOptions<'_>,
    ) -> Result<usize> {
        let _ = tree.node(root)?;
        let mut planner = Planner {
            options,
            plan: vec![PlanNode {
                name: self.name().to_string(),
                anchor: root,
                parent: None,
                depth: 0,
                leaves: Vec::new(),
                children: Vec::new(),
            }],
        };
        planner.visit(tree, root, 0, 0);
        let mut present = HashSet::new();
        self.all_nodes(&mut present);
        let added = self.apply_plan(tree, &planner.plan, 0, &mut present)?;
        self.prune_generated();
        Ok(added)
    }

    fn all_nodes(&self, out: &mut HashSet<NodeId>) {
        out.extend(self.nodes.iter().copied());
        for sub in &self.subreports {
            sub.all_nodes(out);
        }
    }

    fn apply_plan(
        &mut self,
        tree: &SimTree,
        plan: &[PlanNode],
        index: usize,
        present: &mut HashSet<NodeId>,
    ) -> Result<usize> {
        let entry = &plan[index];
        let mut added = 0;
        for leaf in &entry.leaves {
            if !present.insert(*leaf) {
                continue;
            }
            let name = relative_name(tree, entry.anchor, *leaf);
            if self.contains_stat(&name) {
                warn!(report = %self.name(), stat = %name, "skipping duplicate statistic name");
                continue;
            }
            let before = self.stats.len();
            self.add(tree, *leaf, &name)?;
            added += self.stats.len() - before;
        }
        for child in &entry.children {
            let child_entry = &plan[*child];
            let sub = self.generated_subreport(&child_entry.name, child_entry.anchor);
            added += sub.apply_plan(tree, plan, *child, present)?;
        }
        Ok(added)
    }

    /// Adds every instrumented node below `node` that passes `filter`.
    ///
    /// `%N` in the filter expands to `captures`. A sub-report opens at each resource
    /// and at each unit's statistic set below `node` while fewer than
    /// `max_report_depth` sub-reports are nested. Histograms matching the filter are
    /// added whole, so `type:histogram` selects them. Repeating a call with the same
    /// node and filter is a no-op.
    pub fn autopopulate(
        &mut self,
        tree: &SimTree,
        node: NodeId,
        filter: &str,
        captures: &[String],
        max_recursion: Option<usize>,
        max_report_depth: Option<usize>,
    ) -> Result<usize> {
        let filter_text = if filter.contains('%') {
            substitute(filter, &tree.location(node), captures)?
        } else {
            filter.to_string()
        };
        if !self.populated.insert((node, filter_text.clone())) {
            warn!(
                report = %self.name(),
                node = %tree.location(node),
                filter = %filter_text,
                "duplicate autopopulation ignored"
            );
            return Ok(0);
        }
        let filter = if filter_text.trim().is_empty() {
            Filter::accept_all()
        } else {
            Filter::parse(&filter_text)?
        };
        let make_subreport = |tree: &SimTree, n: NodeId, _depth: usize, report_depth: usize| {
            if max_report_depth.is_some_and(|max| report_depth >= max) {
                return None;
            }
            let node = tree.node(n).ok()?;
            let boundary = match node.kind() {
                NodeKind::Resource | NodeKind::Root => true,
                NodeKind::StatisticSet => node
                    .parent()
                    .and_then(|p| tree.node(p).ok())
                    .is_some_and(|p| !matches!(p.kind(), NodeKind::Histogram(_))),
                _ => false,
            };
            boundary.then(|| SubreportPlan {
                name: node.name().to_string(),
                nested: true,
            })
        };
        let include_branch = |_: &SimTree, _: NodeId| true;
        let include_leaf = |tree: &SimTree, n: NodeId| filter.matches(tree, n);
        let options = SubtreeOptions {
            make_subreport: &make_subreport,
            include_branch: &include_branch,
            include_leaf: &include_leaf,
            add_counters: true,
            add_stats: true,
            max_recursion,
        };
        let added = self.add_subtree(tree, node, &options)?;
        debug!(
            report = %self.name(),
            node = %tree.location(node),
            filter = %filter,
            added,
            "autopopulated"
        );
        Ok(added)
    }
}
