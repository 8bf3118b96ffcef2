//! The report tree.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Map;
use tracing::{debug, info};

use super::format::ReportFormatter;
use super::snapshot::{ReportSnapshot, StatSnapshot};
use super::trigger::{ReportContainer, Trigger};
use crate::common::{Result, StatsError};
use crate::expr::ast::Expression;
use crate::expr::eval::Baseline;
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::tree::SimTree;
use crate::statistic::{SnapshotMode, StatisticInstance};

/// Something a report can hold.
#[derive(Clone, Debug)]
pub enum StatTarget {
    /// A counter, statistic definition, context counter, or histogram node.
    Node(NodeId),
    /// A free-standing expression, resolved against the report context.
    Expression(Expression),
    /// A path relative to the report context, or expression text.
    Path(String),
}

impl From<NodeId> for StatTarget {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<Expression> for StatTarget {
    fn from(expr: Expression) -> Self {
        Self::Expression(expr)
    }
}

impl From<&str> for StatTarget {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for StatTarget {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

#[derive(Clone, Debug)]
pub(super) struct ReportStat {
    pub(super) instance: StatisticInstance,
    pub(super) subs: Vec<StatisticInstance>,
}

impl ReportStat {
    fn instances_mut(&mut self) -> impl Iterator<Item = &mut StatisticInstance> {
        std::iter::once(&mut self.instance).chain(self.subs.iter_mut())
    }
}

/// A named selection of statistics, with nested sub-reports and optional triggers.
///
/// Statistic names are unique within one report; empty names are anonymous and never
/// collide. Every report of one tree shares a single [`ReportContainer`].
#[derive(Debug)]
pub struct Report {
    name: String,
    author: String,
    context: NodeId,
    pub(super) stats: Vec<ReportStat>,
    names: HashSet<String>,
    pub(super) nodes: HashSet<NodeId>,
    pub(super) subreports: Vec<Report>,
    styles: IndexMap<String, String>,
    header: IndexMap<String, String>,
    start_trigger: Option<Trigger>,
    stop_trigger: Option<Trigger>,
    container: Rc<RefCell<ReportContainer>>,
    pub(super) populated: HashSet<(NodeId, String)>,
    pub(super) generated: bool,
    started: bool,
    ended: bool,
    active: bool,
}

impl Report {
    /// Creates an active root report resolving paths relative to `context`.
    pub fn new(name: impl Into<String>, context: NodeId) -> Self {
        Self {
            name: name.into(),
            author: String::new(),
            context,
            stats: Vec::new(),
            names: HashSet::new(),
            nodes: HashSet::new(),
            subreports: Vec::new(),
            styles: IndexMap::new(),
            header: IndexMap::new(),
            start_trigger: None,
            stop_trigger: None,
            container: Rc::new(RefCell::new(ReportContainer::default())),
            populated: HashSet::new(),
            generated: false,
            started: true,
            ended: false,
            active: true,
        }
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Report name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the report.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Report author.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Sets the author.
    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    /// Node paths are resolved against.
    pub const fn context(&self) -> NodeId {
        self.context
    }

    /// Changes the node paths are resolved against.
    pub fn set_context(&mut self, context: NodeId) {
        self.context = context;
    }

    /// Container shared with every report of this tree.
    pub fn container(&self) -> Rc<RefCell<ReportContainer>> {
        Rc::clone(&self.container)
    }

    fn share_container(&mut self, container: &Rc<RefCell<ReportContainer>>) {
        self.container = Rc::clone(container);
        for sub in &mut self.subreports {
            sub.share_container(container);
        }
    }

    // ---------------------------------------------------------------------
    // Statistics
    // ---------------------------------------------------------------------

    /// Adds `target` under `name` (empty for anonymous).
    ///
    /// Path strings are looked up as a node relative to the context first; otherwise
    /// they are parsed as an expression. Adding a histogram adds every valued child of
    /// its statistic set, named `name.child`.
    pub fn add(&mut self, tree: &SimTree, target: impl Into<StatTarget>, name: &str) -> Result<()> {
        if !name.is_empty() && self.names.contains(name) {
            return Err(StatsError::DuplicateStatName {
                name: name.to_string(),
                report: self.name.clone(),
            });
        }
        match target.into() {
            StatTarget::Node(id) => self.add_node(tree, id, name),
            StatTarget::Expression(expr) => {
                self.add_expression(tree, expr, name, SnapshotMode::Difference)
            }
            StatTarget::Path(path) => match tree.try_find(self.context, &path) {
                Some(id) => self.add_node(tree, id, name),
                None => {
                    let expr = Expression::parse(&path)?;
                    self.add_expression(tree, expr, name, SnapshotMode::Difference)
                }
            },
        }
    }

    /// Adds a free-standing expression, resolved against the context, reported in
    /// `mode`.
    pub fn add_expression(
        &mut self,
        tree: &SimTree,
        expression: Expression,
        name: &str,
        mode: SnapshotMode,
    ) -> Result<()> {
        if !name.is_empty() && self.names.contains(name) {
            return Err(StatsError::DuplicateStatName {
                name: name.to_string(),
                report: self.name.clone(),
            });
        }
        let resolved = expression.resolve(tree, self.context)?;
        let instance = StatisticInstance::for_expression(tree, resolved, name, mode);
        self.push(name, ReportStat {
            instance,
            subs: Vec::new(),
        });
        Ok(())
    }

    fn add_node(&mut self, tree: &SimTree, id: NodeId, name: &str) -> Result<()> {
        let node = tree.node(id)?;
        if let NodeKind::Histogram(histogram) = node.kind() {
            let stats = histogram.nodes().stats;
            for child in tree.node(stats)?.children() {
                let child_node = tree.node(*child)?;
                if !child_node.kind().is_valued() {
                    continue;
                }
                let child_name = if name.is_empty() {
                    String::new()
                } else {
                    format!("{name}.{}", child_node.name())
                };
                self.add(tree, *child, &child_name)?;
            }
            let _ = self.nodes.insert(id);
            return Ok(());
        }
        let instance = StatisticInstance::for_node(tree, id, name)?;
        let mut subs = Vec::new();
        if let Some(def) = tree.definition(id) {
            for sub in def.sub_statistics() {
                subs.push(StatisticInstance::for_node(tree, sub.node, sub.name.clone())?);
            }
        }
        let _ = self.nodes.insert(id);
        self.push(name, ReportStat { instance, subs });
        Ok(())
    }

    fn push(&mut self, name: &str, stat: ReportStat) {
        if !name.is_empty() {
            let _ = self.names.insert(name.to_string());
        }
        debug!(report = %self.name, stat = %stat.instance.location(), name, "added statistic");
        self.stats.push(stat);
    }

    /// True if a statistic named `name` exists in this report.
    pub fn contains_stat(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// True if `node` is already reported here.
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Statistics of this report in insertion order.
    pub fn statistics(&self) -> impl Iterator<Item = &StatisticInstance> {
        self.stats.iter().map(|s| &s.instance)
    }

    /// Number of statistics in this report.
    pub fn num_stats(&self) -> usize {
        self.stats.len()
    }

    /// Display names of this report's statistics, anonymous ones by location.
    pub fn stat_names(&self) -> Vec<String> {
        self.stats
            .iter()
            .map(|s| display_name(&s.instance).to_string())
            .collect()
    }

    /// Display names of every statistic in this report and its sub-reports,
    /// prefixed by the sub-report chain.
    pub fn all_stat_names(&self) -> Vec<String> {
        let mut out = self.stat_names();
        for sub in &self.subreports {
            out.extend(
                sub.all_stat_names()
                    .into_iter()
                    .map(|n| format!("{}.{n}", sub.name)),
            );
        }
        out
    }

    /// Number of statistics in this report and every sub-report.
    pub fn total_stats(&self) -> usize {
        self.stats.len() + self.subreports.iter().map(Self::total_stats).sum::<usize>()
    }

    // ---------------------------------------------------------------------
    // Sub-reports
    // ---------------------------------------------------------------------

    /// Appends a new sub-report sharing this report's context and container.
    pub fn add_subreport(&mut self, name: impl Into<String>) -> &mut Self {
        let mut sub = Self::new(name, self.context);
        sub.share_container(&self.container);
        self.push_subreport(sub)
    }

    /// Appends an existing report as a sub-report; it joins this tree's container.
    pub fn add_subreport_report(&mut self, mut report: Self) -> &mut Self {
        report.share_container(&self.container);
        self.push_subreport(report)
    }

    fn push_subreport(&mut self, report: Self) -> &mut Self {
        let index = self.subreports.len();
        self.subreports.push(report);
        &mut self.subreports[index]
    }

    pub(super) fn generated_subreport(&mut self, name: &str, context: NodeId) -> &mut Self {
        if let Some(index) = self.subreports.iter().position(|r| r.name == name) {
            return &mut self.subreports[index];
        }
        let sub = self.add_subreport(name);
        sub.context = context;
        sub.generated = true;
        sub
    }

    /// Sub-reports in insertion order.
    pub fn subreports(&self) -> &[Self] {
        &self.subreports
    }

    /// Mutable sub-reports.
    pub fn subreports_mut(&mut self) -> &mut [Self] {
        &mut self.subreports
    }

    /// Sub-report reached by a dotted chain of names.
    pub fn subreport(&self, path: &str) -> Option<&Self> {
        path.split('.')
            .try_fold(self, |report, name| report.subreports.iter().find(|r| r.name == name))
    }

    // ---------------------------------------------------------------------
    // Styles and header
    // ---------------------------------------------------------------------

    /// Sets a style entry.
    pub fn set_style(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.styles.insert(key.into(), value.into());
    }

    /// Style entry.
    pub fn style(&self, key: &str) -> Option<&str> {
        self.styles.get(key).map(String::as_str)
    }

    /// Every style entry in insertion order.
    pub const fn styles(&self) -> &IndexMap<String, String> {
        &self.styles
    }

    /// Sets a header entry.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.header.insert(key.into(), value.into());
    }

    /// Header entries in insertion order.
    pub const fn header(&self) -> &IndexMap<String, String> {
        &self.header
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Gates the report on `trigger`; it stays inactive until the trigger fires.
    pub fn set_start_trigger(&mut self, trigger: Trigger) {
        self.start_trigger = Some(trigger);
        self.started = false;
        self.active = false;
    }

    /// Stops the report when `trigger` fires.
    pub fn set_stop_trigger(&mut self, trigger: Trigger) {
        self.stop_trigger = Some(trigger);
    }

    /// Start trigger, if any.
    pub const fn start_trigger(&self) -> Option<&Trigger> {
        self.start_trigger.as_ref()
    }

    /// Stop trigger, if any.
    pub const fn stop_trigger(&self) -> Option<&Trigger> {
        self.stop_trigger.as_ref()
    }

    /// Restarts every statistic from the current state, recursively through
    /// sub-reports that have no start trigger of their own.
    pub fn start(&mut self, tree: &SimTree) {
        self.start_at(tree, None);
    }

    fn start_at(&mut self, tree: &SimTree, sample: Option<&Baseline>) {
        for stat in &mut self.stats {
            for instance in stat.instances_mut() {
                instance.start_at(tree, sample);
            }
        }
        self.started = true;
        self.ended = false;
        info!(report = %self.name, tick = tree.now(), sampled = sample.is_some(), "report started");
        for sub in &mut self.subreports {
            if sub.start_trigger.is_none() {
                sub.start_at(tree, sample);
            }
        }
    }

    /// Freezes every statistic at its current delta, recursively.
    pub fn end(&mut self, tree: &SimTree) {
        self.end_at(tree, None);
    }

    fn end_at(&mut self, tree: &SimTree, sample: Option<&Baseline>) {
        self.accumulate_at(tree, sample);
        self.ended = true;
        self.active = false;
        info!(report = %self.name, tick = tree.now(), sampled = sample.is_some(), "report ended");
        for sub in &mut self.subreports {
            if !sub.ended {
                sub.end_at(tree, sample);
            }
        }
    }

    /// Folds every statistic's delta into its accumulator and detaches it from its
    /// target. Call before the reported nodes are torn down.
    pub fn accumulate(&mut self, tree: &SimTree) {
        self.accumulate_at(tree, None);
    }

    fn accumulate_at(&mut self, tree: &SimTree, sample: Option<&Baseline>) {
        for stat in &mut self.stats {
            for instance in stat.instances_mut() {
                if !instance.is_detached() {
                    instance.accumulate_at(tree, sample);
                }
            }
        }
        for sub in &mut self.subreports {
            sub.accumulate_at(tree, sample);
        }
    }

    /// True when every enclosing start trigger has fired and no stop trigger has.
    ///
    /// Refreshed by [`update`](Self::update).
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// True once ended by a stop trigger or [`end`](Self::end).
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Evaluates triggers through the whole tree and refreshes activity.
    ///
    /// A report whose start trigger fired on a counter write starts from the tree as
    /// it was right after that write, and one whose stop trigger fired that way keeps
    /// the values of that moment, however late the update comes.
    pub fn update(&mut self, tree: &SimTree) {
        self.update_with(tree, true, None);
    }

    /// `parent_started` is set when the parent started during this same update, and
    /// holds the sample it started from.
    fn update_with(
        &mut self,
        tree: &SimTree,
        parent_active: bool,
        parent_started: Option<Option<&Baseline>>,
    ) {
        let container = Rc::clone(&self.container);
        let (start_ok, own_sample, own_tick) = match &mut self.start_trigger {
            Some(trigger) => {
                let fired = trigger.check(tree, &mut container.borrow_mut());
                (fired, trigger.sample(), trigger.fired_at())
            }
            None => (true, None, None),
        };
        let mut started_now = None;
        if parent_active && start_ok && !self.started && !self.ended {
            let sample = match parent_started {
                Some(parent) => {
                    let parent_tick = parent.and_then(Baseline::tick).unwrap_or_else(|| tree.now());
                    if own_tick.is_some_and(|t| t >= parent_tick) {
                        own_sample.as_deref()
                    } else {
                        parent
                    }
                }
                None => own_sample.as_deref(),
            };
            self.start_at(tree, sample);
            started_now = Some(sample);
        }
        let stop_sample = match &mut self.stop_trigger {
            Some(trigger) => trigger
                .check(tree, &mut container.borrow_mut())
                .then(|| trigger.sample()),
            None => None,
        };
        if let Some(sample) = &stop_sample {
            if !self.ended {
                self.end_at(tree, sample.as_deref());
            }
        }
        let active = parent_active && start_ok && !self.ended;
        self.active = active;
        for sub in &mut self.subreports {
            sub.update_with(tree, active, started_now);
        }
    }

    // ---------------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------------

    /// Runs context-counter aggregations, then evaluates this report and every active
    /// or ended sub-report.
    pub fn snapshot(&self, tree: &SimTree) -> ReportSnapshot {
        tree.run_aggregations();
        self.snapshot_inner(tree)
    }

    fn snapshot_inner(&self, tree: &SimTree) -> ReportSnapshot {
        let stats = self.stats.iter().map(|s| stat_snapshot(tree, s)).collect();
        let subreports = self
            .subreports
            .iter()
            .filter(|r| r.active || r.ended)
            .map(|r| r.snapshot_inner(tree))
            .collect();
        ReportSnapshot {
            name: self.name.clone(),
            author: self.author.clone(),
            tick: tree.now(),
            header: self.header.clone(),
            styles: self.styles.clone(),
            stats,
            subreports,
        }
    }

    /// Updates triggers and, if the report is active or has ended, writes a snapshot.
    ///
    /// Returns whether anything was written.
    pub fn emit(&mut self, tree: &SimTree, formatter: &mut dyn ReportFormatter) -> Result<bool> {
        self.update(tree);
        if !self.active && !self.ended {
            debug!(report = %self.name, tick = tree.now(), "inactive report not emitted");
            return Ok(false);
        }
        formatter.write_snapshot(&self.snapshot(tree))?;
        Ok(true)
    }

    pub(super) fn prune_generated(&mut self) {
        for sub in &mut self.subreports {
            sub.prune_generated();
        }
        self.subreports
            .retain(|r| !r.generated || r.total_stats() > 0);
    }
}

fn display_name(instance: &StatisticInstance) -> &str {
    if instance.name().is_empty() {
        instance.location()
    } else {
        instance.name()
    }
}

fn stat_snapshot(tree: &SimTree, stat: &ReportStat) -> StatSnapshot {
    let instance = &stat.instance;
    let name = display_name(instance).to_string();
    let value = instance.value(tree);
    let contexts: Vec<(String, f64)> = stat
        .subs
        .iter()
        .map(|s| (s.name().to_string(), s.value(tree)))
        .collect();
    let grouped = instance
        .node()
        .and_then(|id| tree.context_counter(id).ok())
        .map(|cc| {
            let mut values = Vec::with_capacity(contexts.len() + 1);
            values.push((name.clone(), value));
            values.extend(contexts.iter().cloned());
            let mut hidden = HashSet::new();
            let mut out = Map::new();
            cc.write_grouped(&name, &values, &mut hidden, &mut out);
            out.remove(&name).unwrap_or_default()
        });
    StatSnapshot {
        name,
        location: instance.location().to_string(),
        description: instance.description().to_string(),
        value,
        semantic: instance.semantic(),
        visibility: instance.visibility(),
        contexts,
        grouped,
    }
}
