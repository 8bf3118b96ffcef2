//! Arena-backed simulation tree.
//!
//! The tree owns every node, the clocks, the lifecycle phase, and the scheduler. It
//! provides:
//! 1. **Construction:** Structural nodes, statistic sets, counters, statistic
//!    definitions, and parameters, each checked against its parent's kind and the phase.
//! 2. **Lookup:** Relative dotted paths, wildcard matches with captures, and locations.
//! 3. **Counters:** Increments, assignments, and cycle-counter start/stop, optionally
//!    deferred by a number of cycles.
//! 4. **Lifecycle:** `finalize` resolves every statistic expression and linearizes
//!    their dependency graph once; `remove_subtree` frees nodes during teardown.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, info};

use crate::common::constants::{ROOT_NAME, STATISTIC_SET_NAME};
use crate::common::{InstrumentAttrs, InstrumentType, Result, StatsError, Visibility};
use crate::counter::{
    Counter, CounterBehavior, CounterNode, CounterSource, CycleCounter, IllegalUpdate,
    ReadOnlyCounter,
};
use crate::expr::ast::Expression;
use crate::expr::eval::Baseline;
use crate::sim::clock::{Clock, ClockId};
use crate::sim::node::{Group, Node, NodeId, NodeKind, Parameter};
use crate::sim::path::{PathStep, natural_cmp, parse_path};
use crate::sim::phase::Phase;
use crate::sim::scheduler::{DeferredOp, Scheduler, SimTime, Tick};
use crate::sim::watch::CounterWatch;
use crate::statistic::{ExpressionSource, StatisticDef};

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A node matched by a wildcard path, with one capture per wildcard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMatch {
    /// Matched node.
    pub node: NodeId,
    /// Wildcard captures in path order.
    pub captures: Vec<String>,
}

/// The simulation tree.
#[derive(Debug)]
pub struct SimTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    clocks: Vec<Clock>,
    phase: Phase,
    scheduler: Scheduler,
    watches: RefCell<HashMap<NodeId, Vec<Rc<CounterWatch>>>>,
    statistic_order: Vec<NodeId>,
}

impl Default for SimTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTree {
    /// Creates a tree holding only the root `top`, clocked at one tick per cycle.
    pub fn new() -> Self {
        let mut root_node = Node::new(ROOT_NAME.to_string(), None, NodeKind::Root);
        root_node.clock = Some(ClockId(0));
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            clocks: vec![Clock::new("root_clk", 1, 1000.0)],
            phase: Phase::Building,
            scheduler: Scheduler::default(),
            watches: RefCell::new(HashMap::new()),
            statistic_order: Vec::new(),
        }
    }

    /// Root node.
    #[inline]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Current lifecycle phase.
    #[inline]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current scheduler tick.
    #[inline]
    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    /// Cloneable handle on the current tick.
    pub fn time(&self) -> SimTime {
        self.scheduler.time()
    }

    /// Scheduler state.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Mutable scheduler state.
    pub const fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    // ---------------------------------------------------------------------
    // Clocks
    // ---------------------------------------------------------------------

    /// Registers a clock.
    pub fn add_clock(&mut self, clock: Clock) -> ClockId {
        self.clocks.push(clock);
        ClockId(self.clocks.len() - 1)
    }

    /// Clock by handle. Handles are only issued by [`add_clock`](Self::add_clock), so
    /// an unknown handle falls back to the root clock.
    pub fn clock(&self, id: ClockId) -> &Clock {
        self.clocks.get(id.0).unwrap_or(&self.clocks[0])
    }

    /// Assigns `clock` to `node` and, implicitly, to descendants without their own.
    pub fn set_clock(&mut self, node: NodeId, clock: ClockId) -> Result<()> {
        self.require_construction("set_clock")?;
        self.node_mut(node)?.clock = Some(clock);
        Ok(())
    }

    /// Clock governing `node`: its own, or the nearest ancestor's.
    pub fn clock_of(&self, node: NodeId) -> Result<ClockId> {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let n = self.node(id)?;
            if let Some(clock) = n.clock {
                return Ok(clock);
            }
            cursor = n.parent;
        }
        Ok(ClockId(0))
    }

    /// Every registered clock.
    pub(crate) fn clock_ids(&self) -> impl Iterator<Item = ClockId> {
        (0..self.clocks.len()).map(ClockId)
    }

    /// Current cycle of `clock`.
    pub fn current_cycle(&self, clock: ClockId) -> u64 {
        self.clock(clock).cycle_at(self.now())
    }

    // ---------------------------------------------------------------------
    // Node access
    // ---------------------------------------------------------------------

    /// Node by handle.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(StatsError::StaleNode {
                index: id.index,
                generation: id.generation,
            })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(StatsError::StaleNode {
                index: id.index,
                generation: id.generation,
            })
    }

    /// True if `id` names a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Mutable attributes of an instrumented node.
    pub fn attrs_mut(&mut self, id: NodeId) -> Result<&mut InstrumentAttrs> {
        let location = self.location(id);
        self.node_mut(id)?
            .attrs
            .as_mut()
            .ok_or(StatsError::WrongNodeKind {
                location,
                expected: "instrumented node",
            })
    }

    /// Sets the visibility of an instrumented node.
    pub fn set_visibility(&mut self, id: NodeId, visibility: Visibility) -> Result<()> {
        self.attrs_mut(id)?.visibility = visibility;
        Ok(())
    }

    /// Dotted location from the root, e.g. `top.core0.stats.retired`.
    pub fn location(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.node(current) {
                Ok(node) => {
                    parts.push(node.name.as_str());
                    cursor = node.parent;
                }
                Err(_) => return format!("<stale {id}>"),
            }
        }
        parts.reverse();
        parts.join(".")
    }

    /// Named child of `parent`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent).ok().and_then(|p| {
            p.children
                .iter()
                .copied()
                .find(|c| self.node(*c).is_ok_and(|n| n.name == name))
        })
    }

    /// `id` and every descendant, pre-order, children in insertion order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Ok(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Every live counter, in arena order.
    pub(crate) fn counter_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let node = slot.node.as_ref()?;
            matches!(node.kind, NodeKind::Counter(_)).then(|| NodeId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    /// Number of ancestors between `id` and the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.node(id).ok().and_then(Node::parent);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.node(parent).ok().and_then(Node::parent);
        }
        depth
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    fn require_construction(&self, operation: &str) -> Result<()> {
        if self.phase.allows_construction() {
            Ok(())
        } else {
            Err(StatsError::Phase {
                operation: operation.to_string(),
                phase: self.phase,
            })
        }
    }

    pub(crate) fn insert(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
        attrs: Option<InstrumentAttrs>,
    ) -> Result<NodeId> {
        self.require_construction(&format!("add `{name}`"))?;
        if name.is_empty() || name.contains('.') {
            return Err(StatsError::parse(
                name,
                0,
                "node names must be non-empty and must not contain `.`",
            ));
        }
        let _ = self.node(parent)?;
        if self.child(parent, name).is_some() {
            return Err(StatsError::DuplicateNodeName {
                parent: self.location(parent),
                name: name.to_string(),
            });
        }

        let mut node = Node::new(name.to_string(), Some(parent), kind);
        node.attrs = attrs;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    StatsError::illegal(self.location(parent), "node arena is full")
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Adds a structural node.
    pub fn add_generic(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Generic, None)
    }

    /// Adds a modeled unit (resource).
    pub fn add_resource(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        self.insert(parent, name, NodeKind::Resource, None)
    }

    /// Places `node` in a named group at `index` (e.g. `core`, 3).
    pub fn set_group(&mut self, node: NodeId, group: &str, index: u32) -> Result<()> {
        self.node_mut(node)?.group = Some(Group {
            name: group.to_string(),
            index,
        });
        Ok(())
    }

    /// Statistic set `stats` under `unit`, created on first use.
    pub fn statistic_set(&mut self, unit: NodeId) -> Result<NodeId> {
        if let Some(existing) = self.child(unit, STATISTIC_SET_NAME) {
            if matches!(self.node(existing)?.kind, NodeKind::StatisticSet) {
                return Ok(existing);
            }
            return Err(StatsError::WrongNodeKind {
                location: self.location(existing),
                expected: "statistic set",
            });
        }
        let kind = &self.node(unit)?.kind;
        if kind.is_valued() || matches!(kind, NodeKind::Parameter(_) | NodeKind::StatisticSet) {
            return Err(StatsError::BadParent {
                name: STATISTIC_SET_NAME.to_string(),
                reason: format!("a {} cannot host a statistic set", kind.label()),
            });
        }
        self.insert(unit, STATISTIC_SET_NAME, NodeKind::StatisticSet, None)
    }

    /// Adds a parameter with a printable value.
    pub fn add_parameter(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        value: impl Into<String>,
    ) -> Result<NodeId> {
        let attrs = InstrumentAttrs::new(InstrumentType::Parameter, description);
        self.insert(
            parent,
            name,
            NodeKind::Parameter(Parameter {
                value: value.into(),
            }),
            Some(attrs),
        )
    }

    fn check_counter_parent(&self, parent: NodeId, name: &str) -> Result<()> {
        match self.node(parent)?.kind {
            NodeKind::StatisticSet | NodeKind::ContextCounter(_) => Ok(()),
            ref other => Err(StatsError::BadParent {
                name: name.to_string(),
                reason: format!(
                    "counters must live in a statistic set or context counter, not a {}",
                    other.label()
                ),
            }),
        }
    }

    pub(crate) fn insert_counter(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        counter: CounterNode,
    ) -> Result<NodeId> {
        self.check_counter_parent(parent, name)?;
        let attrs = InstrumentAttrs::new(InstrumentType::Counter, description);
        self.insert(parent, name, NodeKind::Counter(counter), Some(attrs))
    }

    /// Adds a plain counter.
    pub fn add_counter(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        behavior: CounterBehavior,
    ) -> Result<NodeId> {
        self.insert_counter(
            parent,
            name,
            description,
            CounterNode::Plain(Counter::new(behavior)),
        )
    }

    /// Adds an idle cycle counter on the parent's clock.
    pub fn add_cycle_counter(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        behavior: CounterBehavior,
    ) -> Result<NodeId> {
        let clock = self.clock_of(parent)?;
        let counter = CycleCounter::new(behavior, clock)
            .map_err(|e| StatsError::illegal(format!("{}.{name}", self.location(parent)), e.to_string()))?;
        self.insert_counter(parent, name, description, CounterNode::Cycle(counter))
    }

    /// Adds a read-only counter over external state.
    pub fn add_read_only_counter(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        source: impl Into<CounterSource>,
        behavior: CounterBehavior,
    ) -> Result<NodeId> {
        self.insert_counter(
            parent,
            name,
            description,
            CounterNode::ReadOnly(ReadOnlyCounter::new(source, behavior)),
        )
    }

    /// Adds a statistic definition to a statistic set.
    pub fn add_statistic_def(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        def: StatisticDef,
    ) -> Result<NodeId> {
        if !matches!(self.node(parent)?.kind, NodeKind::StatisticSet) {
            return Err(StatsError::BadParent {
                name: name.to_string(),
                reason: format!(
                    "statistic definitions must live in a statistic set, not a {}",
                    self.node(parent)?.kind.label()
                ),
            });
        }
        let attrs = InstrumentAttrs::new(InstrumentType::StatisticDef, description)
            .with_visibility(def.visibility());
        self.insert(parent, name, NodeKind::StatisticDef(def), Some(attrs))
    }

    // ---------------------------------------------------------------------
    // Counter updates
    // ---------------------------------------------------------------------

    fn counter_mut(&mut self, id: NodeId) -> Result<&mut CounterNode> {
        let location = self.location(id);
        match &mut self.node_mut(id)?.kind {
            NodeKind::Counter(c) => Ok(c),
            _ => Err(StatsError::WrongNodeKind {
                location,
                expected: "counter",
            }),
        }
    }

    fn illegal(&self, id: NodeId, e: IllegalUpdate) -> StatsError {
        StatsError::illegal(self.location(id), e.to_string())
    }

    /// Adds `k` to a `Normal` or `Integral` plain counter.
    pub fn increment(&mut self, id: NodeId, k: u64) -> Result<u64> {
        let result = match self.counter_mut(id)? {
            CounterNode::Plain(c) => c.increment(k),
            CounterNode::Cycle(_) => Err(IllegalUpdate::IncrementCycle),
            CounterNode::ReadOnly(_) => Err(IllegalUpdate::ReadOnly),
        };
        let value = result.map_err(|e| self.illegal(id, e))?;
        self.notify_watches(id, value);
        Ok(value)
    }

    /// Assigns `v` to a `Latest` plain counter.
    pub fn set(&mut self, id: NodeId, v: u64) -> Result<u64> {
        let result = match self.counter_mut(id)? {
            CounterNode::Plain(c) => c.set(v),
            CounterNode::Cycle(c) => Err(IllegalUpdate::AssignAddOnly(c.behavior())),
            CounterNode::ReadOnly(_) => Err(IllegalUpdate::ReadOnly),
        };
        let value = result.map_err(|e| self.illegal(id, e))?;
        self.notify_watches(id, value);
        Ok(value)
    }

    fn cycle_counter_mut(&mut self, id: NodeId) -> Result<&mut CycleCounter> {
        let location = self.location(id);
        match self.counter_mut(id)? {
            CounterNode::Cycle(c) => Ok(c),
            _ => Err(StatsError::WrongNodeKind {
                location,
                expected: "cycle counter",
            }),
        }
    }

    fn due_after(&self, clock: ClockId, delay: u64) -> Tick {
        let clk = self.clock(clock);
        clk.tick_of(clk.cycle_at(self.now()).saturating_add(delay))
    }

    /// Starts a cycle counter now, or `delay` cycles from now.
    pub fn start_counting(&mut self, id: NodeId, delay: u64) -> Result<()> {
        let location = self.location(id);
        let counter = self.cycle_counter_mut(id)?;
        counter
            .request_start()
            .map_err(|e| StatsError::illegal(location, e.to_string()))?;
        let clock = counter.clock();
        if delay == 0 {
            let cycle = self.current_cycle(clock);
            self.cycle_counter_mut(id)?.begin(cycle);
        } else {
            let due = self.due_after(clock, delay);
            self.scheduler.defer(due, DeferredOp::StartCounting(id));
        }
        Ok(())
    }

    /// Stops a cycle counter now, or `delay` cycles from now.
    pub fn stop_counting(&mut self, id: NodeId, delay: u64) -> Result<()> {
        let location = self.location(id);
        let counter = self.cycle_counter_mut(id)?;
        counter
            .request_stop()
            .map_err(|e| StatsError::illegal(location, e.to_string()))?;
        let clock = counter.clock();
        if delay == 0 {
            let cycle = self.current_cycle(clock);
            self.cycle_counter_mut(id)?.end(cycle);
        } else {
            let due = self.due_after(clock, delay);
            self.scheduler.defer(due, DeferredOp::StopCounting(id));
        }
        Ok(())
    }

    /// Replaces the counting multiplier, preserving the accumulated value.
    pub fn update_counting_multiplier(&mut self, id: NodeId, multiplier: u64) -> Result<()> {
        let clock = self.cycle_counter_mut(id)?.clock();
        let cycle = self.current_cycle(clock);
        self.cycle_counter_mut(id)?.rebase(cycle, multiplier);
        Ok(())
    }

    /// Current integer value of a counter.
    pub fn counter_value(&self, id: NodeId) -> Result<u64> {
        match &self.node(id)?.kind {
            NodeKind::Counter(CounterNode::Cycle(c)) => Ok(c.value_at(self.current_cycle(c.clock()))),
            NodeKind::Counter(c) => Ok(c.value(0)),
            _ => Err(StatsError::WrongNodeKind {
                location: self.location(id),
                expected: "counter",
            }),
        }
    }

    /// Absolute value of any valued node.
    pub fn value(&self, id: NodeId) -> Result<f64> {
        let node = self.node(id)?;
        if !node.kind.is_valued() {
            return Err(StatsError::WrongNodeKind {
                location: self.location(id),
                expected: "counter or statistic",
            });
        }
        Ok(Expression::node(id, self.location(id)).evaluate(self))
    }

    // ---------------------------------------------------------------------
    // Watches
    // ---------------------------------------------------------------------

    /// Registers a threshold watch on a plain counter and checks it immediately.
    pub fn watch_counter(&self, watch: Rc<CounterWatch>) -> Result<()> {
        let id = watch.counter();
        match &self.node(id)?.kind {
            NodeKind::Counter(CounterNode::Plain(c)) => {
                if watch.observe(c.get(), self.now()) {
                    watch.record_sample(Rc::new(Baseline::sample(self)));
                }
            }
            _ => {
                return Err(StatsError::WrongNodeKind {
                    location: self.location(id),
                    expected: "plain counter",
                });
            }
        }
        self.watches.borrow_mut().entry(id).or_default().push(watch);
        Ok(())
    }

    /// Checks the watches on `id` after a write. Watches that fire get a sample of
    /// the tree taken right after the write.
    fn notify_watches(&self, id: NodeId, value: u64) {
        let now = self.now();
        let mut sample: Option<Rc<Baseline>> = None;
        if let Some(list) = self.watches.borrow().get(&id) {
            for watch in list {
                if watch.observe(value, now) {
                    let sample = sample.get_or_insert_with(|| Rc::new(Baseline::sample(self)));
                    watch.record_sample(Rc::clone(sample));
                    debug!(counter = %self.location(id), value, now, "counter watch fired");
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Paths
    // ---------------------------------------------------------------------

    fn walk_exact(&self, context: NodeId, steps: &[PathStep]) -> Option<NodeId> {
        let mut cursor = context;
        for step in steps {
            cursor = match step {
                PathStep::Parent => self.node(cursor).ok()?.parent?,
                PathStep::Child(name) => self.child(cursor, name)?,
                PathStep::Pattern(_) => return None,
            };
        }
        Some(cursor)
    }

    /// Resolves a path without wildcards; `None` if it names nothing.
    ///
    /// The path is relative to `context`. If that fails and its first segment names
    /// the root, it is retried as an absolute path.
    pub fn try_find(&self, context: NodeId, path: &str) -> Option<NodeId> {
        let steps = parse_path(path).ok()?;
        if let Some(found) = self.walk_exact(context, &steps) {
            return Some(found);
        }
        let root_name = self.node(self.root).ok()?.name.as_str();
        match steps.first() {
            Some(PathStep::Child(first)) if first == root_name => {
                self.walk_exact(self.root, &steps[1..])
            }
            _ => None,
        }
    }

    /// Resolves a path without wildcards.
    pub fn find(&self, context: NodeId, path: &str) -> Result<NodeId> {
        self.try_find(context, path)
            .ok_or_else(|| StatsError::unresolved(path, self.location(context)))
    }

    fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        children.sort_by(|a, b| {
            let na = self.node(*a).map(|n| n.name.as_str()).unwrap_or_default();
            let nb = self.node(*b).map(|n| n.name.as_str()).unwrap_or_default();
            natural_cmp(na, nb)
        });
        children
    }

    fn expand(&self, context: NodeId, steps: &[PathStep]) -> Vec<PathMatch> {
        let mut frontier = vec![PathMatch {
            node: context,
            captures: Vec::new(),
        }];
        for step in steps {
            let mut next = Vec::new();
            for m in frontier {
                match step {
                    PathStep::Parent => {
                        if let Some(parent) = self.node(m.node).ok().and_then(Node::parent) {
                            next.push(PathMatch {
                                node: parent,
                                captures: m.captures,
                            });
                        }
                    }
                    PathStep::Child(name) => {
                        if let Some(child) = self.child(m.node, name) {
                            next.push(PathMatch {
                                node: child,
                                captures: m.captures,
                            });
                        }
                    }
                    PathStep::Pattern(pattern) => {
                        for child in self.sorted_children(m.node) {
                            let Ok(node) = self.node(child) else {
                                continue;
                            };
                            if let Some(caps) = pattern.captures(&node.name) {
                                let mut captures = m.captures.clone();
                                captures.extend(caps);
                                next.push(PathMatch {
                                    node: child,
                                    captures,
                                });
                            }
                        }
                    }
                }
            }
            frontier = next;
        }
        frontier
    }

    /// Resolves a path that may contain `*`/`?` segments.
    ///
    /// Matches are produced in natural name order at each wildcard, so the result does
    /// not depend on insertion order. Falls back to an absolute path like
    /// [`try_find`](Self::try_find).
    pub fn find_matches(&self, context: NodeId, pattern: &str) -> Result<Vec<PathMatch>> {
        let steps = parse_path(pattern)?;
        let found = self.expand(context, &steps);
        if !found.is_empty() {
            return Ok(found);
        }
        let root_name = self.node(self.root)?.name.as_str();
        match steps.first() {
            Some(PathStep::Child(first)) if first == root_name => {
                Ok(self.expand(self.root, &steps[1..]))
            }
            _ => Ok(found),
        }
    }

    // ---------------------------------------------------------------------
    // Statistic definitions
    // ---------------------------------------------------------------------

    /// Definition held by a statistic-definition or context-counter node.
    pub fn definition(&self, id: NodeId) -> Option<&StatisticDef> {
        match &self.node(id).ok()?.kind {
            NodeKind::StatisticDef(def) => Some(def),
            NodeKind::ContextCounter(cc) => Some(cc.definition()),
            _ => None,
        }
    }

    pub(crate) fn definition_mut(&mut self, id: NodeId) -> Option<&mut StatisticDef> {
        match &mut self.node_mut(id).ok()?.kind {
            NodeKind::StatisticDef(def) => Some(def),
            NodeKind::ContextCounter(cc) => Some(cc.definition_mut()),
            _ => None,
        }
    }

    /// Resolved expression of a definition, available once it has been resolved.
    pub fn resolved_expression(&self, id: NodeId) -> Option<&Expression> {
        self.definition(id).and_then(StatisticDef::resolved)
    }

    fn definition_ids(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.definition(*id).is_some())
            .collect()
    }

    fn resolve_definition(&self, id: NodeId) -> Result<Expression> {
        let def = self.definition(id).ok_or_else(|| StatsError::WrongNodeKind {
            location: self.location(id),
            expected: "statistic definition",
        })?;
        let context = match def.context() {
            Some(context) => context,
            None => self.node(id)?.parent.unwrap_or(self.root),
        };
        let expression = match def.source() {
            ExpressionSource::Text(text) => Expression::parse(text)?,
            ExpressionSource::Tree(tree) => tree.clone(),
        };
        let resolved = expression.resolve(self, context)?;
        debug!(stat = %self.location(id), expr = %resolved, "resolved statistic definition");
        Ok(resolved)
    }

    /// Resolves one definition ahead of [`finalize`](Self::finalize).
    pub fn resolve_statistic(&mut self, id: NodeId) -> Result<()> {
        let resolved = self.resolve_definition(id)?;
        if let Some(def) = self.definition_mut(id) {
            def.set_resolved(resolved);
        }
        Ok(())
    }

    /// Moves from `Building` to `Configuring`.
    pub fn enter_configuring(&mut self) -> Result<()> {
        if self.phase != Phase::Building {
            return Err(StatsError::Phase {
                operation: "enter_configuring".to_string(),
                phase: self.phase,
            });
        }
        self.phase = Phase::Configuring;
        Ok(())
    }

    /// Resolves every statistic expression, checks for dependency cycles, and freezes
    /// the structure.
    ///
    /// On failure the tree returns to `Configuring` and the first error is returned.
    pub fn finalize(&mut self) -> Result<()> {
        self.require_construction("finalize")?;
        self.phase = Phase::Finalizing;
        let ids = self.definition_ids();
        let mut resolved = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.resolve_definition(*id) {
                Ok(expr) => resolved.push((*id, expr)),
                Err(e) => {
                    self.phase = Phase::Configuring;
                    return Err(e);
                }
            }
        }

        let order = match self.linearize(&resolved) {
            Ok(order) => order,
            Err(e) => {
                self.phase = Phase::Configuring;
                return Err(e);
            }
        };
        for (id, expr) in resolved {
            if let Some(def) = self.definition_mut(id) {
                def.set_resolved(expr);
            }
        }
        self.statistic_order = order;
        self.phase = Phase::Finalized;
        info!(
            statistics = self.statistic_order.len(),
            "simulation tree finalized"
        );
        Ok(())
    }

    fn linearize(&self, resolved: &[(NodeId, Expression)]) -> Result<Vec<NodeId>> {
        let defs: HashSet<NodeId> = resolved.iter().map(|(id, _)| *id).collect();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut pending: HashMap<NodeId, usize> = HashMap::new();
        for (id, expr) in resolved {
            let deps: HashSet<NodeId> = expr
                .referenced_nodes()
                .into_iter()
                .filter(|dep| defs.contains(dep))
                .collect();
            let _ = pending.insert(*id, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(*id);
            }
        }

        let mut ready: VecDeque<NodeId> = resolved
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| pending.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(resolved.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            for dependent in dependents.get(&id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }
        if order.len() != resolved.len() {
            let stuck = resolved
                .iter()
                .map(|(id, _)| *id)
                .find(|id| pending.get(id).is_some_and(|c| *c > 0))
                .unwrap_or(self.root);
            return Err(StatsError::CyclicExpression {
                location: self.location(stuck),
            });
        }
        Ok(order)
    }

    /// Statistic definitions in dependency order, set by [`finalize`](Self::finalize).
    pub fn statistic_order(&self) -> &[NodeId] {
        &self.statistic_order
    }

    // ---------------------------------------------------------------------
    // Time
    // ---------------------------------------------------------------------

    /// Advances time by `ticks`, applying deferred operations in due order.
    pub fn advance(&mut self, ticks: Tick) {
        let target = self.now().saturating_add(ticks);
        self.advance_to(target);
    }

    /// Advances to `cycles` cycles later on `clock`.
    pub fn advance_cycles(&mut self, clock: ClockId, cycles: u64) {
        let period = self.clock(clock).period();
        self.advance(cycles.saturating_mul(period));
    }

    /// Advances to `target`; a target in the past is ignored.
    pub fn advance_to(&mut self, target: Tick) {
        if target < self.now() {
            return;
        }
        while let Some((due, op)) = self.scheduler.deferred_mut().pop_due(target) {
            self.scheduler.set_now(due.max(self.now()));
            self.apply_deferred(op);
        }
        self.scheduler.set_now(target);
    }

    fn apply_deferred(&mut self, op: DeferredOp) {
        let target = op.target();
        let result = match op {
            DeferredOp::StartCounting(id) => self.cycle_counter_mut(id).map(|c| c.clock()).and_then(
                |clock| {
                    let cycle = self.current_cycle(clock);
                    self.cycle_counter_mut(id).map(|c| c.begin(cycle))
                },
            ),
            DeferredOp::StopCounting(id) => self.cycle_counter_mut(id).map(|c| c.clock()).and_then(
                |clock| {
                    let cycle = self.current_cycle(clock);
                    self.cycle_counter_mut(id).map(|c| c.end(cycle))
                },
            ),
            DeferredOp::SetHistogramValue(id, value) => self.apply_histogram_value(id, value),
        };
        if let Err(e) = result {
            debug!(target = %target, error = %e, "dropped deferred operation");
        }
    }

    // ---------------------------------------------------------------------
    // Teardown
    // ---------------------------------------------------------------------

    /// Moves from `Finalized` to `Teardown`.
    pub fn enter_teardown(&mut self) -> Result<()> {
        if self.phase != Phase::Finalized {
            return Err(StatsError::Phase {
                operation: "enter_teardown".to_string(),
                phase: self.phase,
            });
        }
        self.phase = Phase::Teardown;
        info!("simulation tree entering teardown");
        Ok(())
    }

    /// Frees `id` and its descendants. Only permitted during `Teardown`.
    ///
    /// Handles to removed nodes become stale; statistic instances reading them must be
    /// accumulated beforehand.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<()> {
        if self.phase != Phase::Teardown {
            return Err(StatsError::Phase {
                operation: format!("remove `{}`", self.location(id)),
                phase: self.phase,
            });
        }
        if id == self.root {
            return Err(StatsError::illegal(self.location(id), "cannot remove the root"));
        }
        let parent = self.node(id)?.parent;
        let doomed = self.descendants(id);
        {
            let mut watches = self.watches.borrow_mut();
            for removed in &doomed {
                let _ = watches.remove(removed);
            }
        }
        let _ = self
            .scheduler
            .deferred_mut()
            .cancel_if(|op| doomed.contains(&op.target()));
        for removed in doomed.iter().rev() {
            let slot = &mut self.slots[removed.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(removed.index);
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        self.statistic_order.retain(|s| !doomed.contains(s));
        Ok(())
    }
}
