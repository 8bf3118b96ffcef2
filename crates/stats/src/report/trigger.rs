//! Report triggers.
//!
//! A trigger gates a report on a condition over counters. Conditions of the form
//! `counter OP constant` on a plain counter are lowered to a [`CounterWatch`] checked
//! on every write to the counter; anything else is evaluated on the report's clock at
//! most once per polling period. A trigger that carries a tag records
//! `<tag>.start`/`<tag>.stop` in the shared [`ReportContainer`] when it fires, and a
//! condition consisting of exactly `<tag>.start` or `<tag>.stop` waits for that event.
//!
//! A watch fires in the middle of the simulation, possibly long before the report is
//! next updated. The sample the watch took at that write travels with the trigger and
//! with its tag event, so the report starts or freezes at the firing write rather than
//! at the update that notices it.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};

use crate::common::{Result, StatsError};
use crate::config::TriggerConfig;
use crate::counter::CounterNode;
use crate::expr::ast::{BinaryOp, Comparison, Expression};
use crate::expr::eval::{Baseline, Evaluator};
use crate::sim::clock::ClockId;
use crate::sim::node::{NodeId, NodeKind};
use crate::sim::scheduler::Tick;
use crate::sim::tree::SimTree;
use crate::sim::watch::CounterWatch;

/// Whether a trigger starts or stops its report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerRole {
    /// Report becomes active when the trigger fires.
    Start,
    /// Report stops when the trigger fires.
    Stop,
}

impl TriggerRole {
    /// `start` or `stop`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Scratch shared by every report of one report tree.
#[derive(Debug, Default)]
pub struct ReportContainer {
    events: HashMap<String, (Tick, Option<Rc<Baseline>>)>,
}

impl ReportContainer {
    /// Records `key` at `tick`; the first recording wins.
    pub fn record(&mut self, key: impl Into<String>, tick: Tick) {
        self.record_sampled(key, tick, None);
    }

    pub(crate) fn record_sampled(
        &mut self,
        key: impl Into<String>,
        tick: Tick,
        sample: Option<Rc<Baseline>>,
    ) {
        let _ = self.events.entry(key.into()).or_insert((tick, sample));
    }

    /// Tick at which `key` was recorded.
    pub fn event(&self, key: &str) -> Option<Tick> {
        self.events.get(key).map(|(tick, _)| *tick)
    }

    fn sampled_event(&self, key: &str) -> Option<(Tick, Option<Rc<Baseline>>)> {
        self.events.get(key).cloned()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug)]
enum Condition {
    Watch(Rc<CounterWatch>),
    Polled {
        expression: Expression,
        clock: ClockId,
        period: u64,
        next_poll: u64,
    },
    Tag(String),
}

/// A start or stop condition on a report.
pub struct Trigger {
    source: String,
    role: TriggerRole,
    tag: Option<String>,
    condition: Condition,
    fired_at: Option<Tick>,
    sample: Option<Rc<Baseline>>,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("source", &self.source)
            .field("role", &self.role)
            .field("tag", &self.tag)
            .field("lowered", &self.is_lowered())
            .field("fired_at", &self.fired_at)
            .finish()
    }
}

const fn flipped(c: Comparison) -> Comparison {
    match c {
        Comparison::Lt => Comparison::Gt,
        Comparison::Le => Comparison::Ge,
        Comparison::Gt => Comparison::Lt,
        Comparison::Ge => Comparison::Le,
        other => other,
    }
}

fn tag_reference(source: &str) -> Option<&str> {
    let (tag, event) = source.rsplit_once('.')?;
    let valid_tag = !tag.is_empty()
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !tag.starts_with(|c: char| c.is_ascii_digit());
    (valid_tag && matches!(event, "start" | "stop")).then_some(source)
}

fn plain_counter(tree: &SimTree, id: NodeId) -> bool {
    matches!(
        tree.node(id).map(|n| n.kind()),
        Ok(NodeKind::Counter(CounterNode::Plain(_)))
    )
}

impl Trigger {
    /// Builds a trigger from `source`, resolving paths relative to `context`.
    pub fn new(
        tree: &SimTree,
        context: NodeId,
        source: &str,
        role: TriggerRole,
        config: &TriggerConfig,
    ) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(StatsError::Trigger(format!("empty {} condition", role.as_str())));
        }
        if let Some(key) = tag_reference(source) {
            if tree.try_find(context, source).is_none() {
                debug!(trigger = source, "trigger waits on tag event");
                return Ok(Self::with_condition(source, role, Condition::Tag(key.to_string())));
            }
        }
        let parsed = Expression::parse(source)?.resolve(tree, context)?;
        let condition = match &parsed {
            Expression::Binary(BinaryOp::Compare(c), lhs, rhs) => {
                match (lhs.as_ref(), rhs.as_ref()) {
                    (Expression::Node(n), Expression::Constant(k)) if plain_counter(tree, n.id) => {
                        Some(CounterWatch::new(n.id, *c, *k))
                    }
                    (Expression::Constant(k), Expression::Node(n)) if plain_counter(tree, n.id) => {
                        Some(CounterWatch::new(n.id, flipped(*c), *k))
                    }
                    _ => None,
                }
            }
            Expression::Binary(BinaryOp::And | BinaryOp::Or, _, _) => None,
            _ => {
                return Err(StatsError::Trigger(format!(
                    "`{source}` is not a comparison or logical combination"
                )));
            }
        };
        let condition = match condition {
            Some(watch) => {
                let watch = Rc::new(watch);
                tree.watch_counter(Rc::clone(&watch))?;
                debug!(
                    trigger = source,
                    counter = %tree.location(watch.counter()),
                    "lowered trigger to counter watch"
                );
                Condition::Watch(watch)
            }
            None => {
                let clock = tree.clock_of(context)?;
                debug!(trigger = source, period = config.poll_cycles, "trigger is polled");
                Condition::Polled {
                    expression: parsed,
                    clock,
                    period: config.poll_cycles.max(1),
                    next_poll: 0,
                }
            }
        };
        Ok(Self::with_condition(source, role, condition))
    }

    fn with_condition(source: &str, role: TriggerRole, condition: Condition) -> Self {
        Self {
            source: source.to_string(),
            role,
            tag: None,
            condition,
            fired_at: None,
            sample: None,
        }
    }

    /// Attaches a tag recorded in the report container when this trigger fires.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Condition text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Start or stop.
    pub const fn role(&self) -> TriggerRole {
        self.role
    }

    /// Tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// True when the condition was lowered to a counter watch.
    pub const fn is_lowered(&self) -> bool {
        matches!(self.condition, Condition::Watch(_))
    }

    /// Tick at which the trigger fired.
    pub const fn fired_at(&self) -> Option<Tick> {
        self.fired_at
    }

    /// Tree sample taken by the write that fired a lowered trigger, or carried by the
    /// tag event a tag condition waited on. Polled triggers have none.
    pub fn sample(&self) -> Option<Rc<Baseline>> {
        self.sample.clone()
    }

    /// True once fired.
    pub const fn is_fired(&self) -> bool {
        self.fired_at.is_some()
    }

    /// Re-arms the trigger.
    pub fn reset(&mut self) {
        self.fired_at = None;
        self.sample = None;
        match &mut self.condition {
            Condition::Watch(watch) => watch.reset(),
            Condition::Polled { next_poll, .. } => *next_poll = 0,
            Condition::Tag(_) => {}
        }
    }

    /// Checks the condition, latching and recording the tag event when it fires.
    pub(crate) fn check(&mut self, tree: &SimTree, container: &mut ReportContainer) -> bool {
        if self.fired_at.is_some() {
            return true;
        }
        let fired = match &mut self.condition {
            Condition::Watch(watch) => watch.fired_at().map(|tick| (tick, watch.sample())),
            Condition::Polled {
                expression,
                clock,
                period,
                next_poll,
            } => {
                let cycle = tree.current_cycle(*clock);
                if cycle < *next_poll {
                    None
                } else {
                    *next_poll = cycle + *period;
                    (Evaluator::new(tree).eval(expression) > 0.5).then(|| (tree.now(), None))
                }
            }
            Condition::Tag(key) => container.sampled_event(key),
        };
        if let Some((tick, sample)) = fired {
            self.fired_at = Some(tick);
            self.sample = sample;
            if let Some(tag) = &self.tag {
                container.record_sampled(
                    format!("{tag}.{}", self.role.as_str()),
                    tick,
                    self.sample.clone(),
                );
            }
            info!(trigger = %self.source, role = self.role.as_str(), tick, "trigger fired");
        }
        self.fired_at.is_some()
    }
}
