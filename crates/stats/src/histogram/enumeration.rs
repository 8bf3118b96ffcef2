//! Enumerated value types.
//!
//! An enumerated histogram has one bin per variant, named after the variant. The
//! [`state_enum!`](crate::state_enum) macro declares an enum together with its
//! [`StateEnum`] implementation.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use super::{BinLayout, HistogramKind, HistogramNodes, HistogramSpec};
use crate::common::{Result, StatsError, ValueSemantic, Visibility};
use crate::counter::{CounterBehavior, CounterSource};
use crate::expr::ast::Expression;
use crate::sim::node::NodeId;
use crate::sim::tree::SimTree;
use crate::statistic::SnapshotMode;

/// A fieldless enum usable as histogram value space or timer state set.
pub trait StateEnum: Copy + 'static {
    /// Number of variants.
    const COUNT: usize;

    /// Zero-based variant index.
    fn index(self) -> usize;

    /// Variant names in index order.
    fn names() -> &'static [&'static str];

    /// Variant name.
    fn name(self) -> &'static str {
        Self::names().get(self.index()).copied().unwrap_or("?")
    }
}

/// Declares a fieldless enum implementing [`StateEnum`].
///
/// # Examples
///
/// ```
/// use perfstat_core::histogram::StateEnum;
///
/// perfstat_core::state_enum! {
///     pub enum Stage { Fetch, Decode, Execute }
/// }
///
/// assert_eq!(Stage::COUNT, 3);
/// assert_eq!(Stage::Decode.index(), 1);
/// assert_eq!(Stage::Execute.name(), "Execute");
/// ```
#[macro_export]
macro_rules! state_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::histogram::StateEnum for $name {
            const COUNT: usize = [$(stringify!($variant)),+].len();

            fn index(self) -> usize {
                self as usize
            }

            fn names() -> &'static [&'static str] {
                &[$(stringify!($variant)),+]
            }
        }
    };
}

fn names_of<E: StateEnum>() -> Vec<String> {
    E::names().iter().map(|s| (*s).to_string()).collect()
}

impl SimTree {
    /// Adds a value or cycle histogram with one bin per variant of `E`.
    ///
    /// Values are variant indices. A cycle histogram idles in the first variant.
    pub fn add_enum_histogram<E: StateEnum>(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        kind: HistogramKind,
        visibility: Option<Visibility>,
    ) -> Result<NodeId> {
        let layout = BinLayout::named(name, names_of::<E>())?;
        let spec = HistogramSpec::new(0, layout.upper(), 1).with_visibilities(visibility, visibility);
        match kind {
            HistogramKind::Value => self.build_value_histogram(parent, name, description, layout, &spec),
            HistogramKind::Cycle => self.build_cycle_histogram(parent, name, description, layout, &spec),
            HistogramKind::State => Err(StatsError::InvalidHistogram {
                name: name.to_string(),
                reason: "state histograms are created by a state-timer unit".to_string(),
            }),
        }
    }

    /// Records variant `value` in an enumerated value histogram, or pulses it in an
    /// enumerated cycle histogram.
    pub fn histogram_add_state<E: StateEnum>(&mut self, id: NodeId, value: E) -> Result<()> {
        self.histogram_add_value(id, value.index() as u64)
    }

    /// Moves an enumerated cycle histogram to `value`.
    pub fn histogram_set_state<E: StateEnum>(&mut self, id: NodeId, value: E) -> Result<()> {
        self.histogram_set_value(id, value.index() as u64)
    }

    /// Adds a state histogram whose bins read externally owned cells.
    ///
    /// Children, in order: one read-only counter per state, `total`, and a
    /// `_probability` statistic per state.
    pub(crate) fn add_state_histogram(
        &mut self,
        parent: NodeId,
        name: &str,
        description: &str,
        names: Vec<String>,
        cells: &[Rc<Cell<u64>>],
        visibility: Visibility,
    ) -> Result<NodeId> {
        let layout = BinLayout::named(name, names)?;
        let (id, stats) = self.begin_histogram(parent, name, description, visibility)?;
        let n = layout.num_bins();
        let mut bins = Vec::with_capacity(n);
        let mut terms = Vec::with_capacity(n);
        for (i, cell) in cells.iter().enumerate().take(n) {
            let bin_name = layout.bin_name(i);
            let bin = self.add_read_only_counter(
                stats,
                &bin_name,
                &format!("Cycles in state {bin_name}"),
                CounterSource::Shared(Rc::clone(cell)),
                CounterBehavior::Normal,
            )?;
            self.set_visibility(bin, visibility)?;
            terms.push(Expression::node(bin, bin_name));
            bins.push(bin);
        }
        let total = self.add_derived(
            stats,
            "total",
            "Total cycles across states",
            Expression::sum(terms),
            ValueSemantic::Absolute,
            SnapshotMode::Difference,
            visibility,
        )?;
        let weighted: Vec<(NodeId, Visibility)> = bins.iter().map(|b| (*b, visibility)).collect();
        let derived = self.add_probabilities(stats, total, &weighted)?;
        let nodes = HistogramNodes {
            stats,
            underflow: None,
            bins,
            overflow: None,
            total,
            sum: None,
            max_value: None,
            derived,
        };
        self.finish_histogram(id, HistogramKind::State, layout, nodes, 0, 0)?;
        debug!(histogram = %self.location(id), states = n, "added state histogram");
        Ok(id)
    }
}
