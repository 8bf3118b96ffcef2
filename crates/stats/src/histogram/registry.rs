//! Registry of histogram statistic functions.
//!
//! Report definitions bind `hist_def.<path>.<function>` keys to functions registered
//! here. Functions receive a [`HistogramView`] and return a double; they are
//! re-evaluated at every report read.

use indexmap::IndexMap;

use super::{HistogramFn, HistogramKind, HistogramView};
use crate::common::{Result, StatsError};

#[derive(Clone, Copy, Debug)]
struct Entry {
    kind: Option<HistogramKind>,
    function: HistogramFn,
}

/// Name-to-function table, populated before the simulation starts.
///
/// # Examples
///
/// ```
/// use perfstat_core::histogram::{HistogramFunctionRegistry, HistogramKind};
///
/// let mut registry = HistogramFunctionRegistry::with_builtins();
/// registry
///     .register("nonempty_bins", Some(HistogramKind::Value), |h| {
///         h.bins().iter().filter(|v| **v > 0.0).count() as f64
///     })
///     .unwrap();
/// assert!(registry.get("nonempty_bins").is_some());
/// assert!(registry.register("mean", None, |_| 0.0).is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct HistogramFunctionRegistry {
    entries: IndexMap<String, Entry>,
}

impl HistogramFunctionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with [`builtin_functions`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, function) in builtin_functions() {
            let _ = registry.entries.insert(
                (*name).to_string(),
                Entry {
                    kind: None,
                    function: *function,
                },
            );
        }
        registry
    }

    /// Registers `function` under `name`, optionally restricted to one kind.
    pub fn register(
        &mut self,
        name: &str,
        kind: Option<HistogramKind>,
        function: HistogramFn,
    ) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(StatsError::DuplicateRegistration(name.to_string()));
        }
        let _ = self
            .entries
            .insert(name.to_string(), Entry { kind, function });
        Ok(())
    }

    /// Function registered under `name`.
    pub fn get(&self, name: &str) -> Option<HistogramFn> {
        self.entries.get(name).map(|e| e.function)
    }

    /// Function registered under `name`, checked against the histogram kind.
    pub fn lookup(&self, name: &str, kind: HistogramKind) -> Result<HistogramFn> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| StatsError::unresolved(name, "histogram function registry"))?;
        match entry.kind {
            Some(expected) if expected != kind => Err(StatsError::InvalidHistogram {
                name: name.to_string(),
                reason: format!("function applies to {expected:?} histograms, not {kind:?}"),
            }),
            _ => Ok(entry.function),
        }
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn weighted_points(h: &HistogramView<'_>) -> Vec<(f64, f64)> {
    let layout = h.layout();
    let half = (layout.values_per_bin() as f64 - 1.0) / 2.0;
    let mut points = Vec::with_capacity(h.num_bins() + 2);
    points.push((layout.lower() as f64, h.underflow()));
    for (i, count) in h.bins().into_iter().enumerate() {
        points.push((layout.bin_start(i) as f64 + half, count));
    }
    points.push((layout.upper() as f64, h.overflow()));
    points
}

fn mean(h: &HistogramView<'_>) -> f64 {
    let points = weighted_points(h);
    let total: f64 = points.iter().map(|(_, w)| w).sum();
    points.iter().map(|(x, w)| x * w).sum::<f64>() / total
}

fn stddev(h: &HistogramView<'_>) -> f64 {
    let points = weighted_points(h);
    let total: f64 = points.iter().map(|(_, w)| w).sum();
    let mu = points.iter().map(|(x, w)| x * w).sum::<f64>() / total;
    let var = points.iter().map(|(x, w)| w * (x - mu).powi(2)).sum::<f64>() / total;
    var.sqrt()
}

fn mode_bin(h: &HistogramView<'_>) -> f64 {
    let bins = h.bins();
    let best = bins
        .iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |best, (i, v)| match best {
            Some((_, bv)) if bv >= *v => best,
            _ => Some((i, *v)),
        });
    best.map_or(f64::NAN, |(i, _)| h.layout().bin_start(i) as f64)
}

fn nonzero_bins(h: &HistogramView<'_>) -> f64 {
    h.bins().iter().filter(|v| **v > 0.0).count() as f64
}

/// Functions every registry created with
/// [`with_builtins`](HistogramFunctionRegistry::with_builtins) knows: `mean` and
/// `stddev` (bin midpoints, underflow at `lower`, overflow at `upper`), `mode` (first
/// value of the fullest bin), and `nonzero_bins`.
pub fn builtin_functions() -> &'static [(&'static str, HistogramFn)] {
    BUILTINS
}

const BUILTINS: &[(&str, HistogramFn)] = &[
    ("mean", mean),
    ("stddev", stddev),
    ("mode", mode_bin),
    ("nonzero_bins", nonzero_bins),
];
