//! Evaluated report trees handed to formatters.

use indexmap::IndexMap;
use serde_json::Value;

use crate::common::{ValueSemantic, Visibility};
use crate::sim::scheduler::Tick;

/// One evaluated statistic.
#[derive(Clone, Debug, PartialEq)]
pub struct StatSnapshot {
    /// Name in the report; the target location when the statistic is anonymous.
    pub name: String,
    /// Location of the target.
    pub location: String,
    /// Description of the target.
    pub description: String,
    /// Delta since the report started.
    pub value: f64,
    /// Value semantic of the target.
    pub semantic: ValueSemantic,
    /// Visibility of the target.
    pub visibility: Visibility,
    /// Sub-statistic values, in definition order.
    pub contexts: Vec<(String, f64)>,
    /// Grouped JSON rendering for context counters.
    pub grouped: Option<Value>,
}

/// One evaluated report and its active sub-reports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportSnapshot {
    /// Report name.
    pub name: String,
    /// Report author.
    pub author: String,
    /// Tick at which the snapshot was taken.
    pub tick: Tick,
    /// Header metadata.
    pub header: IndexMap<String, String>,
    /// Style entries.
    pub styles: IndexMap<String, String>,
    /// Statistics in insertion order.
    pub stats: Vec<StatSnapshot>,
    /// Sub-reports in insertion order.
    pub subreports: Vec<ReportSnapshot>,
}

impl ReportSnapshot {
    /// Value of the statistic named `name` in this report.
    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.iter().find(|s| s.name == name).map(|s| s.value)
    }

    /// Sub-report reached by a dotted chain of sub-report names.
    pub fn subreport(&self, path: &str) -> Option<&Self> {
        path.split('.').try_fold(self, |report, name| {
            report.subreports.iter().find(|r| r.name == name)
        })
    }

    /// Number of statistics in this report and every sub-report.
    pub fn total_stats(&self) -> usize {
        self.stats.len() + self.subreports.iter().map(Self::total_stats).sum::<usize>()
    }

    /// Every value keyed by its dotted path below this report, sub-statistics included.
    pub fn flatten(&self) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, f64)>) {
        for stat in &self.stats {
            let path = format!("{prefix}{}", stat.name);
            out.push((path.clone(), stat.value));
            for (sub, value) in &stat.contexts {
                out.push((format!("{path}.{sub}"), *value));
            }
        }
        for sub in &self.subreports {
            sub.flatten_into(&format!("{prefix}{}.", sub.name), out);
        }
    }
}
