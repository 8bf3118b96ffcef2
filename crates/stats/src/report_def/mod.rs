//! Declarative report definitions.
//!
//! A definition is a YAML map walked against the simulation tree:
//!
//! ```yaml
//! report:
//!   name: "core summary"
//!   author: perf
//!   trigger:
//!     start: top.core0.stats.retired >= 1500
//!   content:
//!     top.core*:
//!       subreport:
//!         name: "core %1"
//!         content:
//!           stats.retired: retired
//!           stats.ipc: ""
//!           autopopulate:
//!             attributes: "vis >= summary"
//! ```
//!
//! Keys that are not directives are path patterns relative to every current context
//! node; wildcards fan out and their captures feed `%N` substitutions.

mod parser;
mod scope;

use std::path::Path;

pub use parser::ReportDefParser;

use crate::common::Result;
use crate::config::StatsConfig;
use crate::histogram::HistogramFunctionRegistry;
use crate::report::Report;
use crate::sim::tree::SimTree;

/// Builds a report rooted at the tree root from the definition file at `path`.
///
/// The report is named after the file stem until the definition names it.
pub fn build_report(
    tree: &SimTree,
    registry: &HistogramFunctionRegistry,
    config: &StatsConfig,
    path: &Path,
) -> Result<Report> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let mut report = Report::new(name, tree.root());
    ReportDefParser::new(tree, registry, config).parse_file(path, &mut report)?;
    Ok(report)
}
