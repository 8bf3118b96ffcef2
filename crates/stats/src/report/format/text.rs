//! Hierarchical text output.

use std::io::Write;

use super::{ReportFormatter, format_value};
use crate::common::Result;
use crate::report::snapshot::ReportSnapshot;

const INDENT: usize = 2;
const NAME_WIDTH: usize = 32;

/// Writes `report "name"` headers and `name = value` lines, indented per depth.
#[derive(Debug)]
pub struct TextFormatter<W: Write> {
    out: W,
}

impl<W: Write> TextFormatter<W> {
    /// Wraps a writer.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, report: &ReportSnapshot, depth: usize) -> Result<()> {
        let pad = " ".repeat(depth * INDENT);
        if report.author.is_empty() {
            writeln!(self.out, "{pad}report \"{}\"", report.name)?;
        } else {
            writeln!(self.out, "{pad}report \"{}\" (author: {})", report.name, report.author)?;
        }
        let inner = " ".repeat((depth + 1) * INDENT);
        for (key, value) in &report.header {
            writeln!(self.out, "{inner}# {key}: {value}")?;
        }
        for stat in &report.stats {
            writeln!(
                self.out,
                "{inner}{:<w$} = {}",
                stat.name,
                format_value(stat.value),
                w = NAME_WIDTH
            )?;
            for (sub, value) in &stat.contexts {
                let label = format!("{}.{sub}", stat.name);
                writeln!(self.out, "{inner}  {label:<w$} = {}", format_value(*value), w = NAME_WIDTH - 2)?;
            }
        }
        for sub in &report.subreports {
            self.write_report(sub, depth + 1)?;
        }
        Ok(())
    }
}

impl<W: Write> ReportFormatter for TextFormatter<W> {
    fn write_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<()> {
        writeln!(self.out, "# tick {}", snapshot.tick)?;
        self.write_report(snapshot, 0)
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
