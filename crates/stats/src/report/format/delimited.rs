//! CSV output: one header row of statistic paths, then one row per snapshot.

use std::io::Write;

use super::{ReportFormatter, format_value};
use crate::common::Result;
use crate::report::snapshot::ReportSnapshot;

/// CSV writer keyed on the columns of the first snapshot.
///
/// Later snapshots are written against those columns; paths they lack leave the cell
/// empty, and paths the first snapshot lacked are dropped.
#[derive(Debug)]
pub struct CsvFormatter<W: Write> {
    writer: csv::Writer<W>,
    columns: Option<Vec<String>>,
}

impl<W: Write> CsvFormatter<W> {
    /// Wraps a writer.
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            columns: None,
        }
    }

    /// Flushes and returns the writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::common::StatsError::Io(e.into_error()))
    }
}

impl<W: Write> ReportFormatter for CsvFormatter<W> {
    fn write_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<()> {
        let values = snapshot.flatten();
        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => {
                let mut header = vec!["tick".to_string()];
                header.extend(values.iter().map(|(path, _)| path.clone()));
                self.writer.write_record(&header)?;
                self.columns = Some(header.clone());
                header
            }
        };
        let mut row = Vec::with_capacity(columns.len());
        row.push(snapshot.tick.to_string());
        for column in columns.iter().skip(1) {
            let cell = values
                .iter()
                .find(|(path, _)| path == column)
                .map(|(_, v)| format_value(*v))
                .unwrap_or_default();
            row.push(cell);
        }
        self.writer.write_record(&row)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
