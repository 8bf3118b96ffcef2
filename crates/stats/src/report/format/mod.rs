//! Report output formats.
//!
//! Every formatter consumes [`ReportSnapshot`]s; none of them touches the simulation
//! tree. The output file's extension picks the format in [`formatter_for_path`].

mod delimited;
mod json;
mod text;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub use delimited::CsvFormatter;
pub use json::{JsonFormatter, snapshot_to_json};
pub use text::TextFormatter;
use super::snapshot::ReportSnapshot;
use crate::common::{Result, StatsError};

/// Sink for evaluated reports.
pub trait ReportFormatter {
    /// Writes one snapshot.
    fn write_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<()>;

    /// Flushes buffered output.
    fn finish(&mut self) -> Result<()>;
}

/// Opens `path` and returns the formatter matching its extension (`txt`, `csv`, `json`).
pub fn formatter_for_path(path: &Path) -> Result<Box<dyn ReportFormatter>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let open = || -> Result<BufWriter<File>> { Ok(BufWriter::new(File::create(path)?)) };
    match extension.as_str() {
        "txt" | "text" => Ok(Box::new(TextFormatter::new(open()?))),
        "csv" => Ok(Box::new(CsvFormatter::new(open()?))),
        "json" => Ok(Box::new(JsonFormatter::new(open()?))),
        other => Err(StatsError::parse(
            path.display().to_string(),
            0,
            format!("unknown report format `{other}`"),
        )),
    }
}

/// Renders a value the way every text-like format prints it: integers without a
/// fraction, everything else with six significant decimals.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.6}")
    }
}
