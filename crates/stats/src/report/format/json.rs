//! JSON output.

use std::io::Write;

use serde_json::{Map, Value, json};

use super::ReportFormatter;
use crate::common::Result;
use crate::report::snapshot::ReportSnapshot;

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or_else(|| Value::String(value.to_string()), Value::Number)
}

/// Renders a snapshot as
/// `{name, author, stats: {name: value}, subreports: [...], header, metadata}`.
///
/// Context counters appear in their grouped form; non-finite values are strings.
pub fn snapshot_to_json(snapshot: &ReportSnapshot) -> Value {
    let mut stats = Map::new();
    for stat in &snapshot.stats {
        let value = stat.grouped.clone().unwrap_or_else(|| number(stat.value));
        let _ = stats.insert(stat.name.clone(), value);
    }
    let header: Map<String, Value> = snapshot
        .header
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let mut metadata: Map<String, Value> = snapshot
        .styles
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let _ = metadata.insert("tick".to_string(), json!(snapshot.tick));
    json!({
        "name": snapshot.name,
        "author": snapshot.author,
        "stats": stats,
        "subreports": snapshot.subreports.iter().map(snapshot_to_json).collect::<Vec<_>>(),
        "header": header,
        "metadata": metadata,
    })
}

/// Collects snapshots and writes them on [`finish`](ReportFormatter::finish): a single
/// document for one snapshot, an array otherwise.
#[derive(Debug)]
pub struct JsonFormatter<W: Write> {
    out: W,
    documents: Vec<Value>,
}

impl<W: Write> JsonFormatter<W> {
    /// Wraps a writer.
    pub const fn new(out: W) -> Self {
        Self {
            out,
            documents: Vec::new(),
        }
    }

    /// Snapshots collected so far.
    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportFormatter for JsonFormatter<W> {
    fn write_snapshot(&mut self, snapshot: &ReportSnapshot) -> Result<()> {
        self.documents.push(snapshot_to_json(snapshot));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let documents = std::mem::take(&mut self.documents);
        match documents.len() {
            0 => {}
            1 => serde_json::to_writer_pretty(&mut self.out, &documents[0])?,
            _ => serde_json::to_writer_pretty(&mut self.out, &documents)?,
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}
