// QueryTrail - core/export.rs
//
// Writer-backed table sinks: aligned text, JSON lines, and CSV.
// Core layer: writes to any Write trait object.

use crate::core::sink::TableSink;
use crate::util::error::SinkError;
use serde_json::Value;
use std::io::Write;

/// Render one cell for text output: strings verbatim, everything else as
/// compact JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// =============================================================================
// Text
// =============================================================================

/// Writes each table as a titled, column-aligned block.
#[derive(Debug)]
pub struct TextTableSink<W: Write> {
    writer: W,
}

impl<W: Write> TextTableSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TableSink for TextTableSink<W> {
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError> {
        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let columns = cells.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        writeln!(self.writer, "== {title} ==")?;
        for (row_index, row) in cells.iter().enumerate() {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
                .collect();
            writeln!(self.writer, "{}", line.join(" | ").trim_end())?;

            if row_index == 0 && cells.len() > 1 {
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                writeln!(self.writer, "{}", rule.join("-+-"))?;
            }
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// JSON lines
// =============================================================================

#[derive(serde::Serialize)]
struct JsonTable<'a> {
    title: &'a str,
    exported_at: String,
    rows: &'a [Vec<Value>],
}

/// Writes one JSON object per table, newline-delimited.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TableSink for JsonLinesSink<W> {
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError> {
        let record = JsonTable {
            title,
            exported_at: chrono::Utc::now().to_rfc3339(),
            rows,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Writes each table as a one-field title record followed by its rows.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().flexible(true).from_writer(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl<W: Write> TableSink for CsvSink<W> {
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError> {
        self.writer.write_record([title])?;
        for row in rows {
            self.writer.write_record(row.iter().map(cell_text))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
