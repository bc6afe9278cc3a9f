// QueryTrail - core/format.rs
//
// Statement normalisation and table construction.
// Core layer: builds `Table` values, never talks to a sink.

use crate::core::model::{LogMessage, Table, TimingRecord};
use crate::util::constants;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // ASCII whitespace only; NBSP and other Unicode spaces are statement text.
    RE.get_or_init(|| Regex::new(r"[ \t\r\n\x0B\x0C]+").expect("format: invalid whitespace regex"))
}

fn dml_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(SELECT|UPDATE|DELETE|INSERT)").expect("format: invalid DML regex")
    })
}

/// Collapse whitespace runs to a single space and trim both ends.
pub fn normalize_statement(text: &str) -> String {
    whitespace_re().replace_all(text.trim(), " ").into_owned()
}

/// Whether a statement is worth an execution plan.
///
/// Matches anywhere in the text, case-insensitively, so `select` inside a
/// sub-query or a CTE counts.
pub fn is_explainable(statement: &str) -> bool {
    dml_re().is_match(statement)
}

fn header(cells: &[&str]) -> Vec<Value> {
    cells.iter().map(|c| Value::from(*c)).collect()
}

/// `Query summary` table: span count, total time, and the spans themselves.
pub fn summary_table(timings: &[TimingRecord], total_time: f64) -> Table {
    Table::new(
        constants::SUMMARY_TABLE_TITLE,
        vec![
            header(&constants::SUMMARY_HEADER),
            vec![json!(timings.len()), json!(total_time), json!(timings)],
        ],
    )
}

/// Per-query table, titled by the statement.
pub fn query_table(title: String, elapsed: f64, message: &LogMessage) -> Table {
    Table::new(
        title,
        vec![header(&constants::QUERY_HEADER), vec![json!(elapsed), json!(message)]],
    )
}

/// Accumulates `[statement, elapsed]` rows for the combined layout.
#[derive(Debug, Clone)]
pub struct CombinedTable {
    rows: Vec<Vec<Value>>,
}

impl CombinedTable {
    pub fn new() -> Self {
        Self {
            rows: vec![header(&constants::COMBINED_HEADER)],
        }
    }

    pub fn push(&mut self, statement: String, elapsed: f64) {
        self.rows.push(vec![Value::String(statement), json!(elapsed)]);
    }

    /// Number of statement rows, header excluded.
    pub fn len(&self) -> usize {
        self.rows.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_table(self) -> Table {
        Table::new(constants::COMBINED_TABLE_TITLE, self.rows)
    }
}

impl Default for CombinedTable {
    fn default() -> Self {
        Self::new()
    }
}
