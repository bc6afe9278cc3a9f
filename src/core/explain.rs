// QueryTrail - core/explain.rs
//
// Execution-plan lookups for profiled statements.
// The data store is reached through the `QueryExecutor` capability.

use crate::core::model::Table;
use crate::util::constants::EXPLAIN_PREFIX;
use crate::util::error::ExplainError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One result row, columns in result order.
pub type Row = Map<String, Value>;

/// Read-only access to the live data store.
pub trait QueryExecutor {
    /// Run `sql` and return every row.
    fn query_all(&mut self, sql: &str) -> Result<Vec<Row>, ExplainError>;
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for Box<E> {
    fn query_all(&mut self, sql: &str) -> Result<Vec<Row>, ExplainError> {
        (**self).query_all(sql)
    }
}

/// `EXPLAIN <statement>`.
pub fn explain_sql(statement: &str) -> String {
    format!("{EXPLAIN_PREFIX}{statement}")
}

/// Run the plan query and shape its rows into a table.
///
/// The header row is the column names of the first result row. An empty
/// result has no header to build and is an error.
pub fn explain_table(executor: &mut dyn QueryExecutor, statement: &str) -> Result<Table, ExplainError> {
    let sql = explain_sql(statement);
    let rows = executor.query_all(&sql)?;

    let first = rows
        .first()
        .ok_or_else(|| ExplainError::EmptyResult { sql: sql.clone() })?;

    let mut table_rows = Vec::with_capacity(rows.len() + 1);
    table_rows.push(first.keys().map(|k| Value::String(k.clone())).collect());
    table_rows.extend(rows.iter().map(|row| row.values().cloned().collect()));

    tracing::debug!(sql = %sql, rows = rows.len(), "Execution plan fetched");
    Ok(Table::new(sql, table_rows))
}

/// Serves plans captured ahead of time, keyed by the full `EXPLAIN ...` text.
///
/// Lets a recorded request be replayed with plans but without a database.
#[derive(Debug, Default, Clone)]
pub struct RecordedPlans {
    plans: HashMap<String, Vec<Row>>,
}

impl RecordedPlans {
    pub fn new(plans: HashMap<String, Vec<Row>>) -> Self {
        Self { plans }
    }

    /// Parse a JSON object of `{"EXPLAIN ...": [row, ...]}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl QueryExecutor for RecordedPlans {
    fn query_all(&mut self, sql: &str) -> Result<Vec<Row>, ExplainError> {
        self.plans
            .get(sql)
            .cloned()
            .ok_or_else(|| ExplainError::Query {
                sql: sql.to_string(),
                reason: "no recorded plan".to_string(),
            })
    }
}
