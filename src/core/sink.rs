// QueryTrail - core/sink.rs
//
// The sink capability: where exported tables go.
// Implementations are injected into a target at construction.

use crate::core::model::Table;
use crate::util::error::SinkError;
use serde_json::Value;

/// Destination for exported tables.
///
/// Called synchronously; a slow sink blocks the caller of `collect`.
pub trait TableSink {
    /// Deliver one titled table. The first row is the header.
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError>;
}

impl<S: TableSink + ?Sized> TableSink for Box<S> {
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError> {
        (**self).send_table(title, rows)
    }
}

impl<S: TableSink + ?Sized> TableSink for &mut S {
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError> {
        (**self).send_table(title, rows)
    }
}

/// Keeps every table in memory, in delivery order.
///
/// Handy for hosts that render tables themselves after the request.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    tables: Vec<Table>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Look up the first table with the given title.
    pub fn table(&self, title: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.title == title)
    }

    pub fn into_tables(self) -> Vec<Table> {
        self.tables
    }
}

impl TableSink for MemorySink {
    fn send_table(&mut self, title: &str, rows: &[Vec<Value>]) -> Result<(), SinkError> {
        self.tables.push(Table::new(title, rows.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_sink_records_in_order() {
        let mut sink = MemorySink::new();
        sink.send_table("first", &[vec![json!("a")]]).unwrap();
        sink.send_table("second", &[vec![json!("b")], vec![json!(1)]])
            .unwrap();

        let titles: Vec<&str> = sink.tables().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(sink.table("second").unwrap().body().len(), 1);
        assert!(sink.table("third").is_none());
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let mut inner = MemorySink::new();
        {
            let mut boxed: Box<dyn TableSink + '_> = Box::new(&mut inner);
            boxed.send_table("t", &[]).unwrap();
        }
        assert_eq!(inner.tables().len(), 1);
    }
}
