// QueryTrail - app/target.rs
//
// The log export target: filters incoming messages, buffers them, and
// exports summary and per-query tables to the injected sink when the
// buffer reaches the export interval or the host signals the final flush.
//
// Export triggering is suspended while an export runs so that messages
// logged by the export itself (e.g. by EXPLAIN queries) cannot start a
// nested export. The suspension is a scoped guard, released on every exit
// path including unwinding.

use crate::core::explain::{explain_sql, explain_table, QueryExecutor};
use crate::core::filter::{filter_messages, MessageFilter};
use crate::core::format::{self, CombinedTable};
use crate::core::model::{Level, LogMessage, Table, TimingRecord};
use crate::core::sink::TableSink;
use crate::core::timing::{durations_by_end, elapsed_for_end, total_duration, MessageBatch};
use crate::util::constants;
use crate::util::error::ExportError;
use std::cell::Cell;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Options
// =============================================================================

/// How profiled statements are laid out in the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportLayout {
    /// One table per statement, plus its execution plan in explain mode.
    #[default]
    PerQuery,

    /// A single `All queries` table with one row per statement.
    Combined,
}

impl FromStr for ExportLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "per-query" => Ok(Self::PerQuery),
            "combined" => Ok(Self::Combined),
            other => Err(format!(
                "unknown layout '{other}', expected 'per-query' or 'combined'"
            )),
        }
    }
}

/// Behaviour switches for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOptions {
    /// When false, `collect` ignores everything.
    pub enabled: bool,

    /// Fetch and send execution plans for DML/DQL statements.
    /// Only applies to the per-query layout.
    pub explain: bool,

    /// Buffered message count that triggers an export (0 = final flush only).
    pub export_interval: usize,

    pub filter: MessageFilter,

    pub layout: ExportLayout,

    /// Uppercase per-query table titles.
    pub uppercase_titles: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            explain: false,
            export_interval: constants::DEFAULT_EXPORT_INTERVAL,
            filter: MessageFilter::database_queries(),
            layout: ExportLayout::PerQuery,
            uppercase_titles: true,
        }
    }
}

/// Outcome of one export cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    /// Correlated spans in the exported batch.
    pub queries: usize,

    /// Sum of span durations, in seconds.
    pub total_time: f64,

    /// Tables delivered to the sink, summary included.
    pub tables_sent: usize,

    /// Execution plans delivered.
    pub explained: usize,
}

// =============================================================================
// Export suspension
// =============================================================================

/// Shared flag raised while an export is running.
#[derive(Debug, Clone, Default)]
struct ExportSuspension(Rc<Cell<bool>>);

impl ExportSuspension {
    fn is_active(&self) -> bool {
        self.0.get()
    }

    fn suspend(&self) -> SuspensionGuard {
        let previous = self.0.replace(true);
        SuspensionGuard {
            flag: Rc::clone(&self.0),
            previous,
        }
    }
}

/// Restores the flag to its prior state when dropped.
struct SuspensionGuard {
    flag: Rc<Cell<bool>>,
    previous: bool,
}

impl Drop for SuspensionGuard {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

// =============================================================================
// Target
// =============================================================================

/// Buffers profiling messages and exports them as tables.
pub struct LogExportTarget<S: TableSink> {
    sink: S,
    executor: Option<Box<dyn QueryExecutor>>,
    options: TargetOptions,
    buffer: MessageBatch,
    suspension: ExportSuspension,
}

impl<S: TableSink> LogExportTarget<S> {
    pub fn new(sink: S, options: TargetOptions) -> Self {
        tracing::debug!(
            enabled = options.enabled,
            explain = options.explain,
            export_interval = options.export_interval,
            layout = ?options.layout,
            categories = ?options.filter.categories,
            "Export target created"
        );
        Self {
            sink,
            executor: None,
            options,
            buffer: MessageBatch::new(),
            suspension: ExportSuspension::default(),
        }
    }

    /// Attach the data store used for execution plans.
    pub fn with_executor(mut self, executor: Box<dyn QueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    pub fn filter(&self) -> &MessageFilter {
        &self.options.filter
    }

    /// Effective export interval: the configured value, or 0 while an
    /// export is running.
    pub fn export_interval(&self) -> usize {
        if self.suspension.is_active() {
            0
        } else {
            self.options.export_interval
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.suspension.is_active()
    }

    /// Messages waiting for the next export.
    pub fn buffered(&self) -> &[LogMessage] {
        self.buffer.messages()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Timing records for the buffered messages, memoised until the buffer
    /// changes.
    pub fn calculate_timings(&self) -> Arc<[TimingRecord]> {
        self.buffer.timings()
    }

    /// Accept a batch from the host dispatcher.
    ///
    /// Filtered messages are appended to the buffer. When the buffer is
    /// non-empty and either `final_flush` is set or the export interval is
    /// reached, the buffer is exported and then cleared whatever the export
    /// outcome. Returns the export report when an export ran.
    pub fn collect<I>(
        &mut self,
        incoming: I,
        final_flush: bool,
    ) -> Result<Option<ExportReport>, ExportError>
    where
        I: IntoIterator<Item = LogMessage>,
    {
        if !self.options.enabled {
            return Ok(None);
        }

        let before = self.buffer.len();
        self.buffer
            .extend(filter_messages(incoming, &self.options.filter));
        let count = self.buffer.len();
        tracing::trace!(kept = count - before, buffered = count, final_flush, "Messages collected");

        let interval = self.export_interval();
        let due = final_flush || (interval > 0 && count >= interval);
        if count == 0 || !due {
            return Ok(None);
        }

        let guard = self.suspension.suspend();
        let result = self.export();
        self.buffer.clear();
        drop(guard);

        match &result {
            Ok(report) => tracing::debug!(
                messages = count,
                queries = report.queries,
                tables = report.tables_sent,
                "Export completed"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                messages = count,
                "Export failed; buffered messages discarded"
            ),
        }
        result.map(Some)
    }

    /// Send the buffered messages to the sink.
    ///
    /// The first failure stops the cycle: later tables are not sent.
    pub fn export(&mut self) -> Result<ExportReport, ExportError> {
        let timings = self.buffer.timings();
        let total_time = total_duration(&timings);
        let mut report = ExportReport {
            queries: timings.len(),
            total_time,
            ..Default::default()
        };

        send(&mut self.sink, &format::summary_table(&timings, total_time))?;
        report.tables_sent += 1;

        let by_end = durations_by_end(&timings);
        let messages = self.buffer.messages();
        let mut combined = CombinedTable::new();

        for (index, message) in messages.iter().enumerate() {
            if message.level != Level::ProfileEnd {
                continue;
            }
            let statement = format::normalize_statement(&message.text);
            let elapsed = elapsed_for_end(messages, &by_end, index);

            match self.options.layout {
                ExportLayout::Combined => combined.push(statement, elapsed),
                ExportLayout::PerQuery => {
                    let title = if self.options.uppercase_titles {
                        statement.to_ascii_uppercase()
                    } else {
                        statement.clone()
                    };
                    send(&mut self.sink, &format::query_table(title, elapsed, message))?;
                    report.tables_sent += 1;

                    if self.options.explain && format::is_explainable(&statement) {
                        let executor = self
                            .executor
                            .as_deref_mut()
                            .ok_or_else(|| ExportError::NoExecutor {
                                sql: explain_sql(&statement),
                            })?;
                        let plan = explain_table(executor, &statement).map_err(|source| {
                            ExportError::Explain {
                                sql: explain_sql(&statement),
                                source,
                            }
                        })?;
                        send(&mut self.sink, &plan)?;
                        report.tables_sent += 1;
                        report.explained += 1;
                    }
                }
            }
        }

        if self.options.layout == ExportLayout::Combined {
            send(&mut self.sink, &combined.into_table())?;
            report.tables_sent += 1;
        }

        Ok(report)
    }
}

fn send<S: TableSink + ?Sized>(sink: &mut S, table: &Table) -> Result<(), ExportError> {
    sink.send_table(&table.title, &table.rows)
        .map_err(|source| ExportError::Sink {
            title: table.title.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::explain::Row;
    use crate::core::sink::MemorySink;
    use crate::util::error::{ExplainError, SinkError};
    use serde_json::{json, Value};
    use std::cell::RefCell;

    const QUERY: &str = "yii\\db\\Command::query";

    fn begin(text: &str, ts: f64) -> LogMessage {
        LogMessage::new(text, Level::ProfileBegin, QUERY, ts)
    }

    fn end(text: &str, ts: f64) -> LogMessage {
        LogMessage::new(text, Level::ProfileEnd, QUERY, ts)
    }

    fn target_with(options: TargetOptions) -> LogExportTarget<MemorySink> {
        LogExportTarget::new(MemorySink::new(), options)
    }

    /// Fails every send after the first `ok_sends`.
    struct FlakySink {
        ok_sends: usize,
        sent: Vec<String>,
    }

    impl TableSink for FlakySink {
        fn send_table(&mut self, title: &str, _rows: &[Vec<Value>]) -> Result<(), SinkError> {
            if self.sent.len() >= self.ok_sends {
                return Err(SinkError::Rejected {
                    reason: "transport closed".to_string(),
                });
            }
            self.sent.push(title.to_string());
            Ok(())
        }
    }

    struct PanickingSink;

    impl TableSink for PanickingSink {
        fn send_table(&mut self, _title: &str, _rows: &[Vec<Value>]) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    /// Records every statement and answers with fixed rows.
    struct FakeExecutor {
        calls: Rc<RefCell<Vec<String>>>,
        rows: Vec<Row>,
    }

    impl QueryExecutor for FakeExecutor {
        fn query_all(&mut self, sql: &str) -> Result<Vec<Row>, ExplainError> {
            self.calls.borrow_mut().push(sql.to_string());
            Ok(self.rows.clone())
        }
    }

    fn plan_row() -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(1));
        row.insert("type".to_string(), json!("ALL"));
        row
    }

    #[test]
    fn test_no_export_below_interval() {
        let mut target = target_with(TargetOptions {
            export_interval: 5,
            ..Default::default()
        });
        for i in 0..4 {
            let report = target.collect(vec![begin("SELECT 1", i as f64)], false).unwrap();
            assert!(report.is_none());
        }
        assert!(target.sink().tables().is_empty());
        assert_eq!(target.buffered().len(), 4);
    }

    #[test]
    fn test_export_when_interval_reached() {
        let mut target = target_with(TargetOptions {
            export_interval: 2,
            ..Default::default()
        });
        assert!(target.collect(vec![begin("SELECT 1", 1.0)], false).unwrap().is_none());
        let report = target
            .collect(vec![end("SELECT 1", 1.5)], false)
            .unwrap()
            .unwrap();
        assert_eq!(report.queries, 1);
        assert_eq!(report.tables_sent, 2);
        assert!(target.buffered().is_empty());
        assert_eq!(target.export_interval(), 2);
    }

    #[test]
    fn test_zero_interval_waits_for_final() {
        let mut target = target_with(TargetOptions {
            export_interval: 0,
            ..Default::default()
        });
        let many: Vec<LogMessage> = (0..50).map(|i| begin("q", i as f64)).collect();
        assert!(target.collect(many, false).unwrap().is_none());
        assert!(target.sink().tables().is_empty());
        assert!(target.collect(Vec::new(), true).unwrap().is_some());
    }

    #[test]
    fn test_final_flush_exports_once_and_clears() {
        let mut target = target_with(TargetOptions::default());
        target.collect(vec![begin("SELECT 1", 10.0)], false).unwrap();
        let report = target.collect(vec![end("SELECT 1", 12.0)], true).unwrap().unwrap();

        assert_eq!(report.queries, 1);
        assert_eq!(report.total_time, 2.0);
        assert!(target.buffered().is_empty());

        let tables = target.sink().tables();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].title, "Query summary");
        assert_eq!(tables[0].rows[1][0], json!(1));
        assert_eq!(tables[0].rows[1][1], json!(2.0));
        assert_eq!(tables[1].title, "SELECT 1");
        assert_eq!(tables[1].rows[1][0], json!(2.0));
        assert_eq!(tables[1].rows[1][1]["text"], json!("SELECT 1"));
    }

    #[test]
    fn test_final_flush_with_empty_buffer_does_nothing() {
        let mut target = target_with(TargetOptions::default());
        assert!(target.collect(Vec::new(), true).unwrap().is_none());
        assert!(target.sink().tables().is_empty());
    }

    #[test]
    fn test_elapsed_from_adjacent_message_without_begin() {
        let mut target = target_with(TargetOptions {
            filter: MessageFilter::default(),
            ..Default::default()
        });
        target
            .collect(vec![LogMessage::new("connect", Level::Info, "app", 10.0)], false)
            .unwrap();
        target.collect(vec![end("SELECT 1", 15.0)], true).unwrap();

        let tables = target.sink().tables();
        // No BEGIN marker, so no correlated span in the summary.
        assert_eq!(tables[0].rows[1][0], json!(0));
        assert_eq!(tables[1].rows[1][0], json!(5.0));
    }

    #[test]
    fn test_summary_total_is_positive_zero_without_spans() {
        let mut target = target_with(TargetOptions::default());
        let report = target
            .collect(vec![end("SELECT 1", 12.0)], true)
            .unwrap()
            .unwrap();
        assert_eq!(report.queries, 0);
        assert!(report.total_time.is_sign_positive());

        let summary = &target.sink().tables()[0];
        assert_eq!(summary.rows[1][0], json!(0));
        assert_eq!(summary.rows[1][1], json!(0.0));
        let time = summary.rows[1][1].as_f64().unwrap();
        assert!(time.is_sign_positive());
        assert_eq!(summary.rows[1][1].to_string(), "0.0");
    }

    #[test]
    fn test_titles_normalised_and_uppercased() {
        let mut target = target_with(TargetOptions::default());
        let sql = "  select *\n   from user ";
        target.collect(vec![begin(sql, 1.0), end(sql, 2.0)], true).unwrap();
        assert_eq!(target.sink().tables()[1].title, "SELECT * FROM USER");
    }

    #[test]
    fn test_titles_uppercase_ascii_only() {
        let mut target = target_with(TargetOptions::default());
        let sql = "select 'straße' from t";
        target.collect(vec![begin(sql, 1.0), end(sql, 2.0)], true).unwrap();
        assert_eq!(target.sink().tables()[1].title, "SELECT 'STRAßE' FROM T");
    }

    #[test]
    fn test_titles_kept_as_is_when_uppercase_disabled() {
        let mut target = target_with(TargetOptions {
            uppercase_titles: false,
            ..Default::default()
        });
        target
            .collect(vec![begin("select 1", 1.0), end("select 1", 2.0)], true)
            .unwrap();
        assert_eq!(target.sink().tables()[1].title, "select 1");
    }

    #[test]
    fn test_combined_layout_single_table() {
        let mut target = target_with(TargetOptions {
            layout: ExportLayout::Combined,
            ..Default::default()
        });
        let messages = vec![
            begin("select 1", 1.0),
            end("select 1", 1.5),
            begin("SELECT  2", 2.0),
            end("SELECT  2", 3.0),
        ];
        let report = target.collect(messages, true).unwrap().unwrap();
        assert_eq!(report.tables_sent, 2);

        let tables = target.sink().tables();
        assert_eq!(tables[1].title, "All queries");
        assert_eq!(
            tables[1].rows,
            vec![
                vec![json!("SQL Statement"), json!("Time")],
                vec![json!("select 1"), json!(0.5)],
                vec![json!("SELECT 2"), json!(1.0)],
            ]
        );
    }

    #[test]
    fn test_category_filter_drops_messages() {
        let mut target = target_with(TargetOptions::default());
        assert_eq!(target.filter(), &MessageFilter::database_queries());
        target
            .collect(
                vec![
                    LogMessage::new("cache hit", Level::ProfileEnd, "yii\\caching\\Cache", 1.0),
                    begin("SELECT 1", 2.0),
                    end("SELECT 1", 3.0),
                ],
                true,
            )
            .unwrap();
        let tables = target.sink().tables();
        assert_eq!(tables.len(), 2);
        assert!(tables.iter().all(|t| !t.title.contains("CACHE HIT")));
    }

    #[test]
    fn test_disabled_target_ignores_everything() {
        let mut target = target_with(TargetOptions {
            enabled: false,
            ..Default::default()
        });
        assert!(target.collect(vec![end("SELECT 1", 1.0)], true).unwrap().is_none());
        assert!(target.buffered().is_empty());
        assert!(target.sink().tables().is_empty());
    }

    #[test]
    fn test_timings_memoised_until_buffer_changes() {
        let mut target = target_with(TargetOptions::default());
        target.collect(vec![begin("a", 1.0), end("a", 2.0)], false).unwrap();
        let first = target.calculate_timings();
        assert!(Arc::ptr_eq(&first, &target.calculate_timings()));

        target.collect(vec![begin("b", 3.0)], false).unwrap();
        assert!(!Arc::ptr_eq(&first, &target.calculate_timings()));
    }

    #[test]
    fn test_explain_sends_plan_table() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let executor = FakeExecutor {
            calls: Rc::clone(&calls),
            rows: vec![plan_row()],
        };
        let mut target = target_with(TargetOptions {
            explain: true,
            ..Default::default()
        })
        .with_executor(Box::new(executor));

        let report = target
            .collect(vec![begin("SELECT 1", 10.0), end("SELECT 1", 12.0)], true)
            .unwrap()
            .unwrap();
        assert_eq!(report.explained, 1);
        assert_eq!(*calls.borrow(), vec!["EXPLAIN SELECT 1".to_string()]);

        let plan = target.sink().table("EXPLAIN SELECT 1").unwrap();
        assert_eq!(plan.rows[0], vec![json!("id"), json!("type")]);
        assert_eq!(plan.rows[1], vec![json!(1), json!("ALL")]);
    }

    #[test]
    fn test_explain_skips_non_dml() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let executor = FakeExecutor {
            calls: Rc::clone(&calls),
            rows: vec![plan_row()],
        };
        let mut target = target_with(TargetOptions {
            explain: true,
            ..Default::default()
        })
        .with_executor(Box::new(executor));

        target
            .collect(vec![begin("SHOW TABLES", 1.0), end("SHOW TABLES", 2.0)], true)
            .unwrap();
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_explain_disabled_never_queries() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let executor = FakeExecutor {
            calls: Rc::clone(&calls),
            rows: vec![plan_row()],
        };
        let mut target = target_with(TargetOptions::default()).with_executor(Box::new(executor));
        target
            .collect(vec![begin("SELECT 1", 10.0), end("SELECT 1", 12.0)], true)
            .unwrap();
        assert!(calls.borrow().is_empty());
        assert_eq!(target.sink().tables().len(), 2);
    }

    #[test]
    fn test_empty_plan_aborts_rest_of_export() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let executor = FakeExecutor {
            calls: Rc::clone(&calls),
            rows: Vec::new(),
        };
        let mut target = target_with(TargetOptions {
            explain: true,
            ..Default::default()
        })
        .with_executor(Box::new(executor));

        let result = target.collect(
            vec![
                begin("SELECT 1", 10.0),
                end("SELECT 1", 12.0),
                begin("SELECT 2", 13.0),
                end("SELECT 2", 14.0),
            ],
            true,
        );
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ExportError::Explain {
                source: ExplainError::EmptyResult { .. },
                ..
            }
        ));
        // Summary and the first query made it out; the second did not.
        let titles: Vec<&str> = target.sink().tables().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Query summary", "SELECT 1"]);
        assert_eq!(calls.borrow().len(), 1);
        assert!(target.buffered().is_empty());
        assert_eq!(target.export_interval(), constants::DEFAULT_EXPORT_INTERVAL);
    }

    #[test]
    fn test_explain_without_executor_fails() {
        let mut target = target_with(TargetOptions {
            explain: true,
            ..Default::default()
        });
        let err = target
            .collect(vec![begin("SELECT 1", 1.0), end("SELECT 1", 2.0)], true)
            .unwrap_err();
        assert!(matches!(err, ExportError::NoExecutor { ref sql } if sql == "EXPLAIN SELECT 1"));
    }

    #[test]
    fn test_sink_failure_clears_buffer_and_restores_interval() {
        let sink = FlakySink {
            ok_sends: 1,
            sent: Vec::new(),
        };
        let mut target = LogExportTarget::new(
            sink,
            TargetOptions {
                export_interval: 3,
                ..Default::default()
            },
        );
        let err = target
            .collect(vec![begin("SELECT 1", 1.0), end("SELECT 1", 2.0)], true)
            .unwrap_err();
        assert!(matches!(err, ExportError::Sink { ref title, .. } if title == "SELECT 1"));
        assert_eq!(target.sink().sent, vec!["Query summary".to_string()]);
        assert!(target.buffered().is_empty());
        assert_eq!(target.export_interval(), 3);
        assert!(!target.is_exporting());
    }

    #[test]
    fn test_interval_restored_after_panicking_sink() {
        let mut target = LogExportTarget::new(
            PanickingSink,
            TargetOptions {
                export_interval: 7,
                ..Default::default()
            },
        );
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            target.collect(vec![end("SELECT 1", 1.0)], true)
        }));
        assert!(outcome.is_err());
        assert!(!target.is_exporting());
        assert_eq!(target.export_interval(), 7);
    }

    #[test]
    fn test_suspension_guard_nests() {
        let suspension = ExportSuspension::default();
        {
            let _outer = suspension.suspend();
            {
                let _inner = suspension.suspend();
                assert!(suspension.is_active());
            }
            assert!(suspension.is_active());
        }
        assert!(!suspension.is_active());
    }

    #[test]
    fn test_layout_parse() {
        assert_eq!("per-query".parse::<ExportLayout>().unwrap(), ExportLayout::PerQuery);
        assert_eq!("per_query".parse::<ExportLayout>().unwrap(), ExportLayout::PerQuery);
        assert_eq!("Combined".parse::<ExportLayout>().unwrap(), ExportLayout::Combined);
        assert!("grid".parse::<ExportLayout>().is_err());
    }
}
