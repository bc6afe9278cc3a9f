// QueryTrail - core/timing.rs
//
// Span correlation: pairs PROFILE_BEGIN / PROFILE_END markers by token into
// timing records, and the message batch that memoises the result.
// Core layer: pure logic, no I/O.

use crate::core::model::{Level, LogMessage, TimingRecord};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Correlate BEGIN/END markers into spans.
///
/// A BEGIN opens a span keyed by its token; the next END with the same token
/// closes it. The nesting level is the number of other spans still open when
/// the span closes. END markers with no open span and BEGIN markers that
/// never close produce no record. Records are ordered by BEGIN position.
pub fn calculate_timings(messages: &[LogMessage]) -> Vec<TimingRecord> {
    let mut open: HashMap<&str, usize> = HashMap::new();
    let mut timings = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        match message.level {
            Level::ProfileBegin => {
                open.insert(message.text.as_str(), index);
            }
            Level::ProfileEnd => {
                if let Some(begin_index) = open.remove(message.text.as_str()) {
                    let begin = &messages[begin_index];
                    timings.push(TimingRecord {
                        token: begin.text.clone(),
                        category: begin.category.clone(),
                        timestamp: begin.timestamp,
                        traces: begin.traces.clone(),
                        nesting_level: open.len(),
                        duration: message.timestamp - begin.timestamp,
                        begin_index,
                        end_index: index,
                    });
                }
            }
            _ => {}
        }
    }

    timings.sort_by_key(|t| t.begin_index);
    timings
}

/// Sum of span durations, in seconds. `+0.0` when there are no spans.
pub fn total_duration(timings: &[TimingRecord]) -> f64 {
    // `Sum for f64` starts at -0.0, which would render as "-0.0" in tables.
    timings.iter().fold(0.0, |acc, t| acc + t.duration)
}

/// Maps END marker positions to the duration of the span they close.
pub fn durations_by_end(timings: &[TimingRecord]) -> HashMap<usize, f64> {
    timings.iter().map(|t| (t.end_index, t.duration)).collect()
}

/// Elapsed time reported for the END marker at `index`.
///
/// Uses the correlated span duration when the marker closed a span.
/// Otherwise falls back to the gap since the previous message in the
/// batch, or 0 for the first message.
pub fn elapsed_for_end(
    messages: &[LogMessage],
    by_end: &HashMap<usize, f64>,
    index: usize,
) -> f64 {
    if let Some(duration) = by_end.get(&index) {
        return *duration;
    }
    match index.checked_sub(1).and_then(|prev| messages.get(prev)) {
        Some(previous) => messages[index].timestamp - previous.timestamp,
        None => 0.0,
    }
}

// =============================================================================
// Message batch
// =============================================================================

/// Ordered message buffer with its timing records memoised.
///
/// The cache belongs to the current message set: any mutation discards it,
/// and until then every call to [`MessageBatch::timings`] returns the same
/// allocation.
#[derive(Debug, Default)]
pub struct MessageBatch {
    messages: Vec<LogMessage>,
    timings: OnceCell<Arc<[TimingRecord]>>,
}

impl MessageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[LogMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append messages in order. Invalidates the timing cache if anything
    /// was added.
    pub fn extend<I>(&mut self, incoming: I)
    where
        I: IntoIterator<Item = LogMessage>,
    {
        let before = self.messages.len();
        self.messages.extend(incoming);
        if self.messages.len() != before {
            self.timings.take();
        }
    }

    /// Drop all messages and the timing cache.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.timings.take();
    }

    /// Timing records for the current message set, computed on first use.
    pub fn timings(&self) -> Arc<[TimingRecord]> {
        let cached = self.timings.get_or_init(|| {
            let computed = calculate_timings(&self.messages);
            tracing::trace!(
                messages = self.messages.len(),
                spans = computed.len(),
                "Timings calculated"
            );
            Arc::from(computed)
        });
        Arc::clone(cached)
    }
}

impl From<Vec<LogMessage>> for MessageBatch {
    fn from(messages: Vec<LogMessage>) -> Self {
        Self {
            messages,
            timings: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "yii\\db\\Command::query";

    fn begin(token: &str, ts: f64) -> LogMessage {
        LogMessage::new(token, Level::ProfileBegin, QUERY, ts)
    }

    fn end(token: &str, ts: f64) -> LogMessage {
        LogMessage::new(token, Level::ProfileEnd, QUERY, ts)
    }

    #[test]
    fn test_single_span() {
        let timings = calculate_timings(&[begin("SELECT 1", 10.0), end("SELECT 1", 12.5)]);
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].token, "SELECT 1");
        assert_eq!(timings[0].duration, 2.5);
        assert_eq!(timings[0].nesting_level, 0);
        assert_eq!((timings[0].begin_index, timings[0].end_index), (0, 1));
    }

    #[test]
    fn test_nested_spans_ordered_by_begin() {
        let messages = vec![
            begin("outer", 1.0),
            begin("inner", 2.0),
            end("inner", 3.0),
            end("outer", 5.0),
        ];
        let timings = calculate_timings(&messages);
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].token, "outer");
        assert_eq!(timings[0].nesting_level, 0);
        assert_eq!(timings[0].duration, 4.0);
        assert_eq!(timings[1].token, "inner");
        assert_eq!(timings[1].nesting_level, 1);
        assert_eq!(timings[1].duration, 1.0);
    }

    #[test]
    fn test_unmatched_markers_ignored() {
        let messages = vec![end("orphan", 1.0), begin("never closed", 2.0)];
        assert!(calculate_timings(&messages).is_empty());
    }

    #[test]
    fn test_total_duration() {
        let messages = vec![begin("a", 0.0), end("a", 0.25), begin("b", 1.0), end("b", 1.5)];
        let timings = calculate_timings(&messages);
        assert_eq!(total_duration(&timings), 0.75);
    }

    #[test]
    fn test_total_duration_of_no_spans_is_positive_zero() {
        let total = total_duration(&[]);
        assert_eq!(total, 0.0);
        assert!(total.is_sign_positive());
    }

    #[test]
    fn test_elapsed_prefers_correlated_duration() {
        let messages = vec![
            begin("a", 1.0),
            LogMessage::new("noise", Level::Info, "app", 4.0),
            end("a", 5.0),
        ];
        let by_end = durations_by_end(&calculate_timings(&messages));
        assert_eq!(elapsed_for_end(&messages, &by_end, 2), 4.0);
    }

    #[test]
    fn test_elapsed_falls_back_to_previous_message() {
        let messages = vec![LogMessage::new("x", Level::Info, "app", 10.0), end("SELECT 1", 15.0)];
        let by_end = durations_by_end(&calculate_timings(&messages));
        assert_eq!(elapsed_for_end(&messages, &by_end, 1), 5.0);
        assert_eq!(elapsed_for_end(&messages, &by_end, 0), 0.0);
    }

    #[test]
    fn test_batch_memoises_timings() {
        let batch = MessageBatch::from(vec![begin("a", 1.0), end("a", 2.0)]);
        let first = batch.timings();
        let second = batch.timings();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_batch_mutation_invalidates_cache() {
        let mut batch = MessageBatch::from(vec![begin("a", 1.0), end("a", 2.0)]);
        let first = batch.timings();
        batch.extend(vec![begin("b", 3.0), end("b", 4.0)]);
        let second = batch.timings();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);

        // Extending with nothing keeps the cache.
        batch.extend(Vec::new());
        assert!(Arc::ptr_eq(&second, &batch.timings()));

        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.timings().is_empty());
    }
}
