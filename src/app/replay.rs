// QueryTrail - app/replay.rs
//
// Replays a recorded message stream through a target the way a host
// dispatcher would: fixed-size batches, the last one flagged as final.
//
// Input format: JSON lines, one message per line, positional
// (`["SELECT 1", "profile_end", "yii\\db\\Command::query", 12.5]`) or object
// form. Blank lines and lines starting with `#` are skipped.

use crate::app::target::{ExportReport, LogExportTarget};
use crate::core::model::LogMessage;
use crate::core::sink::TableSink;
use crate::util::constants::DEBUG_MAX_LINE_PREVIEW;
use crate::util::error::{ExportError, InputError};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Parse messages from a JSON-lines reader.
///
/// `source` is only used for error context.
pub fn read_messages<R: BufRead>(reader: R, source: &Path) -> Result<Vec<LogMessage>, InputError> {
    let mut messages = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| InputError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let message: LogMessage = serde_json::from_str(trimmed).map_err(|e| {
            tracing::debug!(
                line = index + 1,
                preview = %preview(trimmed),
                "Rejected input line"
            );
            InputError::Json {
                path: source.to_path_buf(),
                line: index + 1,
                source: e,
            }
        })?;
        messages.push(message);
    }

    tracing::debug!(path = %source.display(), messages = messages.len(), "Messages loaded");
    Ok(messages)
}

/// Read messages from a file, or from stdin when `path` is `-`.
pub fn load_messages(path: &Path) -> Result<Vec<LogMessage>, InputError> {
    if path == Path::new("-") {
        let stdin = std::io::stdin();
        return read_messages(stdin.lock(), path);
    }
    let file = std::fs::File::open(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_messages(std::io::BufReader::new(file), path)
}

fn preview(line: &str) -> String {
    line.chars().take(DEBUG_MAX_LINE_PREVIEW).collect()
}

/// What a replay did.
#[derive(Debug, Default)]
pub struct ReplaySummary {
    /// Messages handed to the target.
    pub messages: usize,

    /// `collect` calls made.
    pub batches: usize,

    /// Exports that completed.
    pub exports: Vec<ExportReport>,

    /// Exports that failed. Replay continues past a failed export, as a
    /// host request would.
    pub failures: Vec<ExportError>,
}

impl ReplaySummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Feed `messages` to `target` in batches of `batch_size`, flagging the last
/// batch as final. An empty stream still delivers one final call.
pub fn replay<S: TableSink>(
    target: &mut LogExportTarget<S>,
    messages: Vec<LogMessage>,
    batch_size: usize,
) -> ReplaySummary {
    let batch_size = batch_size.max(1);
    let mut summary = ReplaySummary {
        messages: messages.len(),
        ..Default::default()
    };

    let mut batches: Vec<Vec<LogMessage>> = Vec::new();
    let mut remaining = messages.into_iter().peekable();
    while remaining.peek().is_some() {
        batches.push(remaining.by_ref().take(batch_size).collect());
    }
    if batches.is_empty() {
        batches.push(Vec::new());
    }

    let last = batches.len() - 1;
    for (index, batch) in batches.into_iter().enumerate() {
        summary.batches += 1;
        match target.collect(batch, index == last) {
            Ok(Some(report)) => summary.exports.push(report),
            Ok(None) => {}
            Err(e) => summary.failures.push(e),
        }
    }

    tracing::info!(
        messages = summary.messages,
        batches = summary.batches,
        exports = summary.exports.len(),
        failures = summary.failures.len(),
        "Replay finished"
    );
    summary
}

/// Display name for an input path in messages.
pub fn input_label(path: &Path) -> PathBuf {
    if path == Path::new("-") {
        PathBuf::from("<stdin>")
    } else {
        path.to_path_buf()
    }
}
