// QueryTrail - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Export failures are returned to the host, never printed from library code.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all QueryTrail operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum QueryTrailError {
    /// Reading a recorded message stream failed.
    Input(InputError),

    /// Exporting buffered messages failed.
    Export(ExportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for QueryTrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(e) => write!(f, "Input error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for QueryTrailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Input(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink errors
// ---------------------------------------------------------------------------

/// Errors raised by a table sink while delivering a table.
#[derive(Debug)]
pub enum SinkError {
    /// Writing to the underlying stream failed.
    Io(io::Error),

    /// A table could not be serialised to JSON.
    Json(serde_json::Error),

    /// A table could not be written as CSV.
    Csv(csv::Error),

    /// The sink refused the table (e.g. a closed transport).
    Rejected { reason: String },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "sink write failed: {e}"),
            Self::Json(e) => write!(f, "sink JSON encoding failed: {e}"),
            Self::Csv(e) => write!(f, "sink CSV encoding failed: {e}"),
            Self::Rejected { reason } => write!(f, "sink rejected table: {reason}"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

// ---------------------------------------------------------------------------
// Explain errors
// ---------------------------------------------------------------------------

/// Errors raised while fetching an execution plan from the data store.
#[derive(Debug)]
pub enum ExplainError {
    /// The data store rejected or failed the statement.
    Query { sql: String, reason: String },

    /// The data store returned no rows, so there are no column names to
    /// build a header from.
    EmptyResult { sql: String },
}

impl fmt::Display for ExplainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query { sql, reason } => write!(f, "'{sql}' failed: {reason}"),
            Self::EmptyResult { sql } => write!(f, "'{sql}' returned no rows"),
        }
    }
}

impl std::error::Error for ExplainError {}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors that abort an export cycle.
///
/// The first failure ends the cycle; tables after it are not sent.
#[derive(Debug)]
pub enum ExportError {
    /// The sink failed to deliver a table.
    Sink { title: String, source: SinkError },

    /// The execution plan for a statement could not be produced.
    Explain { sql: String, source: ExplainError },

    /// Explain mode is enabled but no query executor was attached.
    NoExecutor { sql: String },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink { title, source } => {
                write!(f, "failed to send table '{title}': {source}")
            }
            Self::Explain { sql, source } => {
                write!(f, "failed to explain '{sql}': {source}")
            }
            Self::NoExecutor { sql } => write!(
                f,
                "explain requested for '{sql}' but no query executor is attached"
            ),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sink { source, .. } => Some(source),
            Self::Explain { source, .. } => Some(source),
            Self::NoExecutor { .. } => None,
        }
    }
}

impl From<ExportError> for QueryTrailError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

/// Errors raised while reading a recorded message stream.
#[derive(Debug)]
pub enum InputError {
    /// I/O error reading the stream.
    Io { path: PathBuf, source: io::Error },

    /// A line is not a valid message.
    Json {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read '{}': {source}", path.display())
            }
            Self::Json { path, line, source } => {
                write!(f, "'{}' line {line}: invalid message: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<InputError> for QueryTrailError {
    fn from(e: InputError) -> Self {
        Self::Input(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for QueryTrailError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for QueryTrail results.
pub type Result<T> = std::result::Result<T, QueryTrailError>;
