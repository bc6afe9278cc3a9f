// QueryTrail - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "QueryTrail";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "QueryTrail";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Target defaults
// =============================================================================

/// Number of buffered messages that triggers an export before the final flush.
pub const DEFAULT_EXPORT_INTERVAL: usize = 1_000;

/// Hard upper bound on the export interval. Larger values would let the
/// buffer grow for the whole request anyway; use 0 for "final flush only".
pub const MAX_EXPORT_INTERVAL: usize = 1_000_000;

/// Categories collected when none are configured: the query and execute
/// channels of the host's database command logger.
pub const DEFAULT_CATEGORIES: &[&str] = &["yii\\db\\Command::query", "yii\\db\\Command::execute"];

/// Suffix that turns a category filter into a prefix match.
pub const CATEGORY_WILDCARD: char = '*';

// =============================================================================
// Table titles and headers
// =============================================================================

/// Title of the summary table sent at the start of every export.
pub const SUMMARY_TABLE_TITLE: &str = "Query summary";

/// Header row of the summary table.
pub const SUMMARY_HEADER: [&str; 3] = ["Count", "Time", "Timings"];

/// Header row of each per-query table.
pub const QUERY_HEADER: [&str; 2] = ["Time", "Log info"];

/// Title of the combined table in the combined layout.
pub const COMBINED_TABLE_TITLE: &str = "All queries";

/// Header row of the combined table.
pub const COMBINED_HEADER: [&str; 2] = ["SQL Statement", "Time"];

/// Prefix prepended to a statement to request its execution plan.
pub const EXPLAIN_PREFIX: &str = "EXPLAIN ";

// =============================================================================
// Replay
// =============================================================================

/// Messages handed to each `collect` call when replaying a recorded stream.
pub const DEFAULT_REPLAY_BATCH_SIZE: usize = 100;

/// Maximum replay batch size accepted from the command line.
pub const MAX_REPLAY_BATCH_SIZE: usize = 100_000;

/// Maximum length of a message preview included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
