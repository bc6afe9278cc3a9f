// QueryTrail - core/model.rs
//
// Core data model types. Pure data definitions with no I/O.
//
// These types are the shared vocabulary across all layers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

// =============================================================================
// Level
// =============================================================================

/// Message levels emitted by the host logger.
///
/// The profiling levels mark the start and end of a timed span; the token
/// (message text) pairs them up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "LevelRepr")]
pub enum Level {
    Error,
    Warning,
    Info,
    Trace,
    Profile,
    ProfileBegin,
    ProfileEnd,
}

impl Level {
    /// Returns all variants in severity order.
    pub fn all() -> &'static [Level] {
        &[
            Level::Error,
            Level::Warning,
            Level::Info,
            Level::Trace,
            Level::Profile,
            Level::ProfileBegin,
            Level::ProfileEnd,
        ]
    }

    /// Canonical lowercase name, as written in config files.
    pub fn name(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
            Level::Trace => "trace",
            Level::Profile => "profile",
            Level::ProfileBegin => "profile_begin",
            Level::ProfileEnd => "profile_end",
        }
    }

    /// Maps the host logger's numeric level bits.
    pub fn from_bits(bits: u64) -> Option<Level> {
        match bits {
            0x01 => Some(Level::Error),
            0x02 => Some(Level::Warning),
            0x04 => Some(Level::Info),
            0x08 => Some(Level::Trace),
            0x40 => Some(Level::Profile),
            0x50 => Some(Level::ProfileBegin),
            0x60 => Some(Level::ProfileEnd),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = String;

    /// Case-insensitive; accepts `-` or `_` in the profiling level names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_lowercase().replace('-', "_");
        match normalised.as_str() {
            "error" => Ok(Level::Error),
            "warning" | "warn" => Ok(Level::Warning),
            "info" => Ok(Level::Info),
            "trace" => Ok(Level::Trace),
            "profile" => Ok(Level::Profile),
            "profile_begin" | "begin" => Ok(Level::ProfileBegin),
            "profile_end" | "end" => Ok(Level::ProfileEnd),
            _ => Err(format!("unknown level '{s}'")),
        }
    }
}

/// Wire forms a level may arrive in: a name or the host's bit value.
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Name(String),
    Bits(u64),
}

impl TryFrom<LevelRepr> for Level {
    type Error = String;

    // `Self::Error` would collide with the `Level::Error` variant.
    fn try_from(repr: LevelRepr) -> Result<Self, String> {
        match repr {
            LevelRepr::Name(name) => name.parse(),
            LevelRepr::Bits(bits) => {
                Level::from_bits(bits).ok_or_else(|| format!("unknown level value {bits:#x}"))
            }
        }
    }
}

// =============================================================================
// Log message
// =============================================================================

/// A single message handed over by the host logging dispatcher.
///
/// Deserialises from the object form or the positional form
/// `[text, level, category, timestamp, traces?]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MessageRepr")]
pub struct LogMessage {
    /// Profiling token (usually an SQL statement) or free-form text.
    pub text: String,

    pub level: Level,

    /// Logger category, e.g. `yii\db\Command::query`.
    pub category: String,

    /// Seconds, monotonic within a request.
    pub timestamp: f64,

    /// Call-site trace captured by the host; opaque here.
    pub traces: Vec<Value>,
}

impl LogMessage {
    pub fn new(text: impl Into<String>, level: Level, category: impl Into<String>, timestamp: f64) -> Self {
        Self {
            text: text.into(),
            level,
            category: category.into(),
            timestamp,
            traces: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageRepr {
    Positional(PositionalMessage),
    Object(ObjectMessage),
}

#[derive(Deserialize)]
struct PositionalMessage(String, Level, String, f64, #[serde(default)] Vec<Value>);

#[derive(Deserialize)]
struct ObjectMessage {
    text: String,
    level: Level,
    #[serde(default)]
    category: String,
    timestamp: f64,
    #[serde(default)]
    traces: Vec<Value>,
}

impl From<MessageRepr> for LogMessage {
    fn from(repr: MessageRepr) -> Self {
        match repr {
            MessageRepr::Positional(PositionalMessage(text, level, category, timestamp, traces)) => {
                Self {
                    text,
                    level,
                    category,
                    timestamp,
                    traces,
                }
            }
            MessageRepr::Object(m) => Self {
                text: m.text,
                level: m.level,
                category: m.category,
                timestamp: m.timestamp,
                traces: m.traces,
            },
        }
    }
}

// =============================================================================
// Timing record
// =============================================================================

/// One profiled span: a BEGIN marker matched with its END marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingRecord {
    /// Token shared by the BEGIN and END markers.
    pub token: String,

    /// Category of the BEGIN marker.
    pub category: String,

    /// Timestamp of the BEGIN marker.
    pub timestamp: f64,

    /// Traces of the BEGIN marker.
    pub traces: Vec<Value>,

    /// Number of spans open around this one (0 = outermost).
    pub nesting_level: usize,

    /// END timestamp minus BEGIN timestamp, in seconds.
    pub duration: f64,

    /// Position of the BEGIN marker in the batch.
    pub begin_index: usize,

    /// Position of the END marker in the batch.
    pub end_index: usize,
}

// =============================================================================
// Table
// =============================================================================

/// A titled table as delivered to a sink. The first row is the header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub title: String,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(title: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            title: title.into(),
            rows,
        }
    }

    /// Rows after the header.
    pub fn body(&self) -> &[Vec<Value>] {
        self.rows.get(1..).unwrap_or(&[])
    }
}
