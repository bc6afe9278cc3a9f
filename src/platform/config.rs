// QueryTrail - platform/config.rs
//
// Platform-specific configuration directory resolution and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::app::target::{ExportLayout, TargetOptions};
use crate::core::model::Level;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Resolved platform paths for QueryTrail configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/querytrail/ or %APPDATA%\QueryTrail\)
    pub config_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            tracing::debug!(config = %config_dir.display(), "Platform paths resolved");
            Self { config_dir }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            Self {
                config_dir: PathBuf::from("."),
            }
        }
    }

    /// Default location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[target]` section.
    pub target: TargetSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[target]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct TargetSection {
    /// Master switch for collection.
    pub enabled: Option<bool>,
    /// Fetch execution plans for DML/DQL statements.
    pub explain: Option<bool>,
    /// Level names to keep (empty = all).
    pub levels: Option<Vec<String>>,
    /// Categories to keep; trailing `*` for prefix match.
    pub categories: Option<Vec<String>>,
    /// Categories to drop.
    pub except: Option<Vec<String>>,
    /// Buffered message count that triggers an export (0 = final only).
    pub export_interval: Option<usize>,
    /// "per-query" or "combined".
    pub layout: Option<String>,
    /// Uppercase per-query titles.
    pub uppercase_titles: Option<bool>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Target behaviour.
    pub target: TargetOptions,

    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

/// Load and validate a config file.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings; an unreadable or
/// unparseable file yields defaults with a warning.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config file found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    match read_raw_config(config_path) {
        Ok(raw) => {
            tracing::info!(path = %config_path.display(), "Loaded config file");
            validate(raw)
        }
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            (AppConfig::default(), vec![msg])
        }
    }
}

/// Read and parse a config file without validating values.
pub fn read_raw_config(config_path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
        path: config_path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
        path: config_path.to_path_buf(),
        source: e,
    })
}

/// Validate raw values, accumulating a warning for every rejected field.
pub fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut config = AppConfig::default();
    let mut warnings: Vec<String> = Vec::new();
    let section = raw.target;

    if let Some(enabled) = section.enabled {
        config.target.enabled = enabled;
    }
    if let Some(explain) = section.explain {
        config.target.explain = explain;
    }
    if let Some(upper) = section.uppercase_titles {
        config.target.uppercase_titles = upper;
    }

    // -- Target: export_interval --
    if let Some(interval) = section.export_interval {
        match check_export_interval(interval, "[target] export_interval", config.target.export_interval) {
            Ok(valid) => config.target.export_interval = valid,
            Err(e) => warnings.push(e.to_string()),
        }
    }

    // -- Target: layout --
    if let Some(ref layout) = section.layout {
        match layout.parse::<ExportLayout>() {
            Ok(parsed) => config.target.layout = parsed,
            Err(reason) => warnings.push(format!("[target] layout: {reason}. Using default (per-query).")),
        }
    }

    // -- Target: levels --
    if let Some(levels) = section.levels {
        let mut parsed: HashSet<Level> = HashSet::new();
        for name in &levels {
            match name.parse::<Level>() {
                Ok(level) => {
                    parsed.insert(level);
                }
                Err(reason) => warnings.push(format!("[target] levels: {reason}; ignored.")),
            }
        }
        config.target.filter.levels = parsed;
    }

    // -- Target: categories / except --
    if let Some(categories) = section.categories {
        config.target.filter.categories = non_empty(categories, "categories", &mut warnings);
    }
    if let Some(except) = section.except {
        config.target.filter.except = non_empty(except, "except", &mut warnings);
    }

    if config.target.explain && config.target.layout == ExportLayout::Combined {
        warnings.push(
            "[target] explain has no effect with layout = \"combined\".".to_string(),
        );
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

/// Range-check an export interval from any source (config file or CLI).
///
/// `fallback` is the value that stays in effect when `interval` is rejected;
/// it is only used to word the error.
pub fn check_export_interval(interval: usize, field: &str, fallback: usize) -> Result<usize, ConfigError> {
    if interval <= constants::MAX_EXPORT_INTERVAL {
        return Ok(interval);
    }
    Err(ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: interval.to_string(),
        expected: format!("0-{}; using {fallback}", constants::MAX_EXPORT_INTERVAL),
    })
}

fn non_empty(values: Vec<String>, field: &str, warnings: &mut Vec<String>) -> Vec<String> {
    let before = values.len();
    let kept: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if kept.len() != before {
        warnings.push(format!("[target] {field}: empty entries ignored."));
    }
    kept
}
