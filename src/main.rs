// QueryTrail - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Config loading and logging initialisation
// 3. Sink and executor construction
// 4. Replaying a recorded message stream through the export target

use clap::{Parser, ValueEnum};
use querytrail::app::replay;
use querytrail::app::target::{ExportLayout, LogExportTarget, TargetOptions};
use querytrail::core::explain::RecordedPlans;
use querytrail::core::export::{CsvSink, JsonLinesSink, TextTableSink};
use querytrail::core::sink::TableSink;
use querytrail::platform::config::{self, PlatformPaths};
use querytrail::util::constants;
use querytrail::util::error::{InputError, QueryTrailError, Result};
use querytrail::util::logging;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Output encoding for exported tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Column-aligned text blocks.
    Text,
    /// One JSON object per table.
    Json,
    /// Title record followed by table rows.
    Csv,
}

/// QueryTrail - replay recorded profiling messages and export query timing tables.
///
/// INPUT is a JSON-lines file of log messages (`-` for stdin). Messages are
/// fed to the export target in batches, the last batch flagged as the final
/// flush of the request.
#[derive(Parser, Debug)]
#[command(name = "querytrail", version, about)]
struct Cli {
    /// Recorded message stream (JSON lines), or `-` for stdin.
    input: PathBuf,

    /// Config file (defaults to the platform config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Output encoding.
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write tables to this file instead of stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Messages per collect call.
    #[arg(short = 'b', long = "batch-size", default_value_t = constants::DEFAULT_REPLAY_BATCH_SIZE)]
    batch_size: usize,

    /// Override the export interval (0 = final flush only).
    #[arg(short = 'i', long = "export-interval")]
    export_interval: Option<usize>,

    /// Override the layout: per-query or combined.
    #[arg(short = 'l', long = "layout")]
    layout: Option<ExportLayout>,

    /// Collect only these categories (repeatable; trailing `*` for prefix).
    #[arg(long = "category")]
    categories: Vec<String>,

    /// JSON file of recorded execution plans; enables explain mode.
    #[arg(long = "explain-plans")]
    explain_plans: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PlatformPaths::resolve().config_file());
    let (app_config, config_warnings) = config::load_config(&config_path);

    logging::init(cli.debug, app_config.log_level.as_deref());
    tracing::info!(
        version = constants::APP_VERSION,
        config = %config_path.display(),
        "QueryTrail starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    match run(&cli, app_config.target) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %e, "Replay aborted");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns Ok(false) when one or more exports failed.
fn run(cli: &Cli, mut options: TargetOptions) -> Result<bool> {
    if let Some(interval) = cli.export_interval {
        match config::check_export_interval(interval, "--export-interval", options.export_interval) {
            Ok(valid) => options.export_interval = valid,
            Err(e) => tracing::warn!(error = %e, "Ignoring --export-interval"),
        }
    }
    if let Some(layout) = cli.layout {
        options.layout = layout;
    }
    if !cli.categories.is_empty() {
        options.filter.categories = cli.categories.clone();
    }

    let plans = match cli.explain_plans {
        Some(ref path) => {
            options.explain = true;
            Some(load_plans(path)?)
        }
        None => None,
    };

    let messages = replay::load_messages(&cli.input)?;
    tracing::info!(
        input = %replay::input_label(&cli.input).display(),
        messages = messages.len(),
        "Input loaded"
    );

    let sink = open_sink(cli.format, cli.output.as_deref())?;
    let mut target = LogExportTarget::new(sink, options);
    if let Some(plans) = plans {
        target = target.with_executor(Box::new(plans));
    }

    let batch_size = cli.batch_size.clamp(1, constants::MAX_REPLAY_BATCH_SIZE);
    let summary = replay::replay(&mut target, messages, batch_size);

    for failure in &summary.failures {
        tracing::error!(error = %failure, "Export failed");
        eprintln!("Export failed: {failure}");
    }
    Ok(summary.is_success())
}

fn open_sink(format: OutputFormat, output: Option<&Path>) -> Result<Box<dyn TableSink>> {
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| QueryTrailError::Io {
                path: path.to_path_buf(),
                operation: "create output",
                source: e,
            })?;
            Box::new(std::io::BufWriter::new(file))
        }
        None => Box::new(std::io::stdout()),
    };

    let sink: Box<dyn TableSink> = match format {
        OutputFormat::Text => Box::new(TextTableSink::new(writer)),
        OutputFormat::Json => Box::new(JsonLinesSink::new(writer)),
        OutputFormat::Csv => Box::new(CsvSink::new(writer)),
    };
    Ok(sink)
}

fn load_plans(path: &Path) -> Result<RecordedPlans> {
    let content = std::fs::read_to_string(path).map_err(|e| QueryTrailError::Io {
        path: path.to_path_buf(),
        operation: "read explain plans",
        source: e,
    })?;
    let plans = RecordedPlans::from_json(&content).map_err(|e| InputError::Json {
        path: path.to_path_buf(),
        line: e.line(),
        source: e,
    })?;
    tracing::debug!(plans = plans.len(), "Explain plans loaded");
    Ok(plans)
}
