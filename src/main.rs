// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};

use reviewlens::app_config::{self, Config};
use reviewlens::pipeline::{Pipeline, RunOutcome, RunRequest};
use reviewlens::providers::Provider;
use reviewlens::providers::openai::OpenAI;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// reviewlens - weekly Play Store review classification
///
/// Fetches the reviews of one week, translates the non-English ones, classifies
/// every review with a language model and appends the week to a summary file.
#[derive(Parser, Debug)]
#[command(name = "reviewlens")]
#[command(version)]
#[command(about = "Translate and categorize Play Store reviews")]
#[command(long_about = "reviewlens processes one week of Play Store reviews per run.

EXAMPLES:
    reviewlens --summaryFile review-summary.json --startDate 2024-01-01 --endDate 2024-01-07
    reviewlens --summaryFile review-summary.json             # the week after the last entry
    reviewlens --summaryFile s.json --startDate 2024-01-01 --endDate 2024-01-07 --input reviews.csv

ENVIRONMENT:
    OPENAI_API_KEY          API key for translation and classification
    BIGQUERY_ACCESS_TOKEN   OAuth token for the warehouse (gcloud is used when unset)

CACHES:
    Fetched and classified reviews are cached under data/<start>-to-<end>/.
    Delete that directory to force a fresh fetch and classification.")]
struct CommandLineOptions {
    /// Summary file to extend with one entry per processed week
    #[arg(long = "summaryFile", value_name = "PATH")]
    summary_file: PathBuf,

    /// First day of the range (inclusive); requires --endDate
    #[arg(long = "startDate", value_name = "YYYY-MM-DD")]
    start_date: Option<String>,

    /// Last day of the range (inclusive); requires --startDate
    #[arg(long = "endDate", value_name = "YYYY-MM-DD")]
    end_date: Option<String>,

    /// CSV file of reviews to use instead of querying the warehouse
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long = "config", default_value = "reviewlens.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Model name to use for translation and classification
    #[arg(short, long)]
    model: Option<String>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Color and tag for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("1;31", "❌"),
            Level::Warn => ("1;33", "🚧"),
            Level::Info => ("1;32", " "),
            Level::Debug => ("1;36", "🔍"),
            Level::Trace => ("1;35", "📋"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Only this crate's records; reqwest and friends stay quiet
        metadata.level() <= log::max_level() && metadata.target().starts_with("reviewlens")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (color, tag) = Self::style_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\x1B[{}m{} {} {}\x1B[0m", color, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CommandLineOptions::parse();

    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;
    if let Some(level) = &cli.log_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }

    let mut config = Config::load_or_default(&cli.config_path)?;
    config.apply_env_overrides();
    if let Some(model) = &cli.model {
        config.model.model = model.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    }
    config.validate().context("Configuration validation failed")?;
    log::set_max_level(level_filter(&config.log_level));

    let provider: Option<Arc<dyn Provider>> = if config.has_api_key() {
        info!("Initialized OpenAI client with model: {}", config.model.model);
        Some(Arc::new(OpenAI::from_config(&config.model)))
    } else {
        warn!("OPENAI_API_KEY is not set; only cached classifications can be used");
        None
    };

    let request = RunRequest {
        summary_file: cli.summary_file,
        start_date: cli.start_date,
        end_date: cli.end_date,
        input: cli.input,
    };

    let mut pipeline = Pipeline::new(config, provider);
    let outcome = pipeline
        .run(&request)
        .await
        .with_context(|| format!("Run failed during stage '{}'", pipeline.stage()))?;

    match outcome {
        RunOutcome::Completed { range, detail_file, entry } => {
            info!(
                "{}: {} reviews ({} positive, {} negative) written to {:?}",
                range,
                entry.total_count.unwrap_or_default(),
                entry.positive_count,
                entry.negative_count,
                detail_file
            );
        }
        RunOutcome::AlreadySummarized { range, detail_file } => {
            info!("{} was already summarized; regenerated {:?}", range, detail_file);
        }
        RunOutcome::NoReviews { range } => {
            warn!("No reviews for {}; nothing written", range);
        }
    }

    Ok(())
}
