//! Logging setup
//!
//! Every Courtload binary logs through `tracing`. [`init_logging`] installs one
//! global subscriber built from a [`LogConfig`]: stderr, a daily-rolling file
//! or both, as text or JSON lines, filtered by a base level plus optional
//! per-target directives.
//!
//! Log with structured fields when the value is something to filter on:
//!
//! ```rust,ignore
//! info!(batch = index, inserted, rejected, "Batch complete");
//! warn!(key = record.key(), reason = %reason, "Record rejected");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use courtload_common::logging::{init_logging, LogConfig};
//! use tracing::Level;
//!
//! # fn main() -> courtload_common::Result<()> {
//! let config = LogConfig::builder().level(Level::DEBUG).build().merge_env()?;
//! let _guard = init_logging(&config)?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::env;
use crate::error::{CommonError, Result};

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// stderr, so stdout stays free for command output
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    const NAMES: &'static [(&'static str, LogOutput)] = &[
        ("console", LogOutput::Console),
        ("stderr", LogOutput::Console),
        ("file", LogOutput::File),
        ("both", LogOutput::Both),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    const NAMES: &'static [(&'static str, LogFormat)] =
        &[("text", LogFormat::Text), ("json", LogFormat::Json)];
}

/// Case-insensitive lookup of `raw` in a name table
fn choose<T: Copy>(names: &[(&str, T)], raw: &str) -> std::result::Result<T, String> {
    names
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw.trim()))
        .map(|(_, value)| *value)
        .ok_or_else(|| {
            let accepted: Vec<&str> = names.iter().map(|(name, _)| *name).collect();
            format!("expected one of {}", accepted.join(", "))
        })
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        choose(Self::NAMES, s)
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        choose(Self::NAMES, s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    pub format: LogFormat,
    pub directory: PathBuf,
    /// Rolling files are named `<prefix>.<date>`
    pub file_prefix: String,
    /// Extra directives, e.g. `courtload_ingest::resolver=trace`
    pub directives: Vec<String>,
    pub show_location: bool,
    pub show_thread_ids: bool,
    pub show_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            format: LogFormat::Text,
            directory: PathBuf::from("./logs"),
            file_prefix: "courtload".to_string(),
            // sqlx logs every statement at info
            directives: vec!["sqlx=warn".to_string()],
            show_location: false,
            show_thread_ids: false,
            show_targets: true,
        }
    }
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Defaults overlaid with the `LOG_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay the `LOG_*` variables that are set:
    ///
    /// | variable | value |
    /// |---|---|
    /// | `LOG_LEVEL` | trace, debug, info, warn, error |
    /// | `LOG_OUTPUT` | console, file, both |
    /// | `LOG_FORMAT` | text, json |
    /// | `LOG_DIR`, `LOG_FILE_PREFIX` | rolling file location |
    /// | `LOG_FILTER` | comma-separated extra directives |
    /// | `LOG_INCLUDE_LOCATION`, `LOG_INCLUDE_THREAD_IDS`, `LOG_INCLUDE_TARGETS` | flags |
    pub fn merge_env(self) -> Result<Self> {
        let mut directives = self.directives;
        if let Some(extra) = env::var("LOG_FILTER") {
            directives.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
            );
        }

        Ok(Self {
            level: env::parse_or("LOG_LEVEL", self.level)?,
            output: env::parse_or("LOG_OUTPUT", self.output)?,
            format: env::parse_or("LOG_FORMAT", self.format)?,
            directory: env::var("LOG_DIR").map_or(self.directory, PathBuf::from),
            file_prefix: env::var("LOG_FILE_PREFIX").unwrap_or(self.file_prefix),
            directives,
            show_location: env::flag("LOG_INCLUDE_LOCATION", self.show_location)?,
            show_thread_ids: env::flag("LOG_INCLUDE_THREAD_IDS", self.show_thread_ids)?,
            show_targets: env::flag("LOG_INCLUDE_TARGETS", self.show_targets)?,
        })
    }

    /// `RUST_LOG`, then the base level, then the configured directives
    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        for raw in &self.directives {
            let directive: Directive = raw
                .parse()
                .map_err(|e| CommonError::invalid_value("log filter directive", raw.as_str(), e))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.directory = directory.into();
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.config.directives.push(directive.into());
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Keeps the background file writer running; hold it until exit.
#[must_use = "dropping the guard stops the background log writer"]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_writer = None;

    if matches!(config.output, LogOutput::Console | LogOutput::Both) {
        layers.push(layer(config, std::io::stderr, true));
    }

    if matches!(config.output, LogOutput::File | LogOutput::Both) {
        std::fs::create_dir_all(&config.directory)?;
        let appender = tracing_appender::rolling::daily(&config.directory, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_writer = Some(guard);
        layers.push(layer(config, writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| CommonError::Config(format!("cannot install log subscriber: {}", e)))?;

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}

fn layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.show_targets)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_location)
        .with_line_number(config.show_location);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}
