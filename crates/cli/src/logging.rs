//! Structured logging setup.
//!
//! Supports two modes:
//! - Interactive: Pretty-printed human-readable logs on stderr
//! - Launcher: JSON-formatted logs, one object per line, for log aggregation
//!
//! Set `RANKPART_LOG_FORMAT=json` for JSON logs.
//! Set `RUST_LOG` to control log levels (default: warn).

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log format mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Pretty-printed human-readable logs (default).
    Pretty,
    /// JSON-formatted logs.
    Json,
}

impl LogFormat {
    /// Detect log format from environment.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("RANKPART_LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize logging from the environment alone.
pub fn init() -> anyhow::Result<()> {
    init_with_level_and_format(None, LogFormat::from_env())
}

/// Initialize logging with an explicit level.
///
/// `RUST_LOG` still wins when set, so operators can narrow by target.
pub fn init_with_level(level: &str) -> anyhow::Result<()> {
    init_with_level_and_format(Some(level), LogFormat::from_env())
}

/// Initialize logging with an explicit level and format.
///
/// Logs go to stderr so JSON results on stdout stay machine-readable.
pub fn init_with_level_and_format(level: Option<&str>, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));

    let fmt_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = match format {
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        ),
        LogFormat::Json => Box::new(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging subscriber init failed: {e}"))
}
