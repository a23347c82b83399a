//! Tracing subscriber initialization.
//!
//! Grounded on the teacher's `LoggerImpl::init`: an `EnvFilter` seeded
//! from the configured level, a stdout layer in the configured format,
//! and an optional daily-rotated JSON file layer via `tracing-appender`.

use anyhow::Result;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::infrastructure::config::{LogFormat, LoggingConfig};

/// Holds the non-blocking file appender's worker guard; the subscriber
/// stops flushing once this is dropped, so callers keep it alive for
/// the process lifetime.
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(config: &LoggingConfig) -> Result<LoggerGuard> {
    let default_level = parse_log_level(&config.level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let file_guard = if let Some(log_dir) = &config.log_dir {
        let appender = rolling::daily(log_dir, "foreman.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter.clone());

        if config.enable_stdout {
            tracing_subscriber::registry()
                .with(file_layer)
                .with(stdout_layer(config.format, env_filter))
                .init();
        } else {
            tracing_subscriber::registry().with(file_layer).init();
        }
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(stdout_layer(config.format, env_filter))
            .init();
        None
    };

    tracing::info!(level = %config.level, format = ?config.format, file_output = config.log_dir.is_some(), "logger initialized");

    Ok(LoggerGuard { _file_guard: file_guard })
}

fn stdout_layer<S>(
    format: LogFormat,
    filter: EnvFilter,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("invalid log level: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("ERROR"), Ok(Level::ERROR)));
        assert!(parse_log_level("verbose").is_err());
    }
}
