//! Logging initialization for feedmill.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Build the event filter.
///
/// `RUST_LOG` wins when set. Otherwise the configured level is used, which may
/// be a bare level or a directive list such as `feedmill=debug,sqlx=warn`.
/// An unparsable value falls back to `info`.
fn build_filter(env: Option<String>, level: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn filter_from_env(level: &str) -> EnvFilter {
    build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), level)
}

/// Initialize logging to stdout and the configured log file.
///
/// The log file is opened in append mode.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = filter_from_env(&config.level);

    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)?;
    let writer = std::io::stdout.and(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .try_init()
        .map_err(|e| crate::FeedmillError::Config(format!("logging already initialized: {e}")))?;

    Ok(())
}

/// Initialize console-only logging.
pub fn init_console_only(level: &str) {
    let filter = filter_from_env(level);

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directive_list() {
        let filter = build_filter(None, "feedmill=debug,sqlx=warn").to_string();
        assert!(filter.contains("feedmill=debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_filter_env_takes_precedence() {
        let filter = build_filter(Some("sqlx=trace".to_string()), "feedmill=debug").to_string();
        assert!(filter.contains("sqlx=trace"));
        assert!(!filter.contains("feedmill"));
    }

    #[test]
    fn test_filter_falls_back_to_info() {
        let filter = build_filter(Some("feedmill=loud".to_string()), "sqlx=noisy").to_string();
        assert_eq!(filter, "info");
    }

    #[test]
    fn test_init_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("feedmill.log");
        std::fs::write(&file, "earlier run\n").unwrap();
        let config = LoggingConfig {
            level: "info".to_string(),
            file: file.to_string_lossy().into_owned(),
        };

        let _ = init(&config);
        let contents = std::fs::read_to_string(&file).unwrap();
        assert!(contents.starts_with("earlier run\n"));
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("feedmill.log");
        let config = LoggingConfig {
            level: "debug".to_string(),
            file: file.to_string_lossy().into_owned(),
        };

        // A global subscriber may already be installed by another test; the
        // file must exist either way.
        let _ = init(&config);
        assert!(file.exists());
    }
}
