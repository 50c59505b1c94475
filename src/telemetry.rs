//! Structured logging setup.
//!
//! Filter priority: `RUST_LOG` > `-v` (debug) > `logging.level` > `warn`.
//! Log lines go to stderr so stdout stays reserved for run output. An optional
//! `logging.file` receives the same events as JSON through a non-blocking writer.

use crate::config::{LogFormat, LoggingSection};
use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the filter directive used when `RUST_LOG` is unset.
fn default_directive(settings: &LoggingSection, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else if settings.level.trim().is_empty() {
        "warn".to_string()
    } else {
        settings.level.clone()
    }
}

/// Open `path` for appending, creating its parent directory.
fn open_log_file(path: &Path) -> Result<RollingFileAppender, String> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| "path has no file name".to_string())?;
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| e.to_string())
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log file is configured; keep it alive
/// until exit so buffered lines are flushed. Calling this twice is harmless.
pub fn init(
    settings: &LoggingSection,
    verbose: bool,
    format: Option<LogFormat>,
) -> Option<WorkerGuard> {
    let directive = default_directive(settings, verbose);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = match format.unwrap_or(settings.format) {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let mut file_error = None;
    let appender = settings.file.as_ref().and_then(|path| match open_log_file(path) {
        Ok(appender) => Some(appender),
        Err(e) => {
            file_error = Some((path.clone(), e));
            None
        }
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .ok();

    if let Some((path, error)) = file_error {
        warn!(path = %path.display(), %error, "Could not open log file, logging to stderr only");
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let settings = LoggingSection::default();
        assert_eq!(default_directive(&settings, false), "warn");
        assert_eq!(default_directive(&settings, true), "debug");

        let settings = LoggingSection {
            level: "info,agentflow=trace".into(),
            ..LoggingSection::default()
        };
        assert_eq!(default_directive(&settings, false), "info,agentflow=trace");
    }

    #[test]
    fn test_open_log_file_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/agentflow.log");
        assert!(open_log_file(&path).is_ok());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_open_log_file_reports_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        assert!(open_log_file(&blocker.join("agentflow.log")).is_err());
        assert!(open_log_file(Path::new("/")).is_err());
    }
}
