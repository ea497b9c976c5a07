use crate::config::LoggingConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides the configured filter, e.g.
/// `MEDIABRIDGE_LOG=mediabridge_export=trace`.
pub const LOG_ENV_VAR: &str = "MEDIABRIDGE_LOG";

const DEFAULT_FILE_NAME: &str = "mediabridge.log";

/// Keeps the background file writer alive; drop it last.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber. Without a `log_dir` only stdout is used.
pub fn init_logging(
    config: &LoggingConfig,
    log_dir: Option<&Path>,
) -> Result<LoggingGuard, LoggingError> {
    let env_filter = build_filter(config)?;

    let mut file_guard = None;
    let writer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
            let file_stem = config.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME);
            cleanup_old_logs(dir, file_stem, config.max_log_files.max(1))?;

            let appender = tracing_appender::rolling::daily(dir, file_stem);
            let (file, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            if config.stdout {
                BoxMakeWriter::new(std::io::stdout.and(file))
            } else {
                BoxMakeWriter::new(file)
            }
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(config.stdout && log_dir.is_none())
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    tracing::debug!(level = config.level.as_filter_directive(), "logging initialised");
    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let directive = std::env::var(LOG_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.level.as_filter_directive().to_string());
    EnvFilter::try_new(&directive).map_err(|source| LoggingError::ParseLevel {
        level: directive,
        source,
    })
}

/// Keeps at most `max_files` rotated files whose name starts with `file_stem`.
fn cleanup_old_logs(dir: &Path, file_stem: &str, max_files: usize) -> Result<(), LoggingError> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(file_stem))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    if entries.len() <= max_files {
        return Ok(());
    }

    entries.sort_by_key(|(_, modified)| *modified);
    let excess = entries.len() - max_files;
    for (path, _) in entries.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::Cleanup { path, source })?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse log filter {level}: {source}")]
    ParseLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove old log file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
