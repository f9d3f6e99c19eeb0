//! File logging for processes hosting the store.
//!
//! # Responsibility
//! - Start one rolling file logger per process from [`LoggingConfig`].
//! - Log panics with their location before the previous hook runs.
//!
//! # Invariants
//! - Re-initializing with the same level and directory is a no-op; any other
//!   settings are rejected while a logger is active.
//! - Initialization never panics.

use crate::config::LoggingConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "cmsstore";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static FILE_LOGGER: OnceCell<FileLogger> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: LevelFilter,
    log_dir: PathBuf,
}

impl LogSettings {
    fn parse(level: &str, log_dir: &Path) -> Result<Self, String> {
        let level = level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| format!("unsupported log level `{}`", level.trim()))?;
        if log_dir.as_os_str().is_empty() || !log_dir.is_absolute() {
            return Err(format!(
                "log_dir must be an absolute path, got `{}`",
                log_dir.display()
            ));
        }
        Ok(Self {
            level,
            log_dir: log_dir.to_path_buf(),
        })
    }
}

impl Display for LogSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "level={} log_dir={}", self.level, self.log_dir.display())
    }
}

struct FileLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts rolling file logs as configured.
///
/// Returns `Ok(false)` when `config.log_dir` is unset, `Ok(true)` once the
/// configured logger is active.
///
/// # Errors
/// - The level is not one of `off|error|warn|info|debug|trace`.
/// - `log_dir` is not absolute or cannot be created.
/// - The backend fails to start, or a logger with other settings is active.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, String> {
    let Some(log_dir) = config.log_dir.as_deref() else {
        return Ok(false);
    };
    let requested = LogSettings::parse(&config.level, log_dir)?;
    let active = FILE_LOGGER.get_or_try_init(|| start_file_logger(&requested))?;
    if active.settings != requested {
        return Err(format!(
            "file logging already active with {}; refusing {}",
            active.settings, requested
        ));
    }
    Ok(true)
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_file_logger(settings: &LogSettings) -> Result<FileLogger, String> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            settings.log_dir.display()
        )
    })?;

    let handle = Logger::try_with_str(settings.level.as_str().to_ascii_lowercase())
        .map_err(|err| format!("invalid log level `{}`: {err}", settings.level))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();
    info!(
        "event=store_start module=core status=ok version={} {}",
        env!("CARGO_PKG_VERSION"),
        settings
    );

    Ok(FileLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        // payload may quote document content
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            flatten_payload(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

fn flatten_payload(value: &str, max_chars: usize) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::{flatten_payload, init_logging, LogSettings};
    use crate::config::LoggingConfig;
    use log::LevelFilter;
    use std::path::{Path, PathBuf};

    #[test]
    fn settings_parse_levels_case_insensitively() {
        let dir = std::env::temp_dir();
        assert_eq!(LogSettings::parse(" WARN ", &dir).unwrap().level, LevelFilter::Warn);
        assert_eq!(LogSettings::parse("trace", &dir).unwrap().level, LevelFilter::Trace);
        assert!(LogSettings::parse("verbose", &dir).is_err());
    }

    #[test]
    fn settings_reject_relative_directories() {
        let error = LogSettings::parse("info", Path::new("logs/dev")).unwrap_err();
        assert!(error.contains("absolute"));
    }

    #[test]
    fn panic_payload_is_flattened_and_capped() {
        assert_eq!(flatten_payload("line1\nline2\rline3", 8), "line1 li...");
        assert_eq!(flatten_payload("short", 8), "short");
    }

    #[test]
    fn missing_directory_leaves_logging_off() {
        assert!(!init_logging(&LoggingConfig::default()).unwrap());
    }

    #[test]
    fn same_settings_are_idempotent_and_others_rejected() {
        let dir: PathBuf = tempfile::tempdir().unwrap().into_path();
        let config = LoggingConfig {
            level: "info".to_string(),
            log_dir: Some(dir.clone()),
        };
        assert!(init_logging(&config).unwrap());
        assert!(init_logging(&config).unwrap());

        let louder = LoggingConfig {
            level: "debug".to_string(),
            log_dir: Some(dir),
        };
        assert!(init_logging(&louder).unwrap_err().contains("refusing"));

        let elsewhere = LoggingConfig {
            level: "info".to_string(),
            log_dir: Some(tempfile::tempdir().unwrap().into_path()),
        };
        assert!(init_logging(&elsewhere).unwrap_err().contains("refusing"));
    }
}
