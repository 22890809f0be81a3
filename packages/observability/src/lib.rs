//! # Observability
//!
//! Centralized logging layer for the seller assistant services.
//!
//! Services call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Every event is written as one JSON line
//! to a central log file so operators can follow delivery activity with
//! `tail -f <storage>/logs/outreach.jsonl | jq`.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "seller-outreach".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!(chat_id = %chat_id, "outreach delivered");
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::LogFileWriter;
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Log file path. Defaults to `~/.seller-assistant/logs/outreach.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the logging layer with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the logging layer with custom configuration.
///
/// Falls back to stderr-only logging when the log file cannot be opened, so a
/// read-only disk never keeps the process from starting. Calling this more
/// than once is a no-op after the first successful install.
pub fn init_with_config(config: LogConfig) {
    file_sink::init_subscriber(&config);
}

/// Default central log file location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join(".seller-assistant")
            .join("logs")
            .join("outreach.jsonl")
    })
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_default_log_path_is_jsonl() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with("logs/outreach.jsonl"));
        }
    }
}
