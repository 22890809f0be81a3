//! Logging initialization for the outreach service.
//!
//! Thin wrapper over the observability crate so every binary logs to the same
//! JSONL file under the storage root.

use crate::Paths;

/// Initialize logging for `service_name` at `level`.
///
/// Logs go to `<base>/logs/outreach.jsonl`; `also_stderr` mirrors them to the
/// terminal for foreground runs.
pub fn init_logging(service_name: &str, level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
