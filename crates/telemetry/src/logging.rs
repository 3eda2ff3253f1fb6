use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

// Keeps the non-blocking file writer alive for the process lifetime.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

impl LogFormat {
    /// Parse log format from environment variable
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => Self::default(),
        }
    }
}

/// Configuration for structured logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log output format (pretty/compact/json)
    pub format: LogFormat,
    /// Service name (e.g., "gate-service")
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (dev/staging/production)
    pub environment: String,
    /// Log to a rolling file in addition to stdout
    pub log_to_file: bool,
    /// Log file directory
    pub log_dir: Option<String>,
}

impl LogConfig {
    /// Create a new log configuration with env-driven defaults
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            format: LogFormat::from_env(),
            service_name: service_name.into(),
            service_version: env::var("SERVICE_VERSION").unwrap_or_else(|_| "0.1.0".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_to_file: env::var("LOG_TO_FILE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_dir: env::var("LOG_DIR").ok(),
        }
    }

    /// Set the log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Enable logging to file
    pub fn with_file_logging(mut self, log_dir: impl Into<String>) -> Self {
        self.log_to_file = true;
        self.log_dir = Some(log_dir.into());
        self
    }
}

/// Initialize structured logging with the given configuration
pub fn init_structured_logging(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("hyper=warn".parse().expect("valid directive"))
        .add_directive("tokio=warn".parse().expect("valid directive"))
        .add_directive("ort=warn".parse().expect("valid directive"));

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(io::stdout);

            if let (true, Some(log_dir)) = (config.log_to_file, config.log_dir.as_ref()) {
                let file_appender = tracing_appender::rolling::daily(log_dir, "gate.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let _ = FILE_GUARD.set(guard);
                let file_layer = fmt::layer().json().with_writer(non_blocking);
                registry.with(json_layer).with(file_layer).init();
            } else {
                registry.with(json_layer).init();
            }
        }
        LogFormat::Compact => {
            let compact_layer = fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false);
            registry.with(compact_layer).init();
        }
        LogFormat::Pretty => {
            let pretty_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true);
            registry.with(pretty_layer).init();
        }
    }

    tracing::info!(
        service.name = %config.service_name,
        service.version = %config.service_version,
        environment = %config.environment,
        format = ?config.format,
        "structured logging initialized"
    );
}

/// Initialize logging with service name
pub fn init_with_service(service_name: impl Into<String>) {
    let config = LogConfig::new(service_name);
    init_structured_logging(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_env() {
        std::env::remove_var("LOG_FORMAT");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);

        std::env::set_var("LOG_FORMAT", "json");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);

        std::env::set_var("LOG_FORMAT", "compact");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);

        std::env::remove_var("LOG_FORMAT");
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new("gate-service")
            .with_version("1.0.0")
            .with_environment("production")
            .with_format(LogFormat::Json)
            .with_file_logging("/tmp/logs");

        assert_eq!(config.service_name, "gate-service");
        assert_eq!(config.service_version, "1.0.0");
        assert_eq!(config.environment, "production");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.log_to_file);
        assert_eq!(config.log_dir, Some("/tmp/logs".to_string()));
    }
}
