use tracing_subscriber::{fmt, EnvFilter};

pub mod logging;
pub mod metrics;

// Re-export commonly used items
pub use logging::{init_structured_logging, init_with_service, LogConfig, LogFormat};

/// Minimal init for tools and tests that do not need the full config.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
