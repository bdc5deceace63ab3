//! Structured logging setup.
//!
//! The multiplexer only emits `tracing` events; installing a subscriber is up to the
//! application. [`init_logging`] is a convenience that installs a `fmt` subscriber
//! configured from [`LoggingConfig`].

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false` if a
/// subscriber was already installed, which makes repeated calls from tests harmless.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
