//! Logging initialization.
//!
//! Log lines go to stderr so stdout stays free for `--json` reports. The
//! `RUST_LOG` environment variable overrides the configured level.

use revela_core::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Resolve the effective level: `--verbose` forces debug, otherwise the
/// configured level is used.
fn level(config: &LoggingConfig, verbose: bool) -> &str {
    if verbose {
        "debug"
    } else {
        config.level.as_str()
    }
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig, verbose: bool, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level(config, verbose)));

    if json_logs || config.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_config_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        };
        assert_eq!(level(&config, false), "warn");
        assert_eq!(level(&config, true), "debug");
    }
}
