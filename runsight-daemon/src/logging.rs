//! Logging initialization for runsight-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `RunsightConfig`. `RUST_LOG` takes precedence over the configured level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use runsight_core::config::GeneralConfig;

/// Build the level filter: `RUST_LOG` if set, otherwise the configured level.
pub fn env_filter(config: &GeneralConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Initialize the global tracing subscriber.
///
/// Must be called once, before the orchestrator is built.
///
/// * `"json"` - one JSON object per line (default, for log shippers)
/// * `"pretty"` - human-readable multi-line output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)),
        other => Err(anyhow::anyhow!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_rejected() {
        let config = GeneralConfig {
            log_level: "info".to_owned(),
            log_format: "xml".to_owned(),
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn configured_level_used_as_filter() {
        let config = GeneralConfig {
            log_level: "debug".to_owned(),
            log_format: "json".to_owned(),
        };
        // Only meaningful when RUST_LOG is unset.
        if std::env::var("RUST_LOG").is_err() {
            assert!(env_filter(&config).to_string().contains("debug"));
        }
    }
}
