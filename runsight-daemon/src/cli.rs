//! CLI argument definitions for runsight-daemon.
//!
//! Uses `clap` v4 derive macros. Flags are the last configuration layer:
//! defaults, then the optional TOML file, then environment variables, then flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use runsight_core::config::RunsightConfig;

/// Runsight runtime security agent.
///
/// Ingests kernel events from the process monitor probe, evaluates the
/// detection rules and streams alerts to subscribers over Server-Sent Events.
#[derive(Parser, Debug, Default)]
#[command(name = "runsight-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to a runsight.toml configuration file.
    ///
    /// Without it the daemon runs from defaults and environment variables.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the HTTP listen address (e.g. ":8090", "127.0.0.1:8090").
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Override the path to the prebuilt kernel probe object.
    #[arg(long)]
    pub bpf_object: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Build the effective configuration from every layer and validate it.
    pub async fn load_config(&self) -> Result<RunsightConfig> {
        let mut config = match &self.config {
            Some(path) => RunsightConfig::from_file(path)
                .await
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => RunsightConfig::default(),
        };
        config.apply_env_overrides();
        self.apply_overrides(&mut config);
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    /// Apply flag overrides on top of an already-loaded configuration.
    pub fn apply_overrides(&self, config: &mut RunsightConfig) {
        if let Some(addr) = &self.listen_addr {
            config.stream.listen_addr = addr.clone();
        }
        if let Some(path) = &self.bpf_object {
            config.ebpf.object_path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
    }
}
