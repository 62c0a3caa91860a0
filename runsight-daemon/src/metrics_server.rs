//! Prometheus metrics exporter.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.
//! Counter and gauge names live in `runsight_core::metrics`.

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use runsight_core::config::MetricsConfig;

/// The only scrape path the built-in listener serves.
pub const SCRAPE_ENDPOINT: &str = "/metrics";

/// Resolve the exporter socket address from `[metrics]`.
///
/// `listen_addr` is a bare IP (v4 or v6); the port comes from `port`.
pub fn exporter_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != SCRAPE_ENDPOINT {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '{}' is served",
            config.endpoint,
            SCRAPE_ENDPOINT
        ));
    }

    let ip: IpAddr = config
        .listen_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address '{}': {}", config.listen_addr, e))?;
    Ok(SocketAddr::new(ip, config.port))
}

/// Install the global metrics recorder and start the scrape listener.
///
/// Call at most once per process. Registers the metric descriptions
/// from `runsight_core::metrics::describe_all` after installation.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<SocketAddr> {
    let addr = exporter_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    runsight_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(addr)
}
