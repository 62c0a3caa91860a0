//! Component assembly, queue wiring and lifecycle management.
//!
//! The [`Orchestrator`] owns the shared shutdown token and wires:
//!
//! ```text
//! EventSource -> IngestionLoop -> ingest queue -> broadcaster -> AlertBus -> StreamingGateway
//! ```
//!
//! # Startup order
//!
//! 1. Metrics exporter (if enabled)
//! 2. HTTP listener bind (fatal on failure)
//! 3. Kernel probe load + per-CPU readers (fatal on failure)
//! 4. Broadcaster, gateway and ingestion tasks
//!
//! # Shutdown order
//!
//! SIGINT/SIGTERM cancels the token. The ingestion loop exits and drops its
//! queue sender, the broadcaster drains what is left and closes every
//! subscriber, and the gateway stops accepting. Each task is awaited with a
//! bound before the daemon exits.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use runsight_alert_stream::{AlertBus, GatewayConfig, StreamingGateway, run_broadcaster};
use runsight_core::config::RunsightConfig;
use runsight_core::pipeline::IdentityResolver;
use runsight_core::types::Alert;
use runsight_engine::{
    DetectionEngine, EngineConfig, EventSource, IngestStats, IngestionLoop, PerfEventSource,
    ProcfsResolver,
};

use crate::metrics_server;

/// Upper bound for each task join during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Validated configuration.
    config: RunsightConfig,
    /// Subscriber registry shared with the gateway.
    bus: AlertBus,
    /// Bound, not yet accepting, HTTP gateway.
    gateway: StreamingGateway,
    /// Shared shutdown token.
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Validate the configuration, install metrics and bind the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics recorder cannot be installed
    /// - The listen address cannot be bound
    pub async fn build(config: RunsightConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let gateway_config = GatewayConfig::from_core(&config)
            .map_err(|e| anyhow::anyhow!("invalid stream config: {}", e))?;
        let bus = AlertBus::new(gateway_config.subscriber_capacity);
        let gateway = StreamingGateway::bind(gateway_config, bus.clone())
            .await
            .map_err(|e| anyhow::anyhow!("failed to start HTTP listener: {}", e))?;

        tracing::info!(
            listen_addr = %config.stream.listen_addr,
            object_path = %config.ebpf.object_path,
            pod_namespace = %config.pod.namespace,
            node = %config.pod.node,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            bus,
            gateway,
            cancel: CancellationToken::new(),
        })
    }

    /// Address the HTTP gateway is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.gateway.local_addr()?)
    }

    /// Token that stops every task when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Alert bus shared with the gateway.
    pub fn bus(&self) -> AlertBus {
        self.bus.clone()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &RunsightConfig {
        &self.config
    }

    /// Load the kernel probe and run until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe cannot be loaded or attached, the
    /// perf readers cannot be created, or signal handlers cannot be installed.
    pub async fn run(self) -> Result<()> {
        let engine_config = EngineConfig::from_core(&self.config);
        let source = PerfEventSource::load(&engine_config, self.cancel.clone())
            .map_err(|e| anyhow::anyhow!("failed to load kernel probe: {}", e))?;
        let resolver = ProcfsResolver::new(&self.config.pod)
            .map_err(|e| anyhow::anyhow!("failed to build identity resolver: {}", e))?;

        let signal_task = spawn_signal_watcher(self.cancel.clone())?;
        let stats = self.run_with_source(source, resolver).await;
        signal_task.abort();

        stats.map(|_| ())
    }

    /// Run the pipeline over an arbitrary source until the token is cancelled.
    ///
    /// Returns the final ingestion statistics.
    pub async fn run_with_source<S, R>(self, source: S, resolver: R) -> Result<IngestStats>
    where
        S: EventSource + 'static,
        R: IdentityResolver + 'static,
    {
        let (alert_tx, alert_rx) = mpsc::channel::<Alert>(self.config.stream.ingest_capacity);

        let ingest = IngestionLoop::builder()
            .source(source)
            .resolver(resolver)
            .engine(DetectionEngine::with_default_rules())
            .alert_sender(alert_tx)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build ingestion loop: {}", e))?;

        let broadcaster = tokio::spawn(run_broadcaster(self.bus.clone(), alert_rx));
        let gateway = tokio::spawn(self.gateway.run(self.cancel.clone()));
        let ingest = tokio::spawn(ingest.run(self.cancel.clone()));

        tracing::info!("runsight pipeline running");
        self.cancel.cancelled().await;
        tracing::info!("shutting down pipeline");

        // Producers first: the ingestion loop closes the queue the broadcaster drains.
        let stats = join_bounded("ingestion", ingest).await.unwrap_or_default();
        let _ = join_bounded("broadcaster", broadcaster).await;
        if let Some(Err(e)) = join_bounded("gateway", gateway).await {
            tracing::error!(error = %e, "gateway stopped with error");
        }

        tracing::info!(
            records = stats.records,
            alerts_raised = stats.alerts_raised,
            alerts_dropped = stats.alerts_dropped,
            subscriber_drops = self.bus.dropped(),
            "pipeline stopped"
        );
        Ok(stats)
    }
}

/// Await a task for at most [`SHUTDOWN_TIMEOUT`], aborting it on expiry.
async fn join_bounded<T>(name: &'static str, mut handle: JoinHandle<T>) -> Option<T> {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
        Ok(Ok(value)) => {
            tracing::debug!(task = name, "task finished");
            Some(value)
        }
        Ok(Err(e)) => {
            tracing::error!(task = name, error = %e, "task panicked or was cancelled");
            None
        }
        Err(_) => {
            tracing::warn!(task = name, "task did not finish in time, aborting");
            handle.abort();
            None
        }
    }
}

/// Install SIGTERM/SIGINT handlers and cancel `token` on the first signal.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
fn spawn_signal_watcher(token: CancellationToken) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::spawn(async move {
        let signal = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = token.cancelled() => return,
        };
        tracing::info!(signal, "shutdown signal received");
        token.cancel();
    }))
}

#[cfg(not(unix))]
fn spawn_signal_watcher(token: CancellationToken) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "failed to listen for ctrl-c");
                }
                tracing::info!(signal = "SIGINT", "shutdown signal received");
            }
            _ = token.cancelled() => return,
        }
        token.cancel();
    }))
}
