//! Service assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `logroute-daemon`.
//! It loads configuration, discovers module files, builds the output
//! service, and runs it until a shutdown signal arrives.
//!
//! # Shutdown Order
//!
//! 1. Background tasks (uptime updater)
//! 2. Output service (drain the queue, flush and close destinations)

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::broadcast;

use logroute_core::config::LogrouteConfig;
use logroute_core::pipeline::Pipeline;
use logroute_core::types::{KEY_LEVEL, KEY_MESSAGE, KEY_SENDER, Level, Message, MessageSource};
use logroute_core::TracingSink;
use logroute_output::router::now_secs;
use logroute_output::{
    OutputConfig, OutputHandle, OutputService, OutputServiceBuilder, OutputTree, Router,
    load_module_sources,
};

use crate::health::{DaemonHealth, OutputHealth, assess};
use crate::metrics_server;

/// Sender name used for messages the daemon generates itself.
pub const DAEMON_SENDER: &str = "logroute-daemon";

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogrouteConfig,
    /// The output service (owns the router once started).
    output: OutputService,
    /// Producer handle into the output queue.
    handle: OutputHandle,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - The output service cannot be built
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogrouteConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: LogrouteConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before the router registers its gauges
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let output_config = OutputConfig::from_core(&config.output);
        let sources = load_module_sources(&output_config);
        tracing::info!(modules = sources.len(), "module files discovered");

        let (output, handle) = OutputServiceBuilder::new()
            .config(output_config)
            .modules(sources)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build output service: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(16);

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        tracing::info!(
            modules = output.stats().modules(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            output,
            handle,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the output service and block until a shutdown signal.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut uptime_updater_task = if self.config.metrics.enabled {
            let shutdown_rx = self.shutdown_tx.subscribe();
            Some(spawn_uptime_updater(self.start_time, shutdown_rx))
        } else {
            None
        };

        tracing::info!("entering main event loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_updater_task.take() {
            let _ = task.await;
        }

        self.shutdown().await
    }

    /// Start the output service and announce the daemon start.
    pub async fn start(&mut self) -> Result<()> {
        self.output
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start output service: {}", e))?;

        self.handle
            .route(internal_message(Level::Notice, "logroute-daemon started"))
            .await
            .map_err(|e| anyhow::anyhow!("failed to enqueue start message: {}", e))?;
        Ok(())
    }

    /// Stop the output service and log the final health report.
    ///
    /// Destinations are flushed and closed.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping output service");
        self.output.stop().await?;

        let health = self.health().await;
        match health.to_json() {
            Ok(report) => tracing::info!(health = %report, "final health report"),
            Err(e) => tracing::warn!(error = %e, "failed to render health report"),
        }
        Ok(())
    }

    /// Re-read module files and swap the module tree.
    pub async fn reload(&self) -> Result<()> {
        let output_config = OutputConfig::from_core(&self.config.output);
        let sources = load_module_sources(&output_config);
        tracing::info!(modules = sources.len(), "reloading modules");
        self.handle
            .reload(sources)
            .await
            .map_err(|e| anyhow::anyhow!("failed to enqueue reload: {}", e))
    }

    /// Producer handle for routing messages into the output queue.
    pub fn handle(&self) -> OutputHandle {
        self.handle.clone()
    }

    /// Get the current health report.
    pub async fn health(&self) -> DaemonHealth {
        let output = OutputHealth::from_stats(self.output.stats());
        let status = assess(self.output.health_check().await, &output);
        let uptime_secs = self.start_time.elapsed().as_secs();

        if self.config.metrics.enabled {
            use logroute_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status,
            uptime_secs,
            output,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LogrouteConfig {
        &self.config
    }
}

/// Parse every module file and report the rejected ones.
///
/// Returns the number of accepted modules, or an error listing each
/// rejection.
pub fn validate_modules(config: &LogrouteConfig) -> Result<usize> {
    let output_config = OutputConfig::from_core(&config.output);
    output_config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid output config: {}", e))?;

    let sources = load_module_sources(&output_config);
    let (mut tree, errors) = OutputTree::build(&output_config, sources, None, now_secs());
    let accepted = tree.modules().len();
    tree.shutdown(now_secs());

    if errors.is_empty() {
        return Ok(accepted);
    }
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    Err(anyhow::anyhow!(
        "{} module(s) rejected:\n  {}",
        errors.len(),
        details.join("\n  ")
    ))
}

/// Render the parsed module tree in a human-readable form.
pub fn describe_modules(config: &LogrouteConfig) -> Result<String> {
    let output_config = OutputConfig::from_core(&config.output);
    output_config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid output config: {}", e))?;

    let sources = load_module_sources(&output_config);
    let mut router = Router::new(output_config, sources, Box::new(TracingSink));
    let text = router.describe();
    router.shutdown(now_secs());
    Ok(text)
}

fn internal_message(level: Level, text: &str) -> Message {
    let mut msg = Message::new(MessageSource::Internal)
        .with(KEY_SENDER, DAEMON_SENDER)
        .with(KEY_LEVEL, (level as i32).to_string())
        .with(KEY_MESSAGE, text);
    msg.stamp_if_missing();
    msg
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

fn record_daemon_metrics() {
    use logroute_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use logroute_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_message_carries_sender_and_time() {
        let msg = internal_message(Level::Notice, "hello");
        assert_eq!(msg.get(KEY_SENDER), Some(DAEMON_SENDER));
        assert_eq!(msg.get(KEY_LEVEL), Some("5"));
        assert_eq!(msg.get(KEY_MESSAGE), Some("hello"));
        assert!(msg.time_secs().is_some());
    }
}
