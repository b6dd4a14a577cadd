//! `psybot run`: the long-running bot process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use psybot::channels::TelegramChannel;
use psybot::health::{
    start_health_server, start_periodic_usage_flush, HealthCheck, HealthRegistry, HealthStatus,
};
use psybot::rate_limit::spawn_sweeper;
use psybot::utils::logging::init_logging;

use super::common::{build_pipeline, config_path, ensure_usable, load_config};

/// Name of the health check describing the active provider.
const PROVIDER_CHECK: &str = "provider";

pub(crate) async fn cmd_run(config: Option<PathBuf>) -> Result<()> {
    let path = config_path(config);
    let config = load_config(&path)?;
    init_logging(&config.logging).context("Failed to initialize logging")?;
    ensure_usable(&config, true)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = config.transport.mode(),
        provider = %config.providers.active,
        "Starting PsyBot"
    );

    let pipeline = build_pipeline(&config)?;
    let health = HealthRegistry::new();
    let provider_status = match config.providers.active_entry().and_then(|e| e.api_key()) {
        Some(_) => HealthCheck::new(PROVIDER_CHECK, HealthStatus::Ok),
        None => HealthCheck {
            message: Some("no api key configured".into()),
            ..HealthCheck::new(PROVIDER_CHECK, HealthStatus::Degraded)
        },
    };
    health.register(provider_status);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_handle = if config.health.enabled {
        match start_health_server(
            &config.health.host,
            config.health.port,
            health.clone(),
            Arc::clone(&pipeline.metrics),
        )
        .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to start health server (non-fatal)");
                None
            }
        }
    } else {
        None
    };

    let usage_handle = start_periodic_usage_flush(
        Arc::clone(&pipeline.metrics),
        config.health.usage_log_interval_secs,
        shutdown_rx.clone(),
    );
    let sweeper_handle = spawn_sweeper(Arc::clone(&pipeline.limiter), shutdown_rx.clone());

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let channel = TelegramChannel::new(
        config.telegram.clone(),
        config.transport.clone(),
        Arc::clone(&pipeline.handler),
        health,
    );
    let result = channel.run(shutdown_rx).await;

    for handle in [usage_handle, sweeper_handle].into_iter().flatten() {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }
    if let Some(handle) = health_handle {
        handle.abort();
    }
    pipeline.metrics.emit_usage("exit");
    info!("PsyBot stopped");

    result.context("Telegram channel failed")
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
