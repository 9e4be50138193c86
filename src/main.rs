//! servicewatch - self-hosted service health monitor
//!
//! Probes HTTP services, hosts, ports, VPN endpoints and application health
//! endpoints on a schedule, debounces their status and serves the result as
//! a JSON API.

mod config;
mod probe;
mod scheduler;
mod state;
mod web;

use config::{MonitorConfig, ServerConfig};
use probe::CheckerRegistry;
use scheduler::Scheduler;
use state::Store;
use web::Server;

use chrono::Utc;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("servicewatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting servicewatch on port {}...", cfg.http_port);
    tracing::info!("Using target config at {}", cfg.config_path.display());

    let monitors = match MonitorConfig::load(&cfg.config_path) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("Invalid target configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!(
        "Loaded {} targets in {} groups",
        monitors.targets().count(),
        monitors.groups.len()
    );

    let store = Arc::new(Store::new(&monitors, cfg.history_limits(), Utc::now()));
    let registry = Arc::new(CheckerRegistry::new(cfg.probe_timeout)?);

    // Start scheduler
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        registry,
        monitors.groups.clone(),
        cfg.max_concurrency,
    ));
    scheduler.start();

    // Start web server; Ctrl-C stops both
    let server = Server::new(cfg, store);
    let shutdown_scheduler = scheduler.clone();
    server
        .start(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
            shutdown_scheduler.stop();
        })
        .await?;

    Ok(())
}
