//! Gas Bank Settlement Engine — Entry Point
//!
//! Initializes configuration, logging, the resolver broadcaster, and the
//! settlement poller. Runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate (signing secret from GASBANK_RESOLVER_KEY)
//! 2. Init tracing (JSON structured logging)
//! 3. Create the store and the HTTP broadcaster (Resolver port)
//! 4. Wire the account ledger and settlement poller
//! 5. Spawn the metrics/health server (/metrics, /live, /ready)
//! 6. Spawn the health watcher (store + resolver probes)
//! 7. Spawn the settlement poller loop
//! 8. Wait for SIGINT → graceful shutdown (stop ticking, drain, exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use adapters::chain::HttpBroadcaster;
use adapters::metrics::{HealthState, MetricsRegistry};
use adapters::persistence::MemoryStore;
use domain::clock::SystemClock;
use ports::resolver::Resolver;
use ports::store::Store;
use usecases::ledger::AccountLedger;
use usecases::poller::SettlementPoller;

/// How often the health watcher probes the store and resolver.
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.engine.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.engine.name,
        version = env!("CARGO_PKG_VERSION"),
        resolver = %config.resolver.url,
        "Starting gas bank settlement engine"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Store, clock, resolver, ledger, poller ───────────
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock);
    let resolver = Arc::new(
        HttpBroadcaster::new(&config.resolver)
            .context("Failed to create resolver broadcaster")?,
    );
    let ledger = Arc::new(AccountLedger::new(Arc::clone(&store), Arc::clone(&clock)));

    let settings = config
        .gasbank
        .poller_settings(Duration::from_secs(config.resolver.timeout_seconds));
    let poller = SettlementPoller::new(
        Arc::clone(&store),
        Arc::clone(&resolver),
        Arc::clone(&ledger),
        Arc::clone(&clock),
        settings,
    );

    // ── 5. Metrics/health server ────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let health = Arc::new(HealthState::new());
    let metrics_handle = if config.metrics.enabled {
        let server = Arc::clone(&metrics);
        let bind = config.metrics.bind_address.clone();
        let server_health = Arc::clone(&health);
        let server_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve(bind, server_health, server_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    // ── 6. Health watcher: probe store + resolver ───────────
    let watcher_health = Arc::clone(&health);
    let watcher_store = Arc::clone(&store);
    let watcher_resolver = Arc::clone(&resolver);
    let mut watcher_shutdown = shutdown_tx.subscribe();
    let watcher_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_PROBE_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = watcher_shutdown.recv() => break,
                _ = interval.tick() => {
                    let store_ok = watcher_store.is_healthy().await;
                    let resolver_ok = watcher_resolver.is_healthy().await;
                    watcher_health.store_healthy.store(store_ok, Ordering::Relaxed);
                    watcher_health.resolver_healthy.store(resolver_ok, Ordering::Relaxed);
                }
            }
        }
    });

    // ── 7. Settlement poller loop ───────────────────────────
    let poller_shutdown = shutdown_tx.subscribe();
    let poller_metrics = Arc::clone(&metrics);
    let poller_health = Arc::clone(&health);
    let poller_handle = tokio::spawn(async move {
        poller
            .run(poller_shutdown, |report| {
                poller_metrics.observe_tick(report);
            })
            .await;
        poller_health.poller_running.store(false, Ordering::Relaxed);
    });

    info!("All tasks spawned — engine is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, initiating graceful shutdown");

    // Stop ticking; an in-flight settlement finishes its transition
    // before the loop observes the signal.
    let _ = shutdown_tx.send(());
    health.poller_running.store(false, Ordering::Relaxed);

    let _ = tokio::time::timeout(Duration::from_secs(30), poller_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}
