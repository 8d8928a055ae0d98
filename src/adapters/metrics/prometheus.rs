//! Prometheus Metrics Registry - Settlement Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards,
//! alongside /live and /ready probes on the same listener. Covers
//! settlement outcomes, queue depth, reclaimed claims, and dead-letter
//! volume.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::usecases::poller::TickReport;

use super::health::HealthState;

/// Centralized Prometheus metrics for the settlement engine.
///
/// All metrics follow the naming convention `gasbank_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Settlement outcomes per tick, labelled by result.
    pub settlements: IntCounterVec,
    /// Claims won by this process.
    pub claims: IntCounter,
    /// Stale claims returned to the queue.
    pub reclaimed_claims: IntCounter,
    /// Schedule promotions (Scheduled -> PendingApproval).
    pub promotions: IntCounter,
    /// Withdrawals currently eligible for settlement.
    pub queue_depth: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let settlements = IntCounterVec::new(
            Opts::new(
                "gasbank_settlements_total",
                "Settlement attempts by outcome",
            ),
            &["result"],
        )?;

        let claims = IntCounter::new(
            "gasbank_claims_total",
            "Settlement claims won by this process",
        )?;

        let reclaimed_claims = IntCounter::new(
            "gasbank_reclaimed_claims_total",
            "Abandoned executing claims returned to the queue",
        )?;

        let promotions = IntCounter::new(
            "gasbank_schedule_promotions_total",
            "Scheduled withdrawals promoted to pending approval",
        )?;

        let queue_depth = IntGauge::new(
            "gasbank_queue_depth",
            "Queued withdrawals awaiting settlement",
        )?;

        registry.register(Box::new(settlements.clone()))?;
        registry.register(Box::new(claims.clone()))?;
        registry.register(Box::new(reclaimed_claims.clone()))?;
        registry.register(Box::new(promotions.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            settlements,
            claims,
            reclaimed_claims,
            promotions,
            queue_depth,
        })
    }

    /// Fold one poller tick into the counters.
    pub fn observe_tick(&self, report: &TickReport) {
        self.settlements
            .with_label_values(&["executed"])
            .inc_by(report.executed);
        self.settlements
            .with_label_values(&["retried"])
            .inc_by(report.retried);
        self.settlements
            .with_label_values(&["dead_letter"])
            .inc_by(report.dead_lettered);
        self.claims.inc_by(report.claimed);
        self.reclaimed_claims.inc_by(report.reclaimed);
        self.promotions.inc_by(report.promoted);
        self.queue_depth.set(report.queue_depth as i64);
    }

    /// Serve /metrics, /live, and /ready on the configured bind address.
    #[instrument(skip(self, health, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        health: Arc<HealthState>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let registry = metrics_self.registry.clone();
                    async move {
                        let encoder = TextEncoder::new();
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        if encoder.encode(&metric_families, &mut buffer).is_err() {
                            return String::new();
                        }
                        String::from_utf8(buffer).unwrap_or_default()
                    }
                }),
            )
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(health);

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while store and resolver are reachable.
    async fn readiness(State(health): State<Arc<HealthState>>) -> impl IntoResponse {
        if health.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}
