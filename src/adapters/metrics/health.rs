//! Health Probe State - Liveness and Readiness
//!
//! Readiness requires the store and the resolver endpoint to be
//! reachable and the settlement poller loop to still be running; the
//! poller clears its flag when it stops, so a wedged engine drops out
//! of rotation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the store answered its last health check.
    pub store_healthy: Arc<AtomicBool>,
    /// Whether the resolver endpoint answered its last health check.
    pub resolver_healthy: Arc<AtomicBool>,
    /// Whether the settlement poller loop is running.
    pub poller_running: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state (all healthy by default).
    pub fn new() -> Self {
        Self {
            store_healthy: Arc::new(AtomicBool::new(true)),
            resolver_healthy: Arc::new(AtomicBool::new(true)),
            poller_running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Check if the engine is ready to take traffic.
    pub fn is_ready(&self) -> bool {
        self.store_healthy.load(Ordering::Relaxed)
            && self.resolver_healthy.load(Ordering::Relaxed)
            && self.poller_running.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
