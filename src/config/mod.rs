//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. The resolver
//! signing secret comes from the GASBANK_RESOLVER_KEY environment
//! variable, never from the file. Contract addresses and method names
//! are externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::approval::RejectPolicy;
use crate::usecases::poller::PollerSettings;

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the engine begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Engine identity and logging.
  pub engine: EngineConfig,
  /// Settlement pipeline tunables.
  pub gasbank: GasBankConfig,
  /// Resolver endpoint and broadcast allowlist.
  pub resolver: ResolverConfig,
  /// Metrics and monitoring.
  pub metrics: MetricsConfig,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Human-readable engine name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Settlement pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GasBankConfig {
  /// Seconds between settlement poller ticks.
  #[serde(default = "default_poll_interval")]
  pub poll_interval_secs: u64,
  /// Attempts before a withdrawal is dead-lettered (inclusive).
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  /// Base delay for exponential retry backoff (milliseconds).
  #[serde(default = "default_retry_base_delay")]
  pub retry_base_delay_ms: u64,
  /// Age after which an executing claim counts as abandoned (seconds).
  #[serde(default = "default_claim_staleness")]
  pub claim_staleness_secs: u64,
  /// Maximum rows pulled per pipeline step per tick.
  #[serde(default = "default_batch_limit")]
  pub batch_limit: usize,
  /// What a single rejection does to a pending withdrawal.
  #[serde(default)]
  pub reject_policy: RejectPolicy,
  /// Whether a manually retried dead letter gets its attempt budget back.
  #[serde(default)]
  pub reset_attempts_on_retry: bool,
}

impl GasBankConfig {
  /// Poller settings derived from this section plus the resolver timeout.
  pub fn poller_settings(&self, resolver_timeout: Duration) -> PollerSettings {
    PollerSettings {
      poll_interval: Duration::from_secs(self.poll_interval_secs),
      max_attempts: self.max_attempts,
      resolver_timeout,
      retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
      claim_staleness: Duration::from_secs(self.claim_staleness_secs),
      batch_limit: self.batch_limit,
    }
  }
}

/// Resolver endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
  /// Resolver base URL.
  pub url: String,
  /// Request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// HMAC signing secret. Populated from GASBANK_RESOLVER_KEY at load
  /// time; a value in the file is rejected.
  #[serde(default)]
  pub signing_key: String,
  /// GAS token contract the transfers go through.
  pub gas_token_contract: String,
  /// Contract method invoked for a withdrawal transfer.
  #[serde(default = "default_transfer_method")]
  pub transfer_method: String,
  /// Additional contracts transfers may target.
  #[serde(default)]
  pub allowed_contracts: Vec<String>,
  /// Additional methods transfers may invoke.
  #[serde(default)]
  pub allowed_methods: Vec<String>,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable the Prometheus/health listener.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_poll_interval() -> u64 {
  15
}

fn default_max_attempts() -> u32 {
  3
}

fn default_retry_base_delay() -> u64 {
  30_000
}

fn default_claim_staleness() -> u64 {
  300
}

fn default_batch_limit() -> usize {
  50
}

fn default_timeout() -> u64 {
  30
}

fn default_transfer_method() -> String {
  "transfer".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
