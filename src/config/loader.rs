//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, injecting the resolver signing
//! secret from the environment, validating all parameters, and
//! providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::account::normalize_wallet_address;

use super::AppConfig;

/// Environment variable carrying the resolver HMAC secret.
pub const RESOLVER_KEY_ENV: &str = "GASBANK_RESOLVER_KEY";

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - The signing secret is in the file or missing from the environment
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config: AppConfig = toml::from_str(&content)
    .with_context(|| "Failed to parse config.toml")?;

  anyhow::ensure!(
    config.resolver.signing_key.is_empty(),
    "resolver.signing_key must not be set in config.toml; use {}",
    RESOLVER_KEY_ENV
  );
  config.resolver.signing_key = std::env::var(RESOLVER_KEY_ENV)
    .with_context(|| format!("{RESOLVER_KEY_ENV} not set"))?;

  validate_config(&config)?;

  info!(
    engine = %config.engine.name,
    poll_interval_secs = config.gasbank.poll_interval_secs,
    max_attempts = config.gasbank.max_attempts,
    resolver = %config.resolver.url,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.engine.name.is_empty(),
    "engine.name must not be empty"
  );

  anyhow::ensure!(
    config.gasbank.poll_interval_secs > 0,
    "gasbank.poll_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.gasbank.max_attempts >= 1,
    "gasbank.max_attempts must be at least 1, got {}",
    config.gasbank.max_attempts
  );
  anyhow::ensure!(
    config.gasbank.retry_base_delay_ms > 0,
    "gasbank.retry_base_delay_ms must be positive"
  );
  anyhow::ensure!(
    config.gasbank.claim_staleness_secs > config.gasbank.poll_interval_secs,
    "gasbank.claim_staleness_secs ({}) must exceed poll_interval_secs ({}) \
     or live claims get reclaimed mid-attempt",
    config.gasbank.claim_staleness_secs,
    config.gasbank.poll_interval_secs
  );
  anyhow::ensure!(
    config.gasbank.claim_staleness_secs > config.resolver.timeout_seconds,
    "gasbank.claim_staleness_secs ({}) must exceed resolver.timeout_seconds ({}) \
     or an in-flight resolver call can outlive its claim",
    config.gasbank.claim_staleness_secs,
    config.resolver.timeout_seconds
  );
  anyhow::ensure!(
    config.gasbank.batch_limit > 0,
    "gasbank.batch_limit must be positive"
  );

  anyhow::ensure!(
    config.resolver.url.starts_with("http://") || config.resolver.url.starts_with("https://"),
    "resolver.url must be an http(s) URL, got {}",
    config.resolver.url
  );
  anyhow::ensure!(
    config.resolver.timeout_seconds > 0,
    "resolver.timeout_seconds must be positive"
  );
  anyhow::ensure!(
    normalize_wallet_address(&config.resolver.gas_token_contract).is_some(),
    "resolver.gas_token_contract is not a 0x-prefixed hex address: {}",
    config.resolver.gas_token_contract
  );
  anyhow::ensure!(
    !config.resolver.transfer_method.is_empty(),
    "resolver.transfer_method must not be empty"
  );
  for contract in &config.resolver.allowed_contracts {
    anyhow::ensure!(
      normalize_wallet_address(contract).is_some(),
      "resolver.allowed_contracts entry is not a 0x-prefixed hex address: {}",
      contract
    );
  }

  anyhow::ensure!(
    !config.metrics.bind_address.is_empty(),
    "metrics.bind_address must not be empty"
  );

  Ok(())
}
