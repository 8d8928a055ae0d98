//! HTTP Broadcaster - Resolver Implementation over REST
//!
//! Posts signed transfer requests to the resolver service that fronts
//! the actual on-chain broadcast. Requests are signed with HMAC-SHA256
//! over `timestamp + method + path + body`; the secret never travels in
//! a header, only the computed signature.
//!
//! Response mapping is deliberately pessimistic: anything short of a 2xx
//! with a parsable reference is a failure, and an elapsed deadline is
//! `Timeout` (outcome unknown), never success.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::ResolverConfig;
use crate::domain::account::normalize_wallet_address;
use crate::domain::transaction::GasTransaction;
use crate::ports::resolver::{Resolver, ResolverError, ResolverRef};

use super::allowlist::BroadcastAllowlist;

const TRANSFER_PATH: &str = "/v1/transfers";
const HEALTH_PATH: &str = "/v1/health";

/// Transfer request body sent to the resolver.
#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    transaction_id: String,
    to_address: &'a str,
    amount: String,
    contract: &'a str,
    method: &'a str,
}

/// Successful resolver response.
#[derive(Debug, Deserialize)]
struct TransferResponse {
    /// On-chain reference (transaction hash) for the transfer.
    reference: String,
}

/// `Resolver` implementation over the resolver REST service.
pub struct HttpBroadcaster {
    client: reqwest::Client,
    base_url: String,
    signing_key: String,
    gas_token_contract: String,
    transfer_method: String,
    allowlist: BroadcastAllowlist,
}

impl HttpBroadcaster {
    /// Build from the resolver config section.
    ///
    /// The gas token contract and transfer method are always part of the
    /// allowlist; configured extras widen it.
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Self> {
        let gas_token_contract = normalize_wallet_address(&config.gas_token_contract)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "gas token contract is not a 0x-prefixed hex address: {}",
                    config.gas_token_contract
                )
            })?;

        let mut contracts = config.allowed_contracts.clone();
        contracts.push(gas_token_contract.clone());
        let mut methods = config.allowed_methods.clone();
        methods.push(config.transfer_method.clone());
        let allowlist = BroadcastAllowlist::new(contracts, methods);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            signing_key: config.signing_key.clone(),
            gas_token_contract,
            transfer_method: config.transfer_method.clone(),
            allowlist,
        })
    }

    /// HMAC-SHA256 over `timestamp + method + path + body`, base64.
    fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let message = format!("{timestamp}{method}{path}{body}");
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), self.signing_key.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac)
    }

    fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string()
    }
}

#[async_trait]
impl Resolver for HttpBroadcaster {
    #[instrument(skip(self, tx), fields(transaction_id = %tx.id))]
    async fn execute(&self, tx: &GasTransaction) -> Result<ResolverRef, ResolverError> {
        if !self
            .allowlist
            .is_allowed(&self.gas_token_contract, &self.transfer_method)
        {
            return Err(ResolverError::Rejected(format!(
                "contract {} method {} not allowlisted",
                self.gas_token_contract, self.transfer_method
            )));
        }

        let request = TransferRequest {
            transaction_id: tx.id.to_string(),
            to_address: &tx.to_address,
            amount: tx.amount.to_string(),
            contract: &self.gas_token_contract,
            method: &self.transfer_method,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| ResolverError::Transport(format!("encode transfer request: {e}")))?;

        let timestamp = Self::timestamp();
        let signature = self.sign(&timestamp, "POST", TRANSFER_PATH, &body);

        let response = self
            .client
            .post(format!("{}{TRANSFER_PATH}", self.base_url))
            .header("content-type", "application/json")
            .header("x-gasbank-timestamp", &timestamp)
            .header("x-gasbank-signature", &signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolverError::Timeout
                } else {
                    ResolverError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let parsed: TransferResponse = response
                .json()
                .await
                .map_err(|e| ResolverError::Transport(format!("decode transfer response: {e}")))?;
            debug!(reference = %parsed.reference, "transfer broadcast confirmed");
            return Ok(parsed.reference);
        }

        let detail = response.text().await.unwrap_or_default();
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(ResolverError::Timeout);
        }
        if status.is_client_error() {
            warn!(status = %status, detail = %detail, "resolver refused transfer");
            return Err(ResolverError::Rejected(format!("{status}: {detail}")));
        }
        Err(ResolverError::Transport(format!("{status}: {detail}")))
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .get(format!("{}{HEALTH_PATH}", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
