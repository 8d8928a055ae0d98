//! Broadcast Allowlist - Contract and Method Gate
//!
//! Every outgoing transfer is checked against a closed set of contract
//! addresses and method names before it leaves the process. A typo in
//! config fails loudly here instead of broadcasting to the wrong
//! contract.

use std::collections::HashSet;

use crate::domain::account::normalize_wallet_address;

/// Closed set of contracts and methods the broadcaster may touch.
#[derive(Debug, Clone)]
pub struct BroadcastAllowlist {
    contracts: HashSet<String>,
    methods: HashSet<String>,
}

impl BroadcastAllowlist {
    /// Build from configured entries. Contract addresses are stored
    /// normalized (lowercase hex); method names are trimmed verbatim.
    pub fn new<I, J>(contracts: I, methods: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            contracts: contracts
                .into_iter()
                .filter_map(|c| normalize_wallet_address(&c))
                .collect(),
            methods: methods
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Whether a contract/method pair may be broadcast.
    pub fn is_allowed(&self, contract: &str, method: &str) -> bool {
        let Some(contract) = normalize_wallet_address(contract) else {
            return false;
        };
        self.contracts.contains(&contract) && self.methods.contains(method.trim())
    }
}
