//! Chain Adapters - Resolver-fronted Broadcast Layer
//!
//! Implements the `Resolver` port against the HTTP resolver service that
//! performs the actual on-chain GAS transfer. Outgoing transfers pass a
//! contract/method allowlist before they leave the process.

pub mod allowlist;
pub mod broadcaster;

pub use allowlist::BroadcastAllowlist;
pub use broadcaster::HttpBroadcaster;
