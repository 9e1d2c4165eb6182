use crate::error::ScanError;
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A transfer-style event as recorded in a checkpoint: the raw log fields,
/// detached from any provider types so it serializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
}

/// The chain primitives the scan engine consumes. Implemented by the alloy
/// RPC client in production and by scripted fakes in tests.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current chain head.
    async fn latest_block_number(&self) -> Result<u64, ScanError>;

    /// Transfer logs in `[from_block, to_block]` where `recipient` is the
    /// indexed `to` topic. Both bounds are inclusive.
    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        recipient: Address,
    ) -> Result<Vec<EventRecord>, ScanError>;

    /// `balanceOf(holder)` on `token`, returned as a decimal string. The
    /// engine never parses this into a machine integer.
    async fn balance_of(&self, token: Address, holder: Address) -> Result<String, ScanError>;

    /// `name()` on `token`, if the contract exposes it.
    async fn token_name(&self, token: Address) -> Result<String, ScanError>;
}
