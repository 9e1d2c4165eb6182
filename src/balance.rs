use crate::ledger::LedgerClient;
use crate::store::DiscoveredContract;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

/// The single interface the engine understands; multi-ABI support lives in
/// the orchestration layer above, not here.
pub const ERC20_TOKEN_TYPE: &str = "erc20";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    New,
    Changed,
    Unchanged,
}

/// One token's balance for one address, as persisted in a snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub status: TokenStatus,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub balance: String,
}

/// All balances for one (network, address) pair at the end of a run, keyed
/// by token contract address.
pub type BalanceSnapshot = BTreeMap<String, BalanceRecord>;

/// Classifies a freshly fetched balance against the previous run's snapshot.
/// No previous snapshot means every token is new.
pub fn diff_status(
    token: &str,
    balance: &str,
    previous: Option<&BalanceSnapshot>,
) -> TokenStatus {
    match previous.and_then(|snapshot| snapshot.get(token)) {
        None => TokenStatus::New,
        Some(record) if record.balance != balance => TokenStatus::Changed,
        Some(_) => TokenStatus::Unchanged,
    }
}

/// Queries the balance (and, where available, the display name) of every
/// discovered contract. Contract calls are independent, so a failing token is
/// logged and skipped rather than aborting the batch.
pub async fn fetch_balances<C: LedgerClient + ?Sized>(
    client: &C,
    network_name: &str,
    holder: Address,
    contracts: &BTreeMap<String, DiscoveredContract>,
    previous: Option<&BalanceSnapshot>,
) -> BalanceSnapshot {
    let mut snapshot = BalanceSnapshot::new();

    for (token_addr, discovered) in contracts {
        let token = match Address::from_str(token_addr) {
            Ok(token) => token,
            Err(e) => {
                warn!(
                    "Skipping malformed token address {} on {}: {}",
                    token_addr, network_name, e
                );
                continue;
            }
        };

        let balance = match client.balance_of(token, holder).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(
                    "Skipping token {} on {}: balance query failed: {}",
                    token_addr, network_name, e
                );
                continue;
            }
        };

        let name = match client.token_name(token).await {
            Ok(name) => Some(name),
            Err(e) => {
                warn!("No name for token {} on {}: {}", token_addr, network_name, e);
                None
            }
        };

        let status = diff_status(token_addr, &balance, previous);
        info!(
            "Balance for {} on {} is {} ({:?})",
            token_addr, network_name, balance, status
        );

        snapshot.insert(
            token_addr.clone(),
            BalanceRecord {
                status,
                token_type: discovered.token_type.clone(),
                name,
                balance,
            },
        );
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::ledger::EventRecord;
    use async_trait::async_trait;

    fn record(balance: &str) -> BalanceRecord {
        BalanceRecord {
            status: TokenStatus::Unchanged,
            token_type: ERC20_TOKEN_TYPE.to_string(),
            name: None,
            balance: balance.to_string(),
        }
    }

    #[test]
    fn token_missing_from_previous_snapshot_is_new() {
        let mut previous = BalanceSnapshot::new();
        previous.insert("0xaa".to_string(), record("100"));

        assert_eq!(diff_status("0xaa", "100", Some(&previous)), TokenStatus::Unchanged);
        assert_eq!(diff_status("0xbb", "50", Some(&previous)), TokenStatus::New);
    }

    #[test]
    fn differing_balance_string_is_changed() {
        let mut previous = BalanceSnapshot::new();
        previous.insert("0xaa".to_string(), record("100"));

        assert_eq!(diff_status("0xaa", "200", Some(&previous)), TokenStatus::Changed);
    }

    #[test]
    fn no_previous_snapshot_means_everything_is_new() {
        assert_eq!(diff_status("0xaa", "100", None), TokenStatus::New);
    }

    struct FakeClient {
        failing_token: Address,
    }

    #[async_trait]
    impl LedgerClient for FakeClient {
        async fn latest_block_number(&self) -> Result<u64, ScanError> {
            Ok(0)
        }

        async fn get_logs(
            &self,
            _from_block: u64,
            _to_block: u64,
            _recipient: Address,
        ) -> Result<Vec<EventRecord>, ScanError> {
            Ok(Vec::new())
        }

        async fn balance_of(&self, token: Address, _holder: Address) -> Result<String, ScanError> {
            if token == self.failing_token {
                Err(ScanError::ContractCall("execution reverted".to_string()))
            } else {
                Ok("42".to_string())
            }
        }

        async fn token_name(&self, _token: Address) -> Result<String, ScanError> {
            Err(ScanError::ContractCall("no name method".to_string()))
        }
    }

    #[tokio::test]
    async fn unreadable_token_is_skipped_not_fatal() {
        let good = "0x1111111111111111111111111111111111111111";
        let bad = "0x2222222222222222222222222222222222222222";
        let client = FakeClient {
            failing_token: bad.parse().unwrap(),
        };

        let mut contracts = BTreeMap::new();
        for addr in [good, bad] {
            contracts.insert(
                addr.to_string(),
                DiscoveredContract {
                    token_type: ERC20_TOKEN_TYPE.to_string(),
                    events: Vec::new(),
                },
            );
        }

        let holder = "0x3333333333333333333333333333333333333333".parse().unwrap();
        let snapshot = fetch_balances(&client, "testnet", holder, &contracts, None).await;

        assert_eq!(snapshot.len(), 1);
        let entry = &snapshot[good];
        assert_eq!(entry.balance, "42");
        assert_eq!(entry.status, TokenStatus::New);
        assert_eq!(entry.name, None);
    }
}
