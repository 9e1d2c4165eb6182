use crate::balance::{self, BalanceSnapshot};
use crate::config::NetworkConfig;
use crate::error::ScanError;
use crate::ledger::LedgerClient;
use crate::retry::RetryPolicy;
use crate::scanner::BlockRangeScanner;
use crate::store::Store;
use alloy_primitives::Address;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Opens a ledger connection for a network. The returned client is owned by
/// the network's scan task and dropped when its work finishes, including on
/// the failure path.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, network: &NetworkConfig) -> Result<Box<dyn LedgerClient>, ScanError>;
}

/// One (network, address) unit that failed fatally. Sibling units keep their
/// results regardless.
#[derive(Debug)]
pub struct UnitFailure {
    pub network: String,
    pub address: String,
    pub error: ScanError,
}

/// Merged outcome of a run: balances keyed by network then address, plus
/// whatever units failed along the way.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub balances: BTreeMap<String, BTreeMap<String, BalanceSnapshot>>,
    pub failures: Vec<UnitFailure>,
}

/// Runs the full scan: one concurrent task per enabled network, addresses
/// strictly sequential within a network. A failing unit never suppresses its
/// siblings' results.
pub async fn run(
    networks: &[NetworkConfig],
    addresses: &[String],
    store: Arc<Store>,
    connector: Arc<dyn Connect>,
    retry: RetryPolicy,
) -> ScanReport {
    let mut handles = Vec::new();
    for network in networks.iter().filter(|n| n.enabled).cloned() {
        let addresses = addresses.to_vec();
        let store = store.clone();
        let connector = connector.clone();
        let retry = retry.clone();
        handles.push(tokio::spawn(async move {
            scan_network(network, addresses, store, connector, retry).await
        }));
    }

    let mut report = ScanReport::default();
    for outcome in join_all(handles).await {
        match outcome {
            Ok((name, balances, failures)) => {
                report.balances.insert(name, balances);
                report.failures.extend(failures);
            }
            Err(e) => error!("Network task panicked: {}", e),
        }
    }
    report
}

async fn scan_network(
    network: NetworkConfig,
    addresses: Vec<String>,
    store: Arc<Store>,
    connector: Arc<dyn Connect>,
    retry: RetryPolicy,
) -> (String, BTreeMap<String, BalanceSnapshot>, Vec<UnitFailure>) {
    let mut balances = BTreeMap::new();
    let mut failures = Vec::new();

    let client = match connector.connect(&network).await {
        Ok(client) => client,
        Err(e) => {
            error!("Could not connect to {}: {}", network.name, e);
            let message = e.to_string();
            for address in addresses {
                failures.push(UnitFailure {
                    network: network.name.clone(),
                    address,
                    error: ScanError::Transport(message.clone()),
                });
            }
            return (network.name, balances, failures);
        }
    };

    for address in addresses {
        match scan_address(&network, &address, &*client, &store, retry.clone()).await {
            Ok(snapshot) => {
                balances.insert(address, snapshot);
            }
            Err(e) => {
                error!("Scan failed on {} for {}: {}", network.name, address, e);
                failures.push(UnitFailure {
                    network: network.name.clone(),
                    address,
                    error: e,
                });
            }
        }
    }

    info!("Finished network {}", network.name);
    (network.name, balances, failures)
}

/// Scanner, then fetcher, then differ, then snapshot save, for one unit of
/// work. Contract discovery fully precedes balance fetching.
async fn scan_address(
    network: &NetworkConfig,
    address: &str,
    client: &dyn LedgerClient,
    store: &Store,
    retry: RetryPolicy,
) -> Result<BalanceSnapshot, ScanError> {
    let holder = Address::from_str(address)
        .map_err(|e| ScanError::ContractCall(format!("invalid account address {address}: {e}")))?;

    let scanner = BlockRangeScanner::new(client, store, network, address, holder, retry);
    let contracts = scanner.run().await?;

    let previous = store.load_snapshot(&network.name, address)?;
    let snapshot =
        balance::fetch_balances(client, &network.name, holder, &contracts, previous.as_ref())
            .await;

    store.save_snapshot(&network.name, address, &snapshot)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::TokenStatus;
    use crate::ledger::EventRecord;
    use tempfile::TempDir;

    const ADDR_X: &str = "0x1000000000000000000000000000000000000001";
    const ADDR_Y: &str = "0x2000000000000000000000000000000000000002";
    const TOKEN: &str = "0x9000000000000000000000000000000000000009";

    /// Fails every log query for one configured recipient; serves one token
    /// discovery to everyone else.
    struct PartialFailureLedger {
        failing_recipient: Address,
    }

    #[async_trait]
    impl LedgerClient for PartialFailureLedger {
        async fn latest_block_number(&self) -> Result<u64, ScanError> {
            Ok(10)
        }

        async fn get_logs(
            &self,
            from_block: u64,
            _to_block: u64,
            recipient: Address,
        ) -> Result<Vec<EventRecord>, ScanError> {
            if recipient == self.failing_recipient {
                return Err(ScanError::Transport("connection refused".to_string()));
            }
            Ok(vec![EventRecord {
                address: TOKEN.to_string(),
                topics: Vec::new(),
                data: "0x".to_string(),
                block_number: from_block,
            }])
        }

        async fn balance_of(&self, _token: Address, _holder: Address) -> Result<String, ScanError> {
            Ok("7".to_string())
        }

        async fn token_name(&self, _token: Address) -> Result<String, ScanError> {
            Ok("Mock Token".to_string())
        }
    }

    struct PartialFailureConnector {
        fail_on_network: Option<String>,
    }

    #[async_trait]
    impl Connect for PartialFailureConnector {
        async fn connect(
            &self,
            network: &NetworkConfig,
        ) -> Result<Box<dyn LedgerClient>, ScanError> {
            Ok(Box::new(PartialFailureLedger {
                failing_recipient: match &self.fail_on_network {
                    Some(name) if *name == network.name => ADDR_X.parse().unwrap(),
                    _ => Address::ZERO,
                },
            }))
        }
    }

    fn network(name: &str) -> NetworkConfig {
        NetworkConfig {
            name: name.to_string(),
            rpc_url: "https://rpc.example".to_string(),
            chunk_size: 100,
            enabled: true,
            explorer: None,
        }
    }

    #[tokio::test]
    async fn failing_unit_does_not_suppress_siblings() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(dir.path().join("cache"), dir.path().join("data")));
        let networks = vec![network("netn"), network("netm")];
        let addresses = vec![ADDR_X.to_string(), ADDR_Y.to_string()];
        let connector = Arc::new(PartialFailureConnector {
            fail_on_network: Some("netn".to_string()),
        });

        let report = run(
            &networks,
            &addresses,
            store.clone(),
            connector,
            RetryPolicy::new(2).with_base_delay_ms(0),
        )
        .await;

        // Address X failed on netn only; everything else completed.
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].network, "netn");
        assert_eq!(report.failures[0].address, ADDR_X);

        assert!(report.balances["netn"].contains_key(ADDR_Y));
        assert!(!report.balances["netn"].contains_key(ADDR_X));
        assert!(report.balances["netm"].contains_key(ADDR_X));
        assert!(report.balances["netm"].contains_key(ADDR_Y));

        // The surviving units were persisted too.
        assert!(store.load_snapshot("netn", ADDR_Y).unwrap().is_some());
        assert!(store.load_snapshot("netm", ADDR_X).unwrap().is_some());
    }

    #[tokio::test]
    async fn disabled_networks_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(dir.path().join("cache"), dir.path().join("data")));
        let mut disabled = network("offnet");
        disabled.enabled = false;

        let report = run(
            &[disabled],
            &[ADDR_X.to_string()],
            store,
            Arc::new(PartialFailureConnector {
                fail_on_network: None,
            }),
            RetryPolicy::default(),
        )
        .await;

        assert!(report.balances.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn second_run_diffs_against_first_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(dir.path().join("cache"), dir.path().join("data")));
        let networks = vec![network("netn")];
        let addresses = vec![ADDR_Y.to_string()];
        let connector = Arc::new(PartialFailureConnector {
            fail_on_network: None,
        });

        let first = run(
            &networks,
            &addresses,
            store.clone(),
            connector.clone(),
            RetryPolicy::default(),
        )
        .await;
        assert_eq!(
            first.balances["netn"][ADDR_Y][TOKEN].status,
            TokenStatus::New
        );

        let second = run(
            &networks,
            &addresses,
            store,
            connector,
            RetryPolicy::default(),
        )
        .await;
        assert_eq!(
            second.balances["netn"][ADDR_Y][TOKEN].status,
            TokenStatus::Unchanged
        );
    }
}
