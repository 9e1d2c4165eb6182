use crate::config::NetworkConfig;
use crate::error::ScanError;
use crate::events::{Transfer, balanceOfCall, nameCall};
use crate::ledger::{EventRecord, LedgerClient};
use crate::orchestrator::Connect;
use crate::retry::RetryPolicy;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // 2 minutes timeout per request

/// Alloy-backed ledger client for one network endpoint. Head lookups retry
/// transient faults internally; log queries are single-shot because the
/// scanner owns that retry path (it shrinks the block range between
/// attempts, which a transport-level retry cannot do).
pub struct RpcClient {
    provider: AlloyFullProvider,
    url: String,
    retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(rpc_url: &str) -> Result<Self, ScanError> {
        let parsed = rpc_url
            .parse()
            .map_err(|_| ScanError::Transport(format!("invalid RPC URL: {rpc_url}")))?;
        let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed);
        Ok(RpcClient {
            provider,
            url: rpc_url.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call_contract<T: SolCall>(
        &self,
        to: Address,
        call: T,
    ) -> Result<T::Return, ScanError> {
        let data = Bytes::from(call.abi_encode());
        let tx = TransactionRequest::default().to(to).input(data.into());
        let raw = match timeout(REQUEST_TIMEOUT, self.provider.call(tx)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(ScanError::ContractCall(e.to_string())),
            Err(_) => return Err(timeout_error()),
        };
        T::abi_decode_returns(&raw).map_err(|e| ScanError::ContractCall(e.to_string()))
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn latest_block_number(&self) -> Result<u64, ScanError> {
        let provider = &self.provider;
        Retry::spawn(self.retry.delays(), || async move {
            match timeout(REQUEST_TIMEOUT, provider.get_block_number()).await {
                Ok(Ok(block_number)) => Ok(block_number),
                Ok(Err(e)) => Err(classify(&e.to_string())),
                Err(_) => Err(timeout_error()),
            }
        })
        .await
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        recipient: Address,
    ) -> Result<Vec<EventRecord>, ScanError> {
        let filter = Filter::new()
            .event_signature(Transfer::SIGNATURE_HASH)
            .topic2(recipient.into_word())
            .from_block(from_block)
            .to_block(to_block);

        let logs = match timeout(REQUEST_TIMEOUT, self.provider.get_logs(&filter)).await {
            Ok(Ok(logs)) => logs,
            Ok(Err(e)) => return Err(classify(&e.to_string())),
            Err(_) => return Err(timeout_error()),
        };

        Ok(logs.iter().map(to_event_record).collect())
    }

    async fn balance_of(&self, token: Address, holder: Address) -> Result<String, ScanError> {
        let balance = self
            .call_contract(token, balanceOfCall { owner: holder })
            .await?;
        Ok(balance.to_string())
    }

    async fn token_name(&self, token: Address) -> Result<String, ScanError> {
        self.call_contract(token, nameCall {}).await
    }
}

/// Default connector: one fresh HTTP client per network task.
pub struct RpcConnector;

#[async_trait]
impl Connect for RpcConnector {
    async fn connect(&self, network: &NetworkConfig) -> Result<Box<dyn LedgerClient>, ScanError> {
        Ok(Box::new(RpcClient::new(&network.rpc_url)?))
    }
}

fn to_event_record(log: &Log) -> EventRecord {
    EventRecord {
        address: format!("{:#x}", log.address()),
        topics: log.topics().iter().map(|t| format!("{t:#x}")).collect(),
        data: log.data().data.to_string(),
        block_number: log.block_number.unwrap_or_default(),
    }
}

fn timeout_error() -> ScanError {
    ScanError::Transport(format!(
        "request timeout after {} seconds",
        REQUEST_TIMEOUT.as_secs()
    ))
}

fn classify(message: &str) -> ScanError {
    if is_rate_limited(message) {
        ScanError::RateLimited(message.to_string())
    } else {
        ScanError::Transport(message.to_string())
    }
}

fn is_rate_limited(message: &str) -> bool {
    Regex::new(r"(?i)429|rate ?limit|too many requests")
        .map(|re| re.is_match(message))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_responses_are_classified() {
        assert!(matches!(
            classify("HTTP error 429 Too Many Requests"),
            ScanError::RateLimited(_)
        ));
        assert!(matches!(
            classify("daily rate limit exceeded"),
            ScanError::RateLimited(_)
        ));
        assert!(matches!(
            classify("connection refused"),
            ScanError::Transport(_)
        ));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RpcClient::new("not a url").is_err());
    }
}
