use crate::balance::ERC20_TOKEN_TYPE;
use crate::config::NetworkConfig;
use crate::error::ScanError;
use crate::ledger::LedgerClient;
use crate::retry::RetryPolicy;
use crate::store::{DiscoveredContract, Store};
use alloy_primitives::Address;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

// Latency band the adaptive sizing steers each log query into.
const SHRINK_ABOVE: Duration = Duration::from_millis(6000);
const GROW_BELOW: Duration = Duration::from_millis(3000);

// Chunk size never exceeds this multiple of the configured default.
const MAX_CHUNK_FACTOR: u64 = 10;

/// Walks a network's block history for one account, discovering token
/// contracts that sent it transfer events. Progress is checkpointed after
/// every chunk, so at most one chunk of work is lost on interruption.
pub struct BlockRangeScanner<'a, C: LedgerClient + ?Sized> {
    client: &'a C,
    store: &'a Store,
    network: &'a NetworkConfig,
    address: &'a str,
    holder: Address,
    retry: RetryPolicy,
}

impl<'a, C: LedgerClient + ?Sized> BlockRangeScanner<'a, C> {
    pub fn new(
        client: &'a C,
        store: &'a Store,
        network: &'a NetworkConfig,
        address: &'a str,
        holder: Address,
        retry: RetryPolicy,
    ) -> Self {
        BlockRangeScanner {
            client,
            store,
            network,
            address,
            holder,
            retry,
        }
    }

    /// Scans from the checkpoint up to the chain head resolved once at entry;
    /// blocks produced mid-scan are picked up on the next invocation. Returns
    /// the full discovered-contract set, including prior runs' finds.
    pub async fn run(&self) -> Result<BTreeMap<String, DiscoveredContract>, ScanError> {
        let mut checkpoint = self
            .store
            .load_checkpoint(&self.network.name, self.address)
            .map_err(|e| self.scan_failure(e))?;

        let end_block = self
            .client
            .latest_block_number()
            .await
            .map_err(|e| self.scan_failure(e))?;

        let default_chunk = self.network.chunk_size.max(1);
        let max_chunk = default_chunk.saturating_mul(MAX_CHUNK_FACTOR);
        let step = (default_chunk / 10).max(1);
        let mut chunk_size = default_chunk;

        // The checkpoint records the last block already processed, so resume
        // one past it. A fresh checkpoint starts at block 0.
        let mut cursor = checkpoint.last_block;
        if cursor > 0 {
            cursor += 1;
        }

        let mut attempts_left = self.retry.max_attempts();
        let mut delays = self.retry.delays();

        info!(
            "Scanning {} for {} from block {} to {}",
            self.network.name, self.address, cursor, end_block
        );

        while cursor < end_block {
            let to_block = cursor.saturating_add(chunk_size - 1).min(end_block);
            let percent = 100.0 / end_block as f64 * cursor as f64;
            info!(
                "Looking for tokens on {} for {} {}/{} @ {} ({:.2}%)",
                self.network.name, self.address, cursor, end_block, chunk_size, percent
            );

            let started = Instant::now();
            match self.client.get_logs(cursor, to_block, self.holder).await {
                Ok(events) => {
                    chunk_size =
                        next_chunk_size(chunk_size, started.elapsed(), step, max_chunk);

                    for event in events {
                        let token = event.address.to_lowercase();
                        let entry = checkpoint
                            .contracts
                            .entry(token.clone())
                            .or_insert_with(|| {
                                info!(
                                    "Found token {} on {} for {}",
                                    token, self.network.name, self.address
                                );
                                DiscoveredContract {
                                    token_type: ERC20_TOKEN_TYPE.to_string(),
                                    events: Vec::new(),
                                }
                            });
                        entry.events.push(event);
                    }

                    checkpoint.last_block = to_block;
                    self.store
                        .save_checkpoint(
                            &self.network.name,
                            self.address,
                            to_block,
                            &checkpoint.contracts,
                        )
                        .map_err(|e| self.scan_failure(e))?;

                    cursor = to_block + 1;
                    attempts_left = self.retry.max_attempts();
                    delays = self.retry.delays();
                }
                Err(e) if e.is_retryable() => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        return Err(self.scan_failure(e));
                    }
                    chunk_size = (chunk_size / 2).max(1);
                    warn!(
                        "Log query for blocks {}-{} on {} failed ({}), retrying at chunk size {} ({} attempts left)",
                        cursor, to_block, self.network.name, e, chunk_size, attempts_left
                    );
                    if let Some(delay) = delays.next() {
                        sleep(delay).await;
                    }
                }
                Err(e) => return Err(self.scan_failure(e)),
            }
        }

        Ok(checkpoint.contracts)
    }

    fn scan_failure(&self, source: ScanError) -> ScanError {
        ScanError::ScanFailure {
            network: self.network.name.clone(),
            address: self.address.to_string(),
            source: Box::new(source),
        }
    }
}

/// One adaptive sizing step: shrink when a query ran long, grow when it ran
/// short, leave alone inside the band. Bounds are [1, max_chunk].
fn next_chunk_size(current: u64, elapsed: Duration, step: u64, max_chunk: u64) -> u64 {
    if elapsed > SHRINK_ABOVE {
        current.saturating_sub(step).max(1)
    } else if elapsed < GROW_BELOW {
        current.saturating_add(step).min(max_chunk)
    } else {
        current
    }
}
