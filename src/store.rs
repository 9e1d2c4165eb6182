use crate::balance::BalanceSnapshot;
use crate::error::ScanError;
use crate::ledger::EventRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Discovery metadata for one token contract: which interface matched and
/// the raw events that matched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredContract {
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

/// Resumable progress for one (network, address) pair. `last_block` is the
/// inclusive upper bound of the range already processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "lastBlock")]
    pub last_block: u64,
    pub contracts: BTreeMap<String, DiscoveredContract>,
}

/// File-backed persistence for checkpoints and balance snapshots. One file
/// per (network, address) pair, named `<network>-<address>.json`; each pair
/// has exactly one writer at a time, so atomic replacement is the only
/// locking needed.
#[derive(Debug, Clone)]
pub struct Store {
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

impl Store {
    pub fn new(cache_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Store {
            cache_dir: cache_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    fn checkpoint_path(&self, network: &str, address: &str) -> PathBuf {
        self.cache_dir.join(format!("{network}-{address}.json"))
    }

    fn snapshot_path(&self, network: &str, address: &str) -> PathBuf {
        self.data_dir.join(format!("{network}-{address}.json"))
    }

    /// Loads the checkpoint for a pair, or an empty one if none was saved
    /// yet. A file that exists but fails to parse is a `CorruptCheckpoint`:
    /// silently treating it as empty would re-scan from block 0.
    pub fn load_checkpoint(&self, network: &str, address: &str) -> Result<Checkpoint, ScanError> {
        let path = self.checkpoint_path(network, address);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Checkpoint::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|source| ScanError::CorruptCheckpoint { path, source })
    }

    /// Persists scan progress. The write goes to a temp file first and is
    /// renamed into place, so a crash mid-write never leaves a partial
    /// checkpoint visible to the next `load_checkpoint`.
    pub fn save_checkpoint(
        &self,
        network: &str,
        address: &str,
        end_block: u64,
        contracts: &BTreeMap<String, DiscoveredContract>,
    ) -> Result<(), ScanError> {
        let checkpoint = Checkpoint {
            last_block: end_block,
            contracts: contracts.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint)
            .map_err(|e| ScanError::Storage(std::io::Error::other(e)))?;
        write_atomic(&self.checkpoint_path(network, address), &bytes)?;
        Ok(())
    }

    /// Persists a balance snapshot, unless it is empty. Keeping the previous
    /// run's file when nothing was found preserves diffing continuity.
    pub fn save_snapshot(
        &self,
        network: &str,
        address: &str,
        snapshot: &BalanceSnapshot,
    ) -> Result<(), ScanError> {
        if snapshot.is_empty() {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| ScanError::Storage(std::io::Error::other(e)))?;
        write_atomic(&self.snapshot_path(network, address), &bytes)?;
        Ok(())
    }

    /// The previous run's snapshot for a pair, if any. An unparseable file is
    /// treated as absent (everything diffs as new) with a warning; unlike a
    /// checkpoint it carries no progress that could be double-counted.
    pub fn load_snapshot(
        &self,
        network: &str,
        address: &str,
    ) -> Result<Option<BalanceSnapshot>, ScanError> {
        let path = self.snapshot_path(network, address);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Ignoring unparseable snapshot {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Reconstructs all persisted snapshots under `dir`, keyed by network and
    /// then address. Files not matching `<network>-<address>.json` are
    /// ignored.
    pub fn load_all_snapshots(
        dir: &Path,
    ) -> Result<BTreeMap<String, BTreeMap<String, Vec<BalanceSnapshot>>>, ScanError> {
        let mut out: BTreeMap<String, BTreeMap<String, Vec<BalanceSnapshot>>> = BTreeMap::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = file_name.strip_suffix(".json") else {
                continue;
            };
            // Network names may contain dashes; addresses never do.
            let Some((network, address)) = stem.rsplit_once('-') else {
                continue;
            };
            if !address.starts_with("0x") {
                continue;
            }

            let snapshot: BalanceSnapshot = match serde_json::from_slice(&fs::read(&path)?) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Ignoring unparseable snapshot {}: {}", path.display(), e);
                    continue;
                }
            };

            out.entry(network.to_string())
                .or_default()
                .entry(address.to_string())
                .or_default()
                .push(snapshot);
        }

        Ok(out)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
