use alloy_primitives::Address;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// One chain endpoint to scan. Loaded once at startup and immutable for the
/// rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub chunk_size: u64,
    pub enabled: bool,
    #[serde(default)]
    pub explorer: Option<String>,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("network has an empty name");
        }
        if !self.rpc_url.to_lowercase().starts_with("http") {
            bail!(
                "network '{}' has an unsupported RPC URL scheme: {}",
                self.name,
                self.rpc_url
            );
        }
        if self.chunk_size == 0 {
            bail!("network '{}' must have a chunkSize of at least 1", self.name);
        }
        Ok(())
    }
}

/// Reads the network list, validating every entry up front so a bad config
/// fails at startup instead of deep inside a scan loop.
pub fn load_networks(path: &Path) -> Result<Vec<NetworkConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read network list {}", path.display()))?;
    let networks: Vec<NetworkConfig> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse network list {}", path.display()))?;
    for network in &networks {
        network.validate()?;
    }
    Ok(networks)
}

/// Reads the account address list. Addresses are checked for well-formedness
/// and normalized to lowercase, which is also how they appear in checkpoint
/// and snapshot file names.
pub fn load_addresses(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read address list {}", path.display()))?;
    let addresses: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse address list {}", path.display()))?;
    addresses
        .into_iter()
        .map(|addr| {
            Address::from_str(&addr)
                .with_context(|| format!("invalid account address: {addr}"))?;
            Ok(addr.to_lowercase())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_camel_case_network_list() {
        let file = write_temp(
            r#"[{"name": "mainnet", "rpcUrl": "https://rpc.example", "chunkSize": 5000, "enabled": true, "explorer": "https://etherscan.io"}]"#,
        );
        let networks = load_networks(file.path()).unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].name, "mainnet");
        assert_eq!(networks[0].chunk_size, 5000);
        assert!(networks[0].enabled);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let file = write_temp(
            r#"[{"name": "mainnet", "rpcUrl": "https://rpc.example", "chunkSize": 0, "enabled": true}]"#,
        );
        assert!(load_networks(file.path()).is_err());
    }

    #[test]
    fn rejects_unknown_url_scheme() {
        let file = write_temp(
            r#"[{"name": "mainnet", "rpcUrl": "ftp://rpc.example", "chunkSize": 100, "enabled": true}]"#,
        );
        assert!(load_networks(file.path()).is_err());
    }

    #[test]
    fn addresses_are_validated_and_lowercased() {
        let file = write_temp(r#"["0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B"]"#);
        let addresses = load_addresses(file.path()).unwrap();
        assert_eq!(
            addresses,
            vec!["0xab5801a7d398351b8be11c439e05c5b3259aec9b".to_string()]
        );
    }

    #[test]
    fn rejects_malformed_address() {
        let file = write_temp(r#"["not-an-address"]"#);
        assert!(load_addresses(file.path()).is_err());
    }
}
