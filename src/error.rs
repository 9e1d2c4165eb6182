use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for a scan run. Transport-level problems are retryable,
/// everything else is surfaced as-is.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("contract call failed: {0}")]
    ContractCall(String),

    #[error("corrupt checkpoint at {path}: {source}")]
    CorruptCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("scan failed on {network} for {address}: {source}")]
    ScanFailure {
        network: String,
        address: String,
        #[source]
        source: Box<ScanError>,
    },
}

impl ScanError {
    /// Whether a chunk query hitting this error should be retried with a
    /// smaller block range. Rate limiting is retried the same way as any
    /// other transport fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::Transport(_) | ScanError::RateLimited(_))
    }
}
