use std::path::PathBuf;
use std::time::Duration;

use guardftp_protocol::ScanResult;
use guardftp_protocol::constants::DEFAULT_BUFFER_SIZE;

use crate::TransferError;

/// Transfer tunables.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub buffer_size: usize,
    /// Longest wait for one read on the data socket.
    pub idle_timeout: Duration,
    /// Minimum gap between two `Progress` events for the same file.
    pub progress_interval: Duration,
    /// Ask before each file of a batch transfer.
    pub prompt: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: Duration::from_secs(30),
            progress_interval: Duration::from_millis(500),
            prompt: true,
        }
    }
}

/// What happened to an upload request that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The file was stored. `verdict` is `OK`, or `ERROR` if the operator
    /// chose to continue without a scan.
    Uploaded { bytes: u64, verdict: ScanResult },
    /// The scanner found something. Nothing was sent to the FTP server.
    Blocked(ScanResult),
    /// The scan failed and the operator declined to continue.
    Declined(ScanResult),
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    pub fn verdict(&self) -> &ScanResult {
        match self {
            Self::Uploaded { verdict, .. } => verdict,
            Self::Blocked(v) | Self::Declined(v) => v,
        }
    }
}

/// Events emitted during transfers.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// A file was handed to the scan agent.
    Scanning { path: PathBuf },
    /// The scan agent answered.
    Scanned { path: PathBuf, verdict: ScanResult },
    /// Bytes moved so far. `total` is known for uploads and for downloads
    /// whose `150` reply carries a size.
    Progress {
        name: String,
        bytes: u64,
        total: Option<u64>,
    },
    Completed { name: String, bytes: u64 },
    Failed { name: String, error: String },
}

/// Per-file result of a batch transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Uploaded(UploadOutcome),
    Downloaded { bytes: u64 },
    /// The operator answered no to the per-file prompt.
    Skipped,
}

/// One entry of a batch transfer. Batches never stop at the first
/// failure; each file gets its own result.
#[derive(Debug)]
pub struct BatchItem {
    pub name: String,
    pub result: Result<ItemOutcome, TransferError>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        match &self.result {
            Ok(ItemOutcome::Uploaded(outcome)) => outcome.is_uploaded(),
            Ok(ItemOutcome::Downloaded { .. }) => true,
            Ok(ItemOutcome::Skipped) | Err(_) => false,
        }
    }
}
