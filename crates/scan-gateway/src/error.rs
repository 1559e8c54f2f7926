//! Error types for the scan gateway codec.
//!
//! These never cross the client boundary: [`ScanClient`](crate::ScanClient)
//! folds every one of them into an `ERROR` scan result.

use std::path::PathBuf;

/// Errors produced by the scan gateway codec and client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan agent timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("connection closed by peer")]
    Closed,

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("expected {expected}, got {got:?}")]
    UnexpectedMessage { expected: &'static str, got: String },

    #[error("declared {declared} bytes but sent {sent}")]
    SizeMismatch { declared: u64, sent: u64 },

    #[error("scan result exceeds {0} bytes")]
    ResultTooLarge(usize),

    #[error("invalid scan result: {0}")]
    InvalidResult(#[from] serde_json::Error),
}
