use std::path::PathBuf;

use guardftp_control::ControlError;
use guardftp_data_channel::DataChannelError;
use guardftp_protocol::Reply;

/// Errors from transfer operations.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("data channel: {0}")]
    DataChannel(DataChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("server refused transfer: {}", .0.raw())]
    Rejected(Reply),

    #[error("transfer interrupted after {bytes} bytes: {source}")]
    PartialTransfer {
        bytes: u64,
        #[source]
        source: DataChannelError,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl From<DataChannelError> for TransferError {
    fn from(e: DataChannelError) -> Self {
        match e {
            DataChannelError::Cancelled => Self::Cancelled,
            DataChannelError::Control(c) => Self::Control(c),
            other => Self::DataChannel(other),
        }
    }
}

impl From<globset::Error> for TransferError {
    fn from(e: globset::Error) -> Self {
        Self::InvalidPattern(e.to_string())
    }
}
