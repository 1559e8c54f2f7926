//! Error types for the data channel.

use guardftp_control::ControlError;
use guardftp_protocol::{AddressError, Reply};

/// Errors produced while negotiating or using a data channel.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("data connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("cannot parse passive reply: {0}")]
    PassiveParse(#[from] AddressError),

    #[error("active mode needs an IPv4 control connection, local address is {0}")]
    ActiveAddress(std::net::SocketAddr),

    #[error("data channel refused: {0}")]
    Rejected(Reply),
}
