//! Error types for the control session.

use guardftp_protocol::Reply;

/// Errors produced by the control session.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("control connection timed out")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("not logged in")]
    NotAuthenticated,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed reply: {0:?}")]
    Malformed(String),

    #[error("login failed: {0}")]
    AuthenticationFailed(Reply),

    #[error("{0}")]
    Rejected(Reply),
}

impl ControlError {
    /// True for failures of the underlying connection rather than of the
    /// command itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout | Self::NotConnected)
    }

    /// The server reply carried by the error, if any.
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::AuthenticationFailed(reply) | Self::Rejected(reply) => Some(reply),
            _ => None,
        }
    }
}
