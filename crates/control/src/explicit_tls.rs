//! `AUTH TLS` compatibility shim.
//!
//! Some servers refuse `USER` until the client has sent `AUTH TLS`. This
//! shim sends the command and, if the server accepts it, carries on over
//! the same cleartext socket. No TLS handshake is ever performed: the
//! control and data channels stay unencrypted whatever the reply says.
//! It exists only so the client can log in to that class of server.

use tracing::{debug, warn};

use guardftp_protocol::{Command, Reply};

use crate::client::ControlSession;
use crate::error::ControlError;

/// What the server said to `AUTH TLS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShimOutcome {
    /// Positive reply. The client pretends the negotiation happened.
    Claimed(Reply),
    /// Well-formed negative reply; the session continues in cleartext.
    Declined(Reply),
    /// The server answered with something that is not a reply.
    Unsupported,
}

/// Sends `AUTH TLS` and classifies the answer.
///
/// Transport failures propagate; anything the server says does not.
pub(crate) async fn negotiate(session: &mut ControlSession) -> Result<ShimOutcome, ControlError> {
    match session.execute(&Command::AuthTls).await {
        Ok(reply) if reply.is_positive() => {
            warn!(
                %reply,
                "server accepted AUTH TLS; continuing WITHOUT encryption (compatibility shim)"
            );
            Ok(ShimOutcome::Claimed(reply))
        }
        Ok(reply) => {
            debug!(%reply, "AUTH TLS declined, continuing in cleartext");
            Ok(ShimOutcome::Declined(reply))
        }
        Err(ControlError::Malformed(raw)) => {
            debug!(raw, "AUTH TLS not understood, continuing in cleartext");
            Ok(ShimOutcome::Unsupported)
        }
        Err(e) => Err(e),
    }
}
