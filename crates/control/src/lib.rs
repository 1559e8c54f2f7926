//! Control-channel session for guardftp.
//!
//! [`ControlSession`] owns the long-lived control connection to a file
//! server: it connects, logs in, exchanges commands and replies, and tracks
//! the per-connection [`Session`] state. Data channels and transfers are
//! layered on top by the `data-channel` and `transfer` crates.

pub mod client;
pub mod error;
pub mod explicit_tls;
pub mod reader;
pub mod session;

pub use client::ControlSession;
pub use error::ControlError;
pub use explicit_tls::ShimOutcome;
pub use session::{Session, SessionOptions, SessionStatus};
