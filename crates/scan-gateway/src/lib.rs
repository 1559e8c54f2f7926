//! Scan gateway: the short-lived exchange between the transfer client and
//! the scan agent.
//!
//! # Wire format
//!
//! ```text
//! client -> agent: FILENAME:<name>
//! agent -> client: READY
//! client -> agent: SIZE:<decimal byte count>
//! agent -> client: READY
//! client -> agent: <exactly byte-count raw bytes>
//! agent -> client: {"status": "...", "message": "...", "details": "..."} then close
//! ```
//!
//! Text messages carry no terminator; each is a single write of at most
//! [`wire::MAX_MESSAGE`] bytes. See [`wire`] for both directions and
//! [`client`] for the uploader side.

pub mod client;
pub mod error;
pub mod wire;

pub use client::{ScanClient, ScanClientConfig, ScanFuture, ScanGateway};
pub use error::GatewayError;
