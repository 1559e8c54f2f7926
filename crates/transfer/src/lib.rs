//! Scan-gated file transfers for guardftp.
//!
//! [`TransferOrchestrator`] drives uploads and downloads over an
//! authenticated [`ControlSession`](guardftp_control::ControlSession).
//! Every upload is submitted to a [`ScanGateway`](guardftp_scan_gateway::ScanGateway)
//! first; an `INFECTED` verdict stops the upload before any data channel
//! is negotiated, and an `ERROR` verdict needs an explicit yes from the
//! [`Confirm`] seam.

pub mod batch;
pub mod confirm;
pub mod error;
pub mod orchestrator;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::{expand_local_patterns, has_glob_meta, match_remote_names};
pub use confirm::{AlwaysDecline, AlwaysProceed, Confirm};
pub use error::TransferError;
pub use orchestrator::TransferOrchestrator;
pub use types::{BatchItem, ItemOutcome, TransferEvent, TransferOptions, UploadOutcome};
pub use validation::local_name_for;
