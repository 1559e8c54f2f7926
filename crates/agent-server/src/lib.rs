//! Scan agent runtime.
//!
//! Accepts scan-gateway connections, receives each file into a private
//! temp file, hands it to a [`ScanEngine`], and answers with the verdict.
//! At most `max_connections` handlers run at once.
//!
//! - [`server`]: accept loop and admission gate.
//! - [`handler`]: the per-connection state machine.
//! - [`engine`]: the scanner seam and the external-command engine.
//! - [`temp`]: the temp file guard.

pub mod engine;
pub mod handler;
pub mod server;
pub mod temp;
mod token;

pub use engine::{CommandEngine, EngineConfig, EngineFuture, ScanEngine};
pub use handler::{ConnectionReport, HandlerContext, HandlerState, handle_connection};
pub use server::{AgentServer, ServerConfig};
pub use temp::TempScanFile;

/// Errors produced by the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scanner self-check failed: {0}")]
    SelfCheck(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
