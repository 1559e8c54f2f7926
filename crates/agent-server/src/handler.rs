//! Per-connection scan handler.
//!
//! Each accepted connection walks
//! `AwaitFilename -> AwaitSize -> ReceivePayload -> Scanning -> Responded -> Closed`.
//! A message that does not fit the current state is a protocol violation:
//! the handler answers with an `ERROR` result (best effort) and closes.
//! The temp file, if one was created, is removed on every path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use guardftp_protocol::ScanResult;
use guardftp_protocol::constants::DEFAULT_BUFFER_SIZE;
use guardftp_scan_gateway::GatewayError;
use guardftp_scan_gateway::wire::{self, READY};

use crate::engine::ScanEngine;
use crate::temp::TempScanFile;

/// Where a connection is in the scan exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    AwaitFilename,
    AwaitSize,
    ReceivePayload,
    Scanning,
    Responded,
    Closed,
}

/// Read-only settings shared by every handler.
pub struct HandlerContext<E: ScanEngine> {
    pub engine: Arc<E>,
    pub temp_dir: PathBuf,
    /// Bound on each client read.
    pub io_timeout: Duration,
    pub buffer_size: usize,
}

impl<E: ScanEngine> HandlerContext<E> {
    pub fn new(engine: Arc<E>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            temp_dir: temp_dir.into(),
            io_timeout: Duration::from_secs(30),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl<E: ScanEngine> Clone for HandlerContext<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            temp_dir: self.temp_dir.clone(),
            io_timeout: self.io_timeout,
            buffer_size: self.buffer_size,
        }
    }
}

/// What happened on one connection.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub conn_id: u64,
    pub declared_name: Option<String>,
    pub declared_size: Option<u64>,
    /// Payload bytes written to the temp file.
    pub received: u64,
    /// Path of the temp file. It no longer exists once the report is
    /// returned.
    pub temp_path: Option<PathBuf>,
    /// The verdict sent to the client, error responses included.
    pub result: Option<ScanResult>,
    /// Last state reached before `Closed`.
    pub last_state: HandlerState,
    pub state: HandlerState,
}

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error(transparent)]
    Wire(#[from] GatewayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Violation(String),

    #[error("client timed out")]
    Timeout,
}

impl HandlerError {
    fn to_result(&self) -> ScanResult {
        match self {
            Self::Violation(msg) => ScanResult::error("Protocol violation", msg.clone()),
            other => ScanResult::error("Server error", other.to_string()),
        }
    }
}

struct Exchange<'a, S, E: ScanEngine> {
    stream: &'a mut S,
    ctx: &'a HandlerContext<E>,
    report: ConnectionReport,
    temp: Option<TempScanFile>,
}

/// Serves one scan request on `stream`, then closes it.
///
/// Never fails: every error is reported to the client (best effort) and
/// recorded in the returned report.
pub async fn handle_connection<S, E>(
    mut stream: S,
    ctx: &HandlerContext<E>,
    conn_id: u64,
) -> ConnectionReport
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: ScanEngine,
{
    let mut exchange = Exchange {
        stream: &mut stream,
        ctx,
        report: ConnectionReport {
            conn_id,
            declared_name: None,
            declared_size: None,
            received: 0,
            temp_path: None,
            result: None,
            last_state: HandlerState::AwaitFilename,
            state: HandlerState::AwaitFilename,
        },
        temp: None,
    };

    if let Err(e) = exchange.run().await {
        warn!(conn_id, state = ?exchange.report.state, error = %e, "scan request failed");
        let result = e.to_result();
        if let Err(write_err) = wire::write_result(exchange.stream, &result).await {
            debug!(conn_id, error = %write_err, "could not send error result");
        }
        exchange.report.result = Some(result);
    }

    exchange.close().await
}

impl<S, E> Exchange<'_, S, E>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    E: ScanEngine,
{
    fn enter(&mut self, state: HandlerState) {
        debug!(conn_id = self.report.conn_id, from = ?self.report.state, to = ?state, "state");
        self.report.state = state;
    }

    async fn run(&mut self) -> Result<(), HandlerError> {
        let message = self.read_message().await?;
        let name = wire::parse_filename(&message)
            .ok_or_else(|| HandlerError::Violation(format!("expected FILENAME, got {message:?}")))?
            .to_string();
        info!(conn_id = self.report.conn_id, filename = %name, "receiving file");
        self.report.declared_name = Some(name.clone());
        wire::write_message(self.stream, READY).await?;

        self.enter(HandlerState::AwaitSize);
        let message = self.read_message().await?;
        let size = wire::parse_size(&message)
            .ok_or_else(|| HandlerError::Violation(format!("expected SIZE, got {message:?}")))?;
        self.report.declared_size = Some(size);
        wire::write_message(self.stream, READY).await?;

        self.enter(HandlerState::ReceivePayload);
        let (temp, file) =
            TempScanFile::create(&self.ctx.temp_dir, self.report.conn_id, &name).await?;
        self.report.temp_path = Some(temp.path().to_path_buf());
        let path = temp.path().to_path_buf();
        self.temp = Some(temp);
        self.receive(file, size).await?;
        info!(
            conn_id = self.report.conn_id,
            received = self.report.received,
            declared = size,
            "file received"
        );

        self.enter(HandlerState::Scanning);
        let result = self.ctx.engine.scan(&path).await;

        self.enter(HandlerState::Responded);
        self.report.result = Some(result.clone());
        if let Err(e) = wire::write_result(self.stream, &result).await {
            debug!(conn_id = self.report.conn_id, error = %e, "client left before the verdict");
        }
        info!(conn_id = self.report.conn_id, status = %result.status, "scan complete");
        Ok(())
    }

    async fn read_message(&mut self) -> Result<String, HandlerError> {
        match tokio::time::timeout(self.ctx.io_timeout, wire::read_message(self.stream)).await {
            Ok(r) => Ok(r?),
            Err(_) => Err(HandlerError::Timeout),
        }
    }

    /// Copies up to `declared` bytes into `file`. An early close ends the
    /// payload; the partial file is still scanned.
    async fn receive(&mut self, mut file: tokio::fs::File, declared: u64) -> Result<(), HandlerError> {
        let mut buf = vec![0u8; self.ctx.buffer_size.max(1)];
        let mut remaining = declared;

        while remaining > 0 {
            let to_read = chunk_len(remaining, buf.len());
            let n = match tokio::time::timeout(self.ctx.io_timeout, self.stream.read(&mut buf[..to_read])).await {
                Ok(r) => r?,
                Err(_) => return Err(HandlerError::Timeout),
            };
            if n == 0 {
                warn!(
                    conn_id = self.report.conn_id,
                    received = self.report.received,
                    declared,
                    "client closed before sending the whole payload"
                );
                break;
            }
            file.write_all(&buf[..n]).await?;
            remaining -= n as u64;
            self.report.received += n as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn close(mut self) -> ConnectionReport {
        self.report.last_state = self.report.state;
        self.enter(HandlerState::Closed);
        drop(self.temp.take());
        let _ = self.stream.shutdown().await;
        self.report
    }
}

/// Bytes to read next: the rest of the payload, capped at the buffer.
fn chunk_len(remaining: u64, buf_len: usize) -> usize {
    remaining.min(buf_len as u64) as usize
}

/// True if `path` has been removed, for callers checking cleanup.
pub fn is_cleaned_up(report: &ConnectionReport) -> bool {
    report.temp_path.as_deref().is_none_or(|p: &Path| !p.exists())
}
