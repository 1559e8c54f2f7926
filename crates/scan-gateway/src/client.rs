//! Client side of the scan gateway.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use guardftp_protocol::ScanResult;
use guardftp_protocol::constants::{DEFAULT_AGENT_PORT, DEFAULT_BUFFER_SIZE};

use crate::error::GatewayError;
use crate::wire::{self, FILENAME_PREFIX, READY, SIZE_PREFIX};

/// Boxed future returned by [`ScanGateway::scan`].
pub type ScanFuture<'a> = Pin<Box<dyn Future<Output = ScanResult> + Send + 'a>>;

/// Something that can produce a verdict for a local file.
///
/// The transfer orchestrator only sees this trait, so tests can plug in a
/// fake agent. Implementations must never report `OK` or `INFECTED`
/// without an explicit answer from the scanner: every failure is an
/// `ERROR` result.
pub trait ScanGateway: Send + Sync {
    fn scan<'a>(&'a self, path: &'a Path, cancel: &'a CancellationToken) -> ScanFuture<'a>;
}

/// Where the agent lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ScanClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Bound on each `READY` acknowledgement.
    pub reply_timeout: Duration,
    /// Bound on the final verdict, which includes the scan itself.
    pub result_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for ScanClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_AGENT_PORT,
            connect_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(10),
            result_timeout: Duration::from_secs(90),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Submits files to a scan agent over TCP, one connection per file.
#[derive(Debug, Clone)]
pub struct ScanClient {
    config: ScanClientConfig,
}

impl ScanClient {
    pub fn new(config: ScanClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanClientConfig {
        &self.config
    }

    /// Scans `path`, folding every failure into an `ERROR` result.
    pub async fn scan_file(&self, path: &Path, cancel: &CancellationToken) -> ScanResult {
        match self.submit(path, cancel).await {
            Ok(result) => {
                info!(path = %path.display(), status = %result.status, "scan verdict");
                result
            }
            Err(GatewayError::FileNotFound(p)) => ScanResult::error(
                "File not found",
                format!("File does not exist: {}", p.display()),
            ),
            Err(GatewayError::Cancelled) => ScanResult::error("Scan cancelled", ""),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "scan gateway failure");
                ScanResult::error("Failed to scan file", e.to_string())
            }
        }
    }

    /// Runs the full exchange and returns the agent's verdict.
    pub async fn submit(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ScanResult, GatewayError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(GatewayError::FileNotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GatewayError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let declared = metadata.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let addr = (self.config.host.as_str(), self.config.port);
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GatewayError::Cancelled);
            }
            result = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)) => {
                match result {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(GatewayError::Timeout),
                }
            }
        };
        debug!(host = %self.config.host, port = self.config.port, %name, declared, "scan agent connected");

        self.handshake(&mut stream, &format!("{FILENAME_PREFIX}{name}"))
            .await?;
        self.handshake(&mut stream, &format!("{SIZE_PREFIX}{declared}"))
            .await?;

        let sent = self.send_payload(&mut stream, path, declared, cancel).await?;
        if sent != declared {
            return Err(GatewayError::SizeMismatch { declared, sent });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            result = tokio::time::timeout(self.config.result_timeout, wire::read_result(&mut stream)) => {
                match result {
                    Ok(r) => r,
                    Err(_) => Err(GatewayError::Timeout),
                }
            }
        }
    }

    async fn handshake(&self, stream: &mut TcpStream, message: &str) -> Result<(), GatewayError> {
        wire::write_message(stream, message).await?;
        let reply = match tokio::time::timeout(self.config.reply_timeout, wire::read_message(stream)).await {
            Ok(r) => r?,
            Err(_) => return Err(GatewayError::Timeout),
        };
        if reply != READY {
            return Err(GatewayError::UnexpectedMessage {
                expected: READY,
                got: reply,
            });
        }
        Ok(())
    }

    /// Streams at most `declared` bytes of the file. Returns what was sent.
    async fn send_payload(
        &self,
        stream: &mut TcpStream,
        path: &Path,
        declared: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, GatewayError> {
        let file = tokio::fs::File::open(path).await?;
        let mut file = file.take(declared);
        let mut buf = vec![0u8; self.config.buffer_size.max(1)];
        let mut sent: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).await?;
            sent += n as u64;
        }
        stream.flush().await?;
        Ok(sent)
    }
}

impl ScanGateway for ScanClient {
    fn scan<'a>(&'a self, path: &'a Path, cancel: &'a CancellationToken) -> ScanFuture<'a> {
        Box::pin(self.scan_file(path, cancel))
    }
}
