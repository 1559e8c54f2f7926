//! Scan agent TCP server.
//!
//! Runs the scanner self-check, binds, and serves each accepted
//! connection on its own task. A semaphore sized `max_connections`
//! gates the spawn point: a connection that cannot get a permit within
//! `admission_wait` is closed without a reply.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use guardftp_protocol::constants::{DEFAULT_AGENT_PORT, DEFAULT_BUFFER_SIZE};

use crate::AgentError;
use crate::engine::ScanEngine;
use crate::handler::{HandlerContext, handle_connection};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Handlers allowed to run at once.
    pub max_connections: usize,
    /// How long an accepted connection may wait for a free handler slot.
    pub admission_wait: Duration,
    /// Directory for received payloads. Created on start.
    pub temp_dir: PathBuf,
    /// Bound on each read from a client.
    pub io_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_AGENT_PORT,
            max_connections: 5,
            admission_wait: Duration::from_millis(2000),
            temp_dir: PathBuf::from("./temp_files"),
            io_timeout: Duration::from_secs(30),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// The scan agent server.
pub struct AgentServer<E: ScanEngine> {
    config: ServerConfig,
    ctx: HandlerContext<E>,
    gate: Arc<Semaphore>,
    next_conn_id: AtomicU64,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<E: ScanEngine> AgentServer<E> {
    /// Creates a new server around `engine`.
    pub fn new(config: ServerConfig, engine: E) -> Result<Arc<Self>, AgentError> {
        if config.max_connections == 0 {
            return Err(AgentError::Config("max_connections must be at least 1".into()));
        }

        let ctx = HandlerContext {
            engine: Arc::new(engine),
            temp_dir: config.temp_dir.clone(),
            io_timeout: config.io_timeout,
            buffer_size: config.buffer_size,
        };
        Ok(Arc::new(Self {
            gate: Arc::new(Semaphore::new(config.max_connections)),
            ctx,
            config,
            next_conn_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        }))
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Handler slots currently free.
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Token that stops the accept loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops accepting. In-flight handlers finish on their own.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the self-check, then accepts connections until shutdown.
    pub async fn run(self: &Arc<Self>) -> Result<(), AgentError> {
        let version = self.ctx.engine.self_check().await?;
        tracing::info!(%version, "scanner self-check passed");

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;

        let listener =
            TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(
            %local_addr,
            max_connections = self.config.max_connections,
            "scan agent listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("scan agent shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let permit = tokio::select! {
                                _ = self.cancel.cancelled() => break Ok(()),
                                permit = tokio::time::timeout(
                                    self.config.admission_wait,
                                    Arc::clone(&self.gate).acquire_owned(),
                                ) => permit,
                            };
                            let permit = match permit {
                                Ok(Ok(p)) => p,
                                Ok(Err(_)) => break Ok(()),
                                Err(_) => {
                                    tracing::warn!(%peer_addr, "all handler slots busy, closing connection");
                                    drop(stream);
                                    continue;
                                }
                            };

                            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
                            tracing::info!(%peer_addr, conn_id, "client connected");
                            let ctx = self.ctx.clone();
                            tokio::spawn(async move {
                                let report = handle_connection(stream, &ctx, conn_id).await;
                                tracing::info!(
                                    %peer_addr,
                                    conn_id,
                                    state = ?report.last_state,
                                    received = report.received,
                                    "client disconnected"
                                );
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }
}
