//! The control session: one control connection to one file server.

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, warn};

use guardftp_protocol::constants::codes;
use guardftp_protocol::{Command, Reply, TransferType};

use crate::error::ControlError;
use crate::explicit_tls;
use crate::reader;
use crate::session::{Session, SessionOptions, SessionStatus, quoted_path, resolve_working_directory};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

/// Client side of the control channel.
///
/// Operations are sequential: one command is in flight at a time, and
/// every failure is returned to the caller. Nothing reconnects on its own.
pub struct ControlSession {
    options: SessionOptions,
    state: Session,
    conn: Option<Connection>,
    user: Option<String>,
}

impl ControlSession {
    pub fn new(options: SessionOptions) -> Self {
        let state = Session::new(options.passive);
        Self {
            options,
            state,
            conn: None,
            user: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn session(&self) -> &Session {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated
    }

    /// Local address of the control socket. Active mode advertises it.
    pub fn local_addr(&self) -> Result<SocketAddr, ControlError> {
        self.conn
            .as_ref()
            .map(|c| c.local_addr)
            .ok_or(ControlError::NotConnected)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.as_ref().map(|c| c.peer_addr)
    }

    /// Opens the control connection and reads the greeting.
    ///
    /// Succeeds only on a `220` greeting. Any other outcome leaves the
    /// session disconnected. An existing connection is closed first.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<Reply, ControlError> {
        if self.conn.is_some() {
            self.disconnect().await;
        }

        info!(host, port, "connecting to file server");
        let stream = match tokio::time::timeout(
            self.options.control_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                warn!(host, port, error = %e, "control connect failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(host, port, "control connect timed out");
                return Err(ControlError::Timeout);
            }
        };

        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        self.conn = Some(Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
            local_addr,
            peer_addr,
        });

        let greeting = match self.read_reply().await {
            Ok(reply) => reply,
            Err(e) => {
                self.drop_connection();
                return Err(e);
            }
        };

        if greeting.code() != Some(codes::SERVICE_READY) {
            warn!(%peer_addr, reply = %greeting, "unexpected greeting");
            self.drop_connection();
            return Err(ControlError::Rejected(greeting));
        }

        self.state.connected = true;
        info!(%peer_addr, greeting = greeting.message(), "connected");
        Ok(greeting)
    }

    /// Logs in with `USER`/`PASS`.
    ///
    /// When `explicit_tls` is set, `AUTH TLS` goes first through the
    /// [`explicit_tls`] shim. A `503` to `USER` (server wanted `AUTH`
    /// first) is retried once.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Reply, ControlError> {
        if !self.state.connected {
            return Err(ControlError::NotConnected);
        }

        if self.options.explicit_tls {
            let outcome = explicit_tls::negotiate(self).await?;
            debug!(?outcome, "AUTH TLS shim finished");
        }

        let user = Command::User(username.to_string());
        let mut reply = self.execute(&user).await?;
        if reply.code() == Some(codes::BAD_SEQUENCE) {
            debug!(%reply, "USER rejected as out of sequence, retrying once");
            reply = self.execute(&user).await?;
        }
        if reply.code() == Some(codes::NEED_PASSWORD) {
            reply = self.execute(&Command::Pass(password.to_string())).await?;
        }

        if !reply.is_positive() {
            warn!(username, %reply, "login rejected");
            return Err(ControlError::AuthenticationFailed(reply));
        }

        self.state.authenticated = true;
        self.user = Some(username.to_string());
        info!(username, "logged in");
        Ok(reply)
    }

    /// Writes `command` followed by CRLF.
    pub async fn send_command(&mut self, command: &Command) -> Result<(), ControlError> {
        if !self.state.connected {
            return Err(ControlError::NotConnected);
        }
        let conn = self.conn.as_mut().ok_or(ControlError::NotConnected)?;

        debug!(command = %command.redacted(), "-->");
        let line = format!("{command}\r\n");
        let result = async {
            conn.writer.write_all(line.as_bytes()).await?;
            conn.writer.flush().await
        }
        .await;

        if let Err(e) = result {
            self.drop_connection();
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads the next complete reply, bounded by the control timeout.
    pub async fn read_reply(&mut self) -> Result<Reply, ControlError> {
        let timeout = self.options.control_timeout;
        let conn = self.conn.as_mut().ok_or(ControlError::NotConnected)?;

        let result = match tokio::time::timeout(timeout, reader::read_reply(&mut conn.reader)).await {
            Ok(result) => result,
            Err(_) => {
                // A late reply would otherwise answer the next command.
                warn!(?timeout, "control reply timed out, closing connection");
                self.drop_connection();
                return Err(ControlError::Timeout);
            }
        };

        match result {
            Ok(reply) => {
                debug!(reply = %reply, "<--");
                Ok(reply)
            }
            Err(ControlError::Io(e)) => {
                warn!(error = %e, "control connection lost");
                self.drop_connection();
                Err(ControlError::Io(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Sends `command` and reads its reply.
    pub async fn execute(&mut self, command: &Command) -> Result<Reply, ControlError> {
        self.send_command(command).await?;
        self.read_reply().await
    }

    /// Sends `QUIT` if logged in (best effort), then closes the socket
    /// and resets the session.
    pub async fn disconnect(&mut self) {
        if self.state.authenticated {
            match self.execute(&Command::Quit).await {
                Ok(reply) => debug!(%reply, "QUIT acknowledged"),
                Err(e) => debug!(error = %e, "QUIT failed"),
            }
        }

        if let Some(mut conn) = self.conn.take() {
            let _ = conn.writer.shutdown().await;
            info!(peer_addr = %conn.peer_addr, "disconnected");
        }
        self.state.reset();
        self.user = None;
    }

    fn drop_connection(&mut self) {
        self.conn = None;
        self.user = None;
        self.state.reset();
    }

    fn require_authenticated(&self) -> Result<(), ControlError> {
        if !self.state.connected {
            return Err(ControlError::NotConnected);
        }
        if !self.state.authenticated {
            return Err(ControlError::NotAuthenticated);
        }
        Ok(())
    }

    /// Runs `command` and requires a `2xx` reply.
    async fn run_positive(&mut self, command: Command) -> Result<Reply, ControlError> {
        self.require_authenticated()?;
        let reply = self.execute(&command).await?;
        if reply.is_positive() {
            Ok(reply)
        } else {
            Err(ControlError::Rejected(reply))
        }
    }

    /// `CWD`, tracking the working directory on success.
    pub async fn change_directory(&mut self, dir: &str) -> Result<Reply, ControlError> {
        let reply = self.run_positive(Command::Cwd(dir.to_string())).await?;
        self.state.working_directory = resolve_working_directory(&self.state.working_directory, dir);
        Ok(reply)
    }

    /// `PWD`. Stores the quoted directory from the reply when present.
    pub async fn print_working_directory(&mut self) -> Result<Reply, ControlError> {
        let reply = self.run_positive(Command::Pwd).await?;
        if let Some(dir) = quoted_path(reply.message()) {
            self.state.working_directory = dir.to_string();
        }
        Ok(reply)
    }

    pub async fn make_directory(&mut self, dir: &str) -> Result<Reply, ControlError> {
        self.run_positive(Command::Mkd(dir.to_string())).await
    }

    pub async fn remove_directory(&mut self, dir: &str) -> Result<Reply, ControlError> {
        self.run_positive(Command::Rmd(dir.to_string())).await
    }

    pub async fn delete_file(&mut self, name: &str) -> Result<Reply, ControlError> {
        self.run_positive(Command::Dele(name.to_string())).await
    }

    /// `RNFR` (needs `3xx`) then `RNTO` (needs `2xx`).
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<Reply, ControlError> {
        self.require_authenticated()?;
        let reply = self.execute(&Command::Rnfr(from.to_string())).await?;
        if !reply.is_positive_intermediate() {
            return Err(ControlError::Rejected(reply));
        }
        self.run_positive(Command::Rnto(to.to_string())).await
    }

    /// `TYPE A` / `TYPE I`. The tracked mode changes only on `2xx`.
    pub async fn set_transfer_mode(&mut self, ty: TransferType) -> Result<Reply, ControlError> {
        let reply = self.run_positive(Command::Type(ty)).await?;
        self.state.transfer_type = ty;
        Ok(reply)
    }

    /// Flips between passive and active data channels. Returns the new
    /// passive flag. Purely local: nothing is sent.
    pub fn toggle_passive(&mut self) -> bool {
        self.state.passive = !self.state.passive;
        info!(passive = self.state.passive, "data channel mode changed");
        self.state.passive
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session: self.state.clone(),
            peer: self.peer_addr(),
            user: self.user.clone(),
        }
    }
}
