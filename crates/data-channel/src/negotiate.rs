//! Passive and active data-channel negotiation.

use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use guardftp_control::ControlSession;
use guardftp_protocol::{Command, parse_passive_reply};

use crate::error::DataChannelError;

/// Which side opens the data connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Passive,
    Active,
}

/// A negotiated, not yet used, data channel.
///
/// Passive channels are already connected. Active channels hold the
/// listener until [`into_stream`](Self::into_stream) accepts the server's
/// connection; dropping the value closes the listener.
#[derive(Debug)]
pub enum DataChannel {
    Passive(TcpStream),
    Active {
        listener: TcpListener,
        accept_timeout: Duration,
    },
}

impl DataChannel {
    /// Negotiates a channel in the session's current mode.
    pub async fn open(
        session: &mut ControlSession,
        cancel: &CancellationToken,
    ) -> Result<Self, DataChannelError> {
        if session.session().passive() {
            Self::open_passive(session, cancel).await
        } else {
            Self::open_active(session).await
        }
    }

    /// `PASV`, then connect to the reported address.
    ///
    /// A missing or malformed address in the reply is an error; there is
    /// no fallback to the control peer.
    pub async fn open_passive(
        session: &mut ControlSession,
        cancel: &CancellationToken,
    ) -> Result<Self, DataChannelError> {
        let reply = session.execute(&Command::Pasv).await?;
        if !reply.is_positive() {
            return Err(DataChannelError::Rejected(reply));
        }

        let addr = parse_passive_reply(reply.message())?;
        let timeout = session.options().data_timeout;

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(timeout, TcpStream::connect(addr)) => {
                match result {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };

        debug!(%addr, "passive data connection open");
        Ok(Self::Passive(stream))
    }

    /// Listens on an ephemeral port of the control socket's local address
    /// and advertises it with `PORT`.
    ///
    /// On rejection the listener is closed before the error is returned.
    pub async fn open_active(session: &mut ControlSession) -> Result<Self, DataChannelError> {
        let local = session.local_addr()?;
        let IpAddr::V4(ip) = local.ip() else {
            return Err(DataChannelError::ActiveAddress(local));
        };

        let listener = TcpListener::bind(SocketAddrV4::new(ip, 0)).await?;
        let port = listener.local_addr()?.port();
        let advertised = SocketAddrV4::new(ip, port);

        let reply = session.execute(&Command::Port(advertised)).await?;
        if !reply.is_positive() {
            drop(listener);
            return Err(DataChannelError::Rejected(reply));
        }

        debug!(%advertised, "active data listener advertised");
        Ok(Self::Active {
            listener,
            accept_timeout: session.options().data_timeout,
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Passive(_) => Mode::Passive,
            Self::Active { .. } => Mode::Active,
        }
    }

    /// Returns the connected data socket. Active channels accept exactly
    /// one connection and then close the listener.
    pub async fn into_stream(
        self,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, DataChannelError> {
        match self {
            Self::Passive(stream) => Ok(stream),
            Self::Active {
                listener,
                accept_timeout,
            } => {
                let stream = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(DataChannelError::Cancelled);
                    }
                    result = tokio::time::timeout(accept_timeout, listener.accept()) => {
                        match result {
                            Ok(Ok((stream, peer))) => {
                                info!(%peer, "active data connection accepted");
                                stream
                            }
                            Ok(Err(e)) => return Err(e.into()),
                            Err(_) => return Err(DataChannelError::Timeout),
                        }
                    }
                };
                Ok(stream)
            }
        }
    }

    /// Local address of the listener (active) or socket (passive).
    pub fn local_addr(&self) -> Result<SocketAddr, DataChannelError> {
        Ok(match self {
            Self::Passive(stream) => stream.local_addr()?,
            Self::Active { listener, .. } => listener.local_addr()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardftp_control::SessionOptions;
    use guardftp_protocol::decode_host_port;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::task::JoinHandle;

    fn options(passive: bool) -> SessionOptions {
        SessionOptions {
            control_timeout: Duration::from_secs(2),
            data_timeout: Duration::from_secs(2),
            explicit_tls: false,
            passive,
        }
    }

    /// Control server that greets, logs the client in, then hands the
    /// next received line to `respond` and writes back what it returns.
    async fn control_server<F, Fut>(respond: F) -> (u16, JoinHandle<String>)
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = String> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            write_half.write_all(b"220 ready\r\n").await.unwrap();
            let _user = lines.next_line().await.unwrap();
            write_half.write_all(b"230 ok\r\n").await.unwrap();

            let line = lines.next_line().await.unwrap().unwrap();
            let reply = respond(line.clone()).await;
            write_half.write_all(reply.as_bytes()).await.unwrap();
            let _ = lines.next_line().await;
            line
        });
        (port, handle)
    }

    async fn session_for(port: u16, passive: bool) -> ControlSession {
        let mut session = ControlSession::new(options(passive));
        session.connect("127.0.0.1", port).await.unwrap();
        session.authenticate("u", "p").await.unwrap();
        session
    }

    #[tokio::test]
    async fn passive_connects_to_reported_address() {
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let data_port = data.local_addr().unwrap().port();
        let data_task = tokio::spawn(async move {
            let (mut stream, _) = data.accept().await.unwrap();
            stream.write_all(b"listing").await.unwrap();
        });

        let (port, server) = control_server(move |_| async move {
            format!(
                "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
                data_port / 256,
                data_port % 256
            )
        })
        .await;

        let mut session = session_for(port, true).await;
        let cancel = CancellationToken::new();
        let channel = DataChannel::open(&mut session, &cancel).await.unwrap();
        assert_eq!(channel.mode(), Mode::Passive);

        let mut stream = channel.into_stream(&cancel).await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "listing");

        data_task.await.unwrap();
        drop(session);
        assert_eq!(server.await.unwrap(), "PASV");
    }

    #[tokio::test]
    async fn passive_rejection_surfaces_reply() {
        let (port, _server) =
            control_server(|_| async { "425 Can't open data connection\r\n".to_string() }).await;
        let mut session = session_for(port, true).await;
        let err = DataChannel::open(&mut session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::Rejected(ref r) if r.code() == Some(425)));
    }

    #[tokio::test]
    async fn passive_without_address_is_parse_error() {
        let (port, _server) =
            control_server(|_| async { "227 Entering Passive Mode\r\n".to_string() }).await;
        let mut session = session_for(port, true).await;
        let err = DataChannel::open(&mut session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::PassiveParse(_)));
    }

    #[tokio::test]
    async fn active_accepts_server_connection() {
        let (port, server) = control_server(|line| async move {
            let addr = decode_host_port(line.trim_start_matches("PORT ")).unwrap();
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream.write_all(b"from server").await.unwrap();
            });
            "200 PORT command successful\r\n".to_string()
        })
        .await;

        let mut session = session_for(port, false).await;
        let cancel = CancellationToken::new();
        let channel = DataChannel::open(&mut session, &cancel).await.unwrap();
        assert_eq!(channel.mode(), Mode::Active);

        let mut stream = channel.into_stream(&cancel).await.unwrap();
        let mut buf = String::new();
        stream.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "from server");

        drop(session);
        let line = server.await.unwrap();
        assert!(line.starts_with("PORT 127,0,0,1,"), "{line}");
    }

    #[tokio::test]
    async fn active_rejection_closes_listener() {
        let (port, server) =
            control_server(|_| async { "500 PORT not allowed\r\n".to_string() }).await;
        let mut session = session_for(port, false).await;
        let err = DataChannel::open(&mut session, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataChannelError::Rejected(_)));
        drop(session);

        let line = server.await.unwrap();
        let addr = decode_host_port(line.trim_start_matches("PORT ")).unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn active_accept_honours_cancel() {
        let (port, _server) = control_server(|_| async { "200 ok\r\n".to_string() }).await;
        let mut session = session_for(port, false).await;
        let cancel = CancellationToken::new();
        let channel = DataChannel::open(&mut session, &cancel).await.unwrap();

        cancel.cancel();
        let err = channel.into_stream(&cancel).await.unwrap_err();
        assert!(matches!(err, DataChannelError::Cancelled));
    }
}
