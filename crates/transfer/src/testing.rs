//! A small in-process FTP server for tests.
//!
//! Speaks just enough of the protocol for guardftp's client: login,
//! `PASV`/`PORT`, `STOR`, `RETR`, `LIST`, `NLST` and the directory
//! commands. Files live in memory. Every command line is recorded.

use std::collections::{BTreeMap, HashMap};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use guardftp_protocol::{decode_host_port, encode_host_port};

#[derive(Debug, Default)]
struct MockState {
    greeting: String,
    commands: Vec<String>,
    files: BTreeMap<String, Vec<u8>>,
    overrides: HashMap<String, String>,
    retr_limit: Option<usize>,
    data_connections: usize,
}

/// Where the next data connection comes from.
enum Pending {
    Passive(TcpListener),
    Active(SocketAddrV4),
}

/// Handle to a running mock server. The server stops when dropped.
pub struct MockFtpServer {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    task: JoinHandle<()>,
}

impl MockFtpServer {
    /// Starts a server greeting with `220`.
    pub async fn start() -> Self {
        Self::with_greeting("220 guardftp mock ready").await
    }

    /// Starts a server with a custom greeting. A non-2xx greeting closes
    /// the connection right after it is sent.
    pub async fn with_greeting(greeting: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("mock ftp bind failed: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("mock ftp has no address: {e}"));
        let state = Arc::new(Mutex::new(MockState {
            greeting: greeting.to_string(),
            ..MockState::default()
        }));

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, state).await {
                        tracing::debug!(error = %e, "mock ftp connection ended");
                    }
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command line received so far, across connections.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state).commands.clone()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        lock(&self.state).files.get(name).cloned()
    }

    pub fn put_file(&self, name: &str, body: &[u8]) {
        lock(&self.state).files.insert(name.to_string(), body.to_vec());
    }

    /// Data connections opened so far.
    pub fn data_connections(&self) -> usize {
        lock(&self.state).data_connections
    }

    /// Makes every `RETR` stop after `bytes` bytes of data and answer
    /// `426` instead of `226`.
    pub fn abort_downloads_after(&self, bytes: usize) {
        lock(&self.state).retr_limit = Some(bytes);
    }

    /// Answers `verb` with `reply` instead of the normal handling.
    pub fn override_reply(&self, verb: &str, reply: &str) {
        lock(&self.state)
            .overrides
            .insert(verb.to_ascii_uppercase(), reply.to_string());
    }
}

impl Drop for MockFtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn reply(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(format!("{line}\r\n").as_bytes()).await
}

async fn open_data(
    pending: Option<Pending>,
    state: &Mutex<MockState>,
) -> std::io::Result<TcpStream> {
    let stream = match pending {
        Some(Pending::Passive(listener)) => listener.accept().await?.0,
        Some(Pending::Active(addr)) => TcpStream::connect(addr).await?,
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no PASV or PORT before transfer",
            ));
        }
    };
    lock(state).data_connections += 1;
    Ok(stream)
}

async fn serve(stream: TcpStream, state: Arc<Mutex<MockState>>) -> std::io::Result<()> {
    let (read, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let greeting = lock(&state).greeting.clone();
    reply(&mut writer, &greeting).await?;
    if !greeting.starts_with('2') {
        return Ok(());
    }

    let mut pending: Option<Pending> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end().to_string();
        let (verb, arg) = match line.split_once(' ') {
            Some((v, a)) => (v.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };

        let forced = {
            let mut s = lock(&state);
            s.commands.push(line.clone());
            s.overrides.get(&verb).cloned()
        };
        if let Some(forced) = forced {
            reply(&mut writer, &forced).await?;
            continue;
        }

        match verb.as_str() {
            "USER" => reply(&mut writer, "331 Please specify the password.").await?,
            "PASS" => reply(&mut writer, "230 Login successful.").await?,
            "TYPE" => reply(&mut writer, "200 Switching mode.").await?,
            "PWD" => reply(&mut writer, "257 \"/\" is the current directory").await?,
            "CWD" => reply(&mut writer, "250 Directory successfully changed.").await?,
            "MKD" => reply(&mut writer, &format!("257 \"{arg}\" created")).await?,
            "RMD" => reply(&mut writer, "250 Remove directory operation successful.").await?,
            "DELE" => {
                let removed = lock(&state).files.remove(&arg).is_some();
                if removed {
                    reply(&mut writer, "250 Delete operation successful.").await?;
                } else {
                    reply(&mut writer, "550 Delete operation failed.").await?;
                }
            }
            "RNFR" => reply(&mut writer, "350 Ready for RNTO.").await?,
            "RNTO" => reply(&mut writer, "250 Rename successful.").await?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let SocketAddr::V4(local) = listener.local_addr()? else {
                    reply(&mut writer, "425 Cannot open passive connection.").await?;
                    continue;
                };
                pending = Some(Pending::Passive(listener));
                let text = format!("227 Entering Passive Mode ({}).", encode_host_port(local));
                reply(&mut writer, &text).await?;
            }
            "PORT" => match decode_host_port(&arg) {
                Ok(addr) => {
                    pending = Some(Pending::Active(addr));
                    reply(&mut writer, "200 PORT command successful.").await?;
                }
                Err(_) => reply(&mut writer, "501 Illegal PORT command.").await?,
            },
            "STOR" => {
                if pending.is_none() {
                    reply(&mut writer, "425 Use PORT or PASV first.").await?;
                    continue;
                }
                reply(&mut writer, "150 Ok to send data.").await?;
                let mut data = open_data(pending.take(), &state).await?;
                let mut body = Vec::new();
                data.read_to_end(&mut body).await?;
                lock(&state).files.insert(arg, body);
                reply(&mut writer, "226 Transfer complete.").await?;
            }
            "RETR" => {
                let (body, limit) = {
                    let s = lock(&state);
                    (s.files.get(&arg).cloned(), s.retr_limit)
                };
                let Some(body) = body else {
                    pending = None;
                    reply(&mut writer, "550 Failed to open file.").await?;
                    continue;
                };
                let text = format!(
                    "150 Opening BINARY mode data connection for {arg} ({} bytes).",
                    body.len()
                );
                reply(&mut writer, &text).await?;
                let mut data = open_data(pending.take(), &state).await?;
                let sent = limit.map_or(body.len(), |l| l.min(body.len()));
                data.write_all(&body[..sent]).await?;
                data.shutdown().await?;
                drop(data);
                if sent < body.len() {
                    reply(&mut writer, "426 Connection closed; transfer aborted.").await?;
                } else {
                    reply(&mut writer, "226 Transfer complete.").await?;
                }
            }
            "LIST" | "NLST" => {
                reply(&mut writer, "150 Here comes the directory listing.").await?;
                let listing: String = lock(&state)
                    .files
                    .iter()
                    .map(|(name, body)| {
                        if verb == "LIST" {
                            format!("-rw-r--r--    1 ftp      ftp      {:>8} Jan 01 00:00 {name}\r\n", body.len())
                        } else {
                            format!("{name}\r\n")
                        }
                    })
                    .collect();
                let mut data = open_data(pending.take(), &state).await?;
                data.write_all(listing.as_bytes()).await?;
                data.shutdown().await?;
                drop(data);
                reply(&mut writer, "226 Directory send OK.").await?;
            }
            "QUIT" => {
                reply(&mut writer, "221 Goodbye.").await?;
                return Ok(());
            }
            _ => reply(&mut writer, "502 Command not implemented.").await?,
        }
    }

    Ok(())
}
