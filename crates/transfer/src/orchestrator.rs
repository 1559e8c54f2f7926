//! Scan-gated transfer orchestration.
//!
//! Uploads run in a fixed order: local existence check, scan, then (only
//! for an `OK` verdict or a confirmed `ERROR`) data channel and `STOR`.
//! Downloads and listings skip the scan.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use guardftp_control::{ControlError, ControlSession};
use guardftp_data_channel::{DataChannel, DataChannelError, PumpOptions, pump};
use guardftp_protocol::{Command, ScanStatus};
use guardftp_scan_gateway::ScanGateway;

use crate::batch::{expand_local_patterns, has_glob_meta, match_remote_names};
use crate::confirm::Confirm;
use crate::error::TransferError;
use crate::types::{BatchItem, ItemOutcome, TransferEvent, TransferOptions, UploadOutcome};
use crate::validation::local_name_for;

/// Event channel capacity. Events are dropped, not awaited, when full.
const EVENT_CAPACITY: usize = 256;

/// Runs uploads, downloads and listings over a control session.
pub struct TransferOrchestrator {
    gateway: Arc<dyn ScanGateway>,
    confirm: Arc<dyn Confirm>,
    options: TransferOptions,
    events_tx: mpsc::Sender<TransferEvent>,
    events_rx: Option<mpsc::Receiver<TransferEvent>>,
    cancel: CancellationToken,
}

impl TransferOrchestrator {
    pub fn new(
        gateway: Arc<dyn ScanGateway>,
        confirm: Arc<dyn Confirm>,
        options: TransferOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            gateway,
            confirm,
            options,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Flips per-file prompting for batch transfers. Returns the new value.
    pub fn toggle_prompt(&mut self) -> bool {
        self.options.prompt = !self.options.prompt;
        self.options.prompt
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.events_rx.take()
    }

    /// Token that interrupts the current transfer when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replaces a cancelled token so later transfers can run.
    pub fn renew_cancel_token(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }

    fn emit(&self, event: TransferEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "transfer event dropped");
        }
    }

    fn pump_options(&self) -> PumpOptions {
        PumpOptions {
            buffer_size: self.options.buffer_size,
            idle_timeout: self.options.idle_timeout,
        }
    }

    /// Scans `local` and, if allowed, stores it as `remote`.
    ///
    /// An `INFECTED` verdict returns [`UploadOutcome::Blocked`] without
    /// sending any command to the FTP server. An `ERROR` verdict asks the
    /// [`Confirm`] seam; a no returns [`UploadOutcome::Declined`].
    pub async fn upload(
        &self,
        session: &mut ControlSession,
        local: &Path,
        remote: &str,
    ) -> Result<UploadOutcome, TransferError> {
        let size = match tokio::fs::metadata(local).await {
            Ok(m) if m.is_file() => m.len(),
            Ok(_) => return Err(TransferError::FileNotFound(local.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::FileNotFound(local.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        ensure_ready(session)?;
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        info!(path = %local.display(), size, "scanning before upload");
        self.emit(TransferEvent::Scanning {
            path: local.to_path_buf(),
        });
        let verdict = self.gateway.scan(local, &self.cancel).await;
        self.emit(TransferEvent::Scanned {
            path: local.to_path_buf(),
            verdict: verdict.clone(),
        });

        match verdict.status {
            ScanStatus::Ok => {}
            ScanStatus::Infected => {
                warn!(
                    path = %local.display(),
                    details = %verdict.details,
                    "upload blocked: virus detected"
                );
                self.emit(TransferEvent::Failed {
                    name: remote.to_string(),
                    error: format!("blocked: {}", verdict.message),
                });
                return Ok(UploadOutcome::Blocked(verdict));
            }
            ScanStatus::Error => {
                if self.cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                let question = format!(
                    "Scan failed for {} ({}). Upload without a scan?",
                    local.display(),
                    verdict.message
                );
                if !self.confirm.confirm(&question) {
                    info!(path = %local.display(), "upload declined after scan failure");
                    return Ok(UploadOutcome::Declined(verdict));
                }
                warn!(path = %local.display(), "uploading without a clean scan");
            }
        }

        match self.store(session, local, remote, size).await {
            Ok(bytes) => {
                info!(path = %local.display(), remote, bytes, "upload complete");
                self.emit(TransferEvent::Completed {
                    name: remote.to_string(),
                    bytes,
                });
                Ok(UploadOutcome::Uploaded { bytes, verdict })
            }
            Err(e) => {
                self.emit(TransferEvent::Failed {
                    name: remote.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn store(
        &self,
        session: &mut ControlSession,
        local: &Path,
        remote: &str,
        size: u64,
    ) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::open(local).await?;
        let (mut stream, _) = self
            .begin(session, &Command::Stor(remote.to_string()))
            .await?;

        let mut progress = ProgressReporter::new(self, remote, Some(size));
        let moved = pump(
            &mut file,
            &mut stream,
            &self.pump_options(),
            &self.cancel,
            |n| progress.update(n),
        )
        .await;
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "data socket shutdown failed");
        }
        drop(stream);

        self.finish(session, moved, progress.bytes).await
    }

    /// Retrieves `remote` into the file at `local`.
    ///
    /// The local file is created only after the server accepts `RETR`,
    /// and removed again if the transfer does not complete.
    pub async fn download(
        &self,
        session: &mut ControlSession,
        remote: &str,
        local: &Path,
    ) -> Result<u64, TransferError> {
        let result = self.download_inner(session, remote, local).await;
        match &result {
            Ok(bytes) => {
                info!(remote, path = %local.display(), bytes, "download complete");
                self.emit(TransferEvent::Completed {
                    name: remote.to_string(),
                    bytes: *bytes,
                });
            }
            Err(e) => self.emit(TransferEvent::Failed {
                name: remote.to_string(),
                error: e.to_string(),
            }),
        }
        result
    }

    async fn download_inner(
        &self,
        session: &mut ControlSession,
        remote: &str,
        local: &Path,
    ) -> Result<u64, TransferError> {
        let (mut stream, total) = self
            .begin(session, &Command::Retr(remote.to_string()))
            .await?;

        let mut file = match tokio::fs::File::create(local).await {
            Ok(f) => f,
            Err(e) => {
                drop(stream);
                self.abandon(session).await;
                return Err(e.into());
            }
        };

        let mut progress = ProgressReporter::new(self, remote, total);
        let moved = pump(
            &mut stream,
            &mut file,
            &self.pump_options(),
            &self.cancel,
            |n| progress.update(n),
        )
        .await;
        drop(stream);
        drop(file);

        let result = self.finish(session, moved, progress.bytes).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(local).await {
                warn!(path = %local.display(), error = %e, "could not remove partial download");
            }
        }
        result
    }

    /// Full `LIST` output as text.
    pub async fn list(
        &self,
        session: &mut ControlSession,
        path: Option<&str>,
    ) -> Result<String, TransferError> {
        let mut buf = Vec::new();
        self.collect(session, &Command::List(path.map(str::to_string)), &mut buf)
            .await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// `NLST` output, one name per entry.
    pub async fn name_list(
        &self,
        session: &mut ControlSession,
        path: Option<&str>,
    ) -> Result<Vec<String>, TransferError> {
        let mut buf = Vec::new();
        self.collect(session, &Command::Nlst(path.map(str::to_string)), &mut buf)
            .await?;
        Ok(String::from_utf8_lossy(&buf)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn collect<W: AsyncWrite + Unpin>(
        &self,
        session: &mut ControlSession,
        command: &Command,
        writer: &mut W,
    ) -> Result<u64, TransferError> {
        let (mut stream, _) = self.begin(session, command).await?;
        let moved = copy_all(&mut stream, writer, &self.pump_options(), &self.cancel).await;
        drop(stream);
        let partial = *moved.as_ref().unwrap_or(&0);
        self.finish(session, moved, partial).await
    }

    /// Uploads every file matched by `patterns`, one at a time.
    ///
    /// With prompting on, each file is confirmed first. A failure is
    /// recorded and the batch moves on; cancellation ends it.
    pub async fn upload_many(
        &self,
        session: &mut ControlSession,
        patterns: &[String],
    ) -> Result<Vec<BatchItem>, TransferError> {
        let files = expand_local_patterns(patterns).await?;
        let mut items = Vec::with_capacity(files.len());

        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            if self.options.prompt && !self.confirm.confirm(&format!("mput {name}?")) {
                items.push(BatchItem {
                    name,
                    result: Ok(ItemOutcome::Skipped),
                });
                continue;
            }

            let result = self
                .upload(session, &path, &name)
                .await
                .map(ItemOutcome::Uploaded);
            let stop = matches!(result, Err(TransferError::Cancelled));
            items.push(BatchItem { name, result });
            if stop {
                break;
            }
        }

        Ok(items)
    }

    /// Downloads every remote file matched by `patterns` into `local_dir`.
    ///
    /// Wildcard patterns are matched against one `NLST` of the current
    /// remote directory.
    pub async fn download_many(
        &self,
        session: &mut ControlSession,
        patterns: &[String],
        local_dir: &Path,
    ) -> Result<Vec<BatchItem>, TransferError> {
        let mut listing: Option<Vec<String>> = None;
        let mut names: Vec<String> = Vec::new();
        for pattern in patterns {
            if has_glob_meta(pattern) && listing.is_none() {
                listing = Some(self.name_list(session, None).await?);
            }
            let available = listing.as_deref().unwrap_or(&[]);
            for name in match_remote_names(available, pattern)? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let local = match local_name_for(&name) {
                Ok(n) => local_dir.join(n),
                Err(e) => {
                    items.push(BatchItem {
                        name,
                        result: Err(e),
                    });
                    continue;
                }
            };

            if self.options.prompt && !self.confirm.confirm(&format!("mget {name}?")) {
                items.push(BatchItem {
                    name,
                    result: Ok(ItemOutcome::Skipped),
                });
                continue;
            }

            let result = self
                .download(session, &name, &local)
                .await
                .map(|bytes| ItemOutcome::Downloaded { bytes });
            let stop = matches!(result, Err(TransferError::Cancelled));
            items.push(BatchItem { name, result });
            if stop {
                break;
            }
        }

        Ok(items)
    }

    /// Negotiates a data channel, sends `command` and waits for the
    /// server's `1xx` before handing back the connected data socket.
    async fn begin(
        &self,
        session: &mut ControlSession,
        command: &Command,
    ) -> Result<(TcpStream, Option<u64>), TransferError> {
        ensure_ready(session)?;

        let channel = DataChannel::open(session, &self.cancel).await?;
        debug!(mode = ?channel.mode(), command = %command, "data channel ready");

        let reply = session.execute(command).await?;
        if !reply.is_positive_preliminary() {
            return Err(TransferError::Rejected(reply));
        }

        match channel.into_stream(&self.cancel).await {
            Ok(stream) => Ok((stream, size_hint(reply.message()))),
            Err(e) => {
                self.abandon(session).await;
                Err(e.into())
            }
        }
    }

    /// Reads the completion reply once the data socket is closed.
    async fn finish(
        &self,
        session: &mut ControlSession,
        moved: Result<u64, DataChannelError>,
        partial: u64,
    ) -> Result<u64, TransferError> {
        match moved {
            Ok(bytes) => {
                let reply = session.read_reply().await?;
                if reply.is_positive() {
                    Ok(bytes)
                } else {
                    Err(TransferError::Rejected(reply))
                }
            }
            Err(e) => {
                self.abandon(session).await;
                match e {
                    DataChannelError::Cancelled => Err(TransferError::Cancelled),
                    DataChannelError::Control(c) => Err(TransferError::Control(c)),
                    source => Err(TransferError::PartialTransfer {
                        bytes: partial,
                        source,
                    }),
                }
            }
        }
    }

    /// Consumes the reply the server sends for a broken transfer so the
    /// next command lines up with its own reply.
    async fn abandon(&self, session: &mut ControlSession) {
        match session.read_reply().await {
            Ok(reply) => debug!(%reply, "transfer abandoned"),
            Err(e) => debug!(error = %e, "no reply after abandoned transfer"),
        }
    }
}

fn ensure_ready(session: &ControlSession) -> Result<(), TransferError> {
    if !session.is_connected() {
        return Err(ControlError::NotConnected.into());
    }
    if !session.is_authenticated() {
        return Err(ControlError::NotAuthenticated.into());
    }
    Ok(())
}

async fn copy_all<R, W>(
    reader: &mut R,
    writer: &mut W,
    options: &PumpOptions,
    cancel: &CancellationToken,
) -> Result<u64, DataChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pump(reader, writer, options, cancel, |_| {}).await
}

/// Pulls the size out of a reply like
/// `150 Opening BINARY mode data connection for a.bin (1234 bytes).`
fn size_hint(message: &str) -> Option<u64> {
    let start = message.rfind('(')?;
    let rest = &message[start + 1..];
    let end = rest.find(" bytes")?;
    rest[..end].trim().parse().ok()
}

/// Emits throttled `Progress` events and remembers the last count.
struct ProgressReporter<'a> {
    orchestrator: &'a TransferOrchestrator,
    name: &'a str,
    total: Option<u64>,
    bytes: u64,
    last: Option<Instant>,
}

impl<'a> ProgressReporter<'a> {
    fn new(orchestrator: &'a TransferOrchestrator, name: &'a str, total: Option<u64>) -> Self {
        Self {
            orchestrator,
            name,
            total,
            bytes: 0,
            last: None,
        }
    }

    fn update(&mut self, bytes: u64) {
        self.bytes = bytes;
        let interval = self.orchestrator.options.progress_interval;
        let due = self.last.is_none_or(|t| t.elapsed() >= interval);
        if due || Some(bytes) == self.total {
            self.last = Some(Instant::now());
            self.orchestrator.emit(TransferEvent::Progress {
                name: self.name.to_string(),
                bytes,
                total: self.total,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AlwaysDecline, AlwaysProceed};
    use crate::testing::MockFtpServer;
    use guardftp_control::SessionOptions;
    use guardftp_protocol::ScanResult;
    use guardftp_scan_gateway::ScanFuture;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns a fixed verdict and records what it was asked to scan.
    struct FakeGateway {
        verdict: ScanResult,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FakeGateway {
        fn new(verdict: ScanResult) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn scanned(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl ScanGateway for FakeGateway {
        fn scan<'a>(&'a self, path: &'a Path, _cancel: &'a CancellationToken) -> ScanFuture<'a> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            let verdict = self.verdict.clone();
            Box::pin(async move { verdict })
        }
    }

    /// Records the questions it was asked.
    struct Recorder {
        answer: bool,
        questions: Mutex<Vec<String>>,
    }

    impl Confirm for Recorder {
        fn confirm(&self, question: &str) -> bool {
            self.questions.lock().unwrap().push(question.to_string());
            self.answer
        }
    }

    fn orchestrator(gateway: Arc<FakeGateway>, confirm: Arc<dyn Confirm>) -> TransferOrchestrator {
        TransferOrchestrator::new(
            gateway,
            confirm,
            TransferOptions {
                idle_timeout: Duration::from_secs(5),
                prompt: false,
                ..TransferOptions::default()
            },
        )
    }

    async fn logged_in(server: &MockFtpServer, passive: bool) -> ControlSession {
        let mut session = ControlSession::new(SessionOptions {
            explicit_tls: false,
            passive,
            ..SessionOptions::default()
        });
        session.connect("127.0.0.1", server.port()).await.unwrap();
        session.authenticate("user", "secret").await.unwrap();
        session
    }

    fn local_file(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn size_hint_reads_byte_count() {
        assert_eq!(
            size_hint("Opening BINARY mode data connection for a.bin (1234 bytes)."),
            Some(1234)
        );
        assert_eq!(size_hint("Here comes the directory listing."), None);
    }

    #[tokio::test]
    async fn clean_upload_is_stored() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "clean.txt", b"hello world");
        let gateway = FakeGateway::new(ScanResult::clean(""));
        let orch = orchestrator(gateway.clone(), Arc::new(AlwaysDecline));
        let mut session = logged_in(&server, true).await;

        let outcome = orch.upload(&mut session, &path, "clean.txt").await.unwrap();
        assert!(outcome.is_uploaded());
        assert_eq!(server.file("clean.txt").unwrap(), b"hello world");
        assert_eq!(gateway.scanned(), 1);
    }

    #[tokio::test]
    async fn infected_upload_never_touches_the_server() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "eicar.com", b"X5O!P%@AP");
        let gateway = FakeGateway::new(ScanResult::infected("Eicar-Signature FOUND"));
        let orch = orchestrator(gateway, Arc::new(AlwaysProceed));
        let mut session = logged_in(&server, true).await;
        let before = server.commands().len();

        let outcome = orch.upload(&mut session, &path, "eicar.com").await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Blocked(ref v) if v.is_infected()));
        assert_eq!(server.commands().len(), before);
        assert_eq!(server.data_connections(), 0);
        assert!(server.file("eicar.com").is_none());
    }

    #[tokio::test]
    async fn scan_error_declined_skips_upload() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "a.txt", b"abc");
        let gateway = FakeGateway::new(ScanResult::error("Failed to scan file", "refused"));
        let confirm = Arc::new(Recorder {
            answer: false,
            questions: Mutex::new(Vec::new()),
        });
        let orch = orchestrator(gateway, confirm.clone());
        let mut session = logged_in(&server, true).await;

        let outcome = orch.upload(&mut session, &path, "a.txt").await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Declined(_)));
        assert!(server.file("a.txt").is_none());
        let questions = confirm.questions.lock().unwrap();
        assert_eq!(questions.len(), 1);
        assert!(questions[0].contains("Failed to scan file"));
    }

    #[tokio::test]
    async fn scan_error_confirmed_uploads() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "a.txt", b"abc");
        let gateway = FakeGateway::new(ScanResult::error("Failed to scan file", "refused"));
        let orch = orchestrator(gateway, Arc::new(AlwaysProceed));
        let mut session = logged_in(&server, true).await;

        let outcome = orch.upload(&mut session, &path, "a.txt").await.unwrap();
        match outcome {
            UploadOutcome::Uploaded { bytes, verdict } => {
                assert_eq!(bytes, 3);
                assert!(verdict.is_error());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(server.file("a.txt").unwrap(), b"abc");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_scanned() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let gateway = FakeGateway::new(ScanResult::clean(""));
        let orch = orchestrator(gateway.clone(), Arc::new(AlwaysProceed));
        let mut session = logged_in(&server, true).await;

        let err = orch
            .upload(&mut session, &dir.path().join("nope"), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(_)));
        assert_eq!(gateway.scanned(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_reported_before_connection_state() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FakeGateway::new(ScanResult::clean(""));
        let orch = orchestrator(gateway.clone(), Arc::new(AlwaysProceed));
        let mut session = ControlSession::new(SessionOptions::default());

        let err = orch
            .upload(&mut session, &dir.path().join("nope"), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(_)));
        assert_eq!(gateway.scanned(), 0);
    }

    #[tokio::test]
    async fn upload_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "a.txt", b"abc");
        let gateway = FakeGateway::new(ScanResult::clean(""));
        let orch = orchestrator(gateway.clone(), Arc::new(AlwaysProceed));
        let mut session = ControlSession::new(SessionOptions::default());

        let err = orch.upload(&mut session, &path, "a.txt").await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Control(ControlError::NotConnected)
        ));
        assert_eq!(gateway.scanned(), 0);
    }

    #[tokio::test]
    async fn active_mode_upload_and_download() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "data.bin", &[7u8; 20_000]);
        let orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut session = logged_in(&server, false).await;

        orch.upload(&mut session, &path, "data.bin").await.unwrap();
        let target = dir.path().join("copy.bin");
        let bytes = orch.download(&mut session, "data.bin", &target).await.unwrap();
        assert_eq!(bytes, 20_000);
        assert_eq!(std::fs::read(&target).unwrap(), vec![7u8; 20_000]);
        assert!(server.commands().iter().any(|c| c.starts_with("PORT ")));
        assert!(!server.commands().iter().any(|c| c == "PASV"));
    }

    #[tokio::test]
    async fn rejected_download_leaves_no_file() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut session = logged_in(&server, true).await;

        let target = dir.path().join("missing.bin");
        let err = orch
            .download(&mut session, "missing.bin", &target)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Rejected(ref r) if r.code() == Some(550)));
        assert!(!target.exists());

        // The session is still usable.
        let names = orch.name_list(&mut session, None).await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn aborted_download_removes_partial_file() {
        let server = MockFtpServer::start().await;
        server.put_file("big.bin", &[3u8; 20_000]);
        server.abort_downloads_after(5000);
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut events = orch.take_events().unwrap();
        let mut session = logged_in(&server, true).await;

        let target = dir.path().join("big.bin");
        let err = orch
            .download(&mut session, "big.bin", &target)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Rejected(ref r) if r.code() == Some(426)));
        assert!(!target.exists());

        let mut written = 0;
        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                TransferEvent::Progress { bytes, .. } => written = written.max(bytes),
                TransferEvent::Failed { .. } => failed = true,
                _ => {}
            }
        }
        assert!(written > 0 && written <= 5000);
        assert!(failed);

        // The session is still usable.
        let names = orch.name_list(&mut session, None).await.unwrap();
        assert_eq!(names, vec!["big.bin".to_string()]);
    }

    #[tokio::test]
    async fn refused_store_is_rejected_and_session_survives() {
        let server = MockFtpServer::start().await;
        server.override_reply("STOR", "553 Could not create file.");
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "a.txt", b"abc");
        let orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut session = logged_in(&server, true).await;

        let err = orch.upload(&mut session, &path, "a.txt").await.unwrap_err();
        assert!(matches!(err, TransferError::Rejected(ref r) if r.code() == Some(553)));
        assert!(server.file("a.txt").is_none());

        session.print_working_directory().await.unwrap();
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn listings_return_server_text() {
        let server = MockFtpServer::start().await;
        server.put_file("a.txt", b"1");
        server.put_file("b.bin", b"22");
        let orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut session = logged_in(&server, true).await;

        let names = orch.name_list(&mut session, None).await.unwrap();
        assert_eq!(names, vec!["a.txt".to_string(), "b.bin".to_string()]);
        let listing = orch.list(&mut session, None).await.unwrap();
        assert!(listing.contains("b.bin"));
    }

    #[tokio::test]
    async fn batch_upload_reports_each_file() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        local_file(dir.path(), "one.txt", b"1");
        local_file(dir.path(), "two.txt", b"2");
        let orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut session = logged_in(&server, true).await;

        let pattern = dir.path().join("*.txt").to_string_lossy().into_owned();
        let missing = dir.path().join("gone.txt").to_string_lossy().into_owned();
        let items = orch
            .upload_many(&mut session, &[pattern, missing])
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_success() && items[1].is_success());
        assert!(matches!(items[2].result, Err(TransferError::FileNotFound(_))));
        assert_eq!(server.file("two.txt").unwrap(), b"2");
    }

    #[tokio::test]
    async fn batch_prompt_can_skip() {
        let server = MockFtpServer::start().await;
        server.put_file("a.log", b"a");
        server.put_file("b.log", b"b");
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        assert!(orch.toggle_prompt());
        let mut session = logged_in(&server, true).await;

        let items = orch
            .download_many(&mut session, &["*.log".to_string()], dir.path())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| matches!(i.result, Ok(ItemOutcome::Skipped))));
        assert!(!dir.path().join("a.log").exists());
    }

    #[tokio::test]
    async fn events_follow_the_upload() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "e.txt", b"events");
        let mut orch = orchestrator(
            FakeGateway::new(ScanResult::clean("")),
            Arc::new(AlwaysDecline),
        );
        let mut events = orch.take_events().unwrap();
        assert!(orch.take_events().is_none());
        let mut session = logged_in(&server, true).await;

        orch.upload(&mut session, &path, "e.txt").await.unwrap();
        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                TransferEvent::Scanning { .. } => "scanning",
                TransferEvent::Scanned { .. } => "scanned",
                TransferEvent::Progress { .. } => "progress",
                TransferEvent::Completed { .. } => "completed",
                TransferEvent::Failed { .. } => "failed",
            });
        }
        assert_eq!(kinds.first(), Some(&"scanning"));
        assert_eq!(kinds.get(1), Some(&"scanned"));
        assert_eq!(kinds.last(), Some(&"completed"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_upload_and_renews() {
        let server = MockFtpServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), "c.txt", b"cancel");
        let gateway = FakeGateway::new(ScanResult::clean(""));
        let mut orch = orchestrator(gateway.clone(), Arc::new(AlwaysDecline));
        let mut session = logged_in(&server, true).await;

        orch.cancel_token().cancel();
        let err = orch.upload(&mut session, &path, "c.txt").await.unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
        assert_eq!(gateway.scanned(), 0);

        let token = orch.renew_cancel_token();
        assert!(!token.is_cancelled());
        assert!(orch.upload(&mut session, &path, "c.txt").await.unwrap().is_uploaded());
    }
}
