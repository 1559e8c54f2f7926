fn main() {
    println!("Run `cargo test -p guardftp-e2e` to execute the end-to-end scenarios.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::sync::CancellationToken;

    use guardftp_agent_server::{
        AgentError, AgentServer, CommandEngine, EngineConfig, EngineFuture, ScanEngine,
        ServerConfig,
    };
    use guardftp_control::{ControlSession, SessionOptions};
    use guardftp_protocol::{ScanResult, ScanStatus};
    use guardftp_scan_gateway::{ScanClient, ScanClientConfig};
    use guardftp_transfer::testing::MockFtpServer;
    use guardftp_transfer::{AlwaysDecline, TransferOptions, TransferOrchestrator, UploadOutcome};

    const EICAR: &str =
        r"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
    const CLEAN_TEXT: &[u8] = b"This is a clean test file for scanning.\r\n";

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// In-process scanner: flags files containing the EICAR marker.
    struct SignatureEngine;

    impl ScanEngine for SignatureEngine {
        fn self_check(&self) -> EngineFuture<'_, Result<String, AgentError>> {
            Box::pin(async { Ok("signature-engine 1.0".to_string()) })
        }

        fn scan<'a>(&'a self, path: &'a Path) -> EngineFuture<'a, ScanResult> {
            Box::pin(async move {
                match tokio::fs::read(path).await {
                    Ok(bytes) if contains(&bytes, EICAR.as_bytes()) => ScanResult::infected(
                        format!("{}: Eicar-Test-Signature FOUND", path.display()),
                    ),
                    Ok(_) => ScanResult::clean(""),
                    Err(e) => ScanResult::error("Scan failed", e.to_string()),
                }
            })
        }
    }

    /// Runs a real subprocess per scan but skips the `--version` probe,
    /// which `sh` does not answer.
    #[cfg(unix)]
    struct ShellEngine(CommandEngine);

    #[cfg(unix)]
    impl ScanEngine for ShellEngine {
        fn self_check(&self) -> EngineFuture<'_, Result<String, AgentError>> {
            Box::pin(async { Ok("sh".to_string()) })
        }

        fn scan<'a>(&'a self, path: &'a Path) -> EngineFuture<'a, ScanResult> {
            self.0.scan(path)
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    struct Agent<E: ScanEngine> {
        server: Arc<AgentServer<E>>,
        port: u16,
        temp_dir: PathBuf,
    }

    impl<E: ScanEngine> Agent<E> {
        async fn start(engine: E, root: &Path) -> Self {
            let temp_dir = root.join("agent-temp");
            let config = ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                max_connections: 2,
                admission_wait: Duration::from_millis(500),
                temp_dir: temp_dir.clone(),
                io_timeout: Duration::from_secs(5),
                ..ServerConfig::default()
            };
            let server = AgentServer::new(config, engine).unwrap();
            let runner = Arc::clone(&server);
            tokio::spawn(async move { runner.run().await });

            for _ in 0..200 {
                let port = server.port().await;
                if port > 0 {
                    return Self {
                        server,
                        port,
                        temp_dir,
                    };
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("agent never bound");
        }

        fn scan_client(&self) -> ScanClient {
            ScanClient::new(ScanClientConfig {
                port: self.port,
                result_timeout: Duration::from_secs(10),
                ..ScanClientConfig::default()
            })
        }

        /// Waits for every handler to release its temp file.
        async fn assert_temp_dir_empties(&self) {
            for _ in 0..200 {
                if fs::read_dir(&self.temp_dir).unwrap().count() == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("temp files left in {}", self.temp_dir.display());
        }
    }

    impl<E: ScanEngine> Drop for Agent<E> {
        fn drop(&mut self) {
            self.server.shutdown();
        }
    }

    /// Raw scan-gateway exchange, byte for byte.
    async fn raw_exchange(port: u16, name: &str, payload: &[u8]) -> ScanResult {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut ack = [0u8; 64];

        stream.write_all(format!("FILENAME:{name}").as_bytes()).await.unwrap();
        let n = stream.read(&mut ack).await.unwrap();
        assert_eq!(&ack[..n], b"READY");

        stream
            .write_all(format!("SIZE:{}", payload.len()).as_bytes())
            .await
            .unwrap();
        let n = stream.read(&mut ack).await.unwrap();
        assert_eq!(&ack[..n], b"READY");

        stream.write_all(payload).await.unwrap();
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn logged_in(ftp: &MockFtpServer, passive: bool) -> ControlSession {
        let mut session = ControlSession::new(SessionOptions {
            passive,
            ..SessionOptions::default()
        });
        session.connect("127.0.0.1", ftp.port()).await.unwrap();
        session.authenticate("testuser", "testpass").await.unwrap();
        session
    }

    fn orchestrator(agent_client: ScanClient) -> TransferOrchestrator {
        TransferOrchestrator::new(
            Arc::new(agent_client),
            Arc::new(AlwaysDecline),
            TransferOptions {
                prompt: false,
                ..TransferOptions::default()
            },
        )
    }

    // --- Scan result schema ---

    #[test]
    fn fixtures_round_trip_through_scan_result() {
        for name in [
            "scan_result_clean.json",
            "scan_result_infected.json",
            "scan_result_error.json",
            "scan_result_server_error.json",
        ] {
            let fixture = load_fixture(name);
            let parsed: ScanResult = serde_json::from_value(fixture.clone())
                .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
            let reserialized = serde_json::to_value(&parsed).unwrap();
            assert_eq!(fixture, reserialized, "roundtrip mismatch for {name}");
        }
    }

    #[test]
    fn fixture_statuses() {
        let clean: ScanResult = serde_json::from_value(load_fixture("scan_result_clean.json")).unwrap();
        assert_eq!(clean, ScanResult::clean(""));
        let infected: ScanResult =
            serde_json::from_value(load_fixture("scan_result_infected.json")).unwrap();
        assert_eq!(infected.status, ScanStatus::Infected);
        assert_eq!(infected.message, "Virus detected");
    }

    // --- Scenario A: clean file through the real agent ---

    #[tokio::test]
    async fn scenario_a_clean_file_is_ok() {
        assert_eq!(CLEAN_TEXT.len(), 41);
        let root = tempfile::tempdir().unwrap();
        let agent = Agent::start(SignatureEngine, root.path()).await;

        let result = raw_exchange(agent.port, "clean.txt", CLEAN_TEXT).await;
        assert_eq!(result.status, ScanStatus::Ok);
        assert_eq!(result.message, "File is clean");
        agent.assert_temp_dir_empties().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scenario_a_and_b_with_subprocess_exit_codes() {
        let root = tempfile::tempdir().unwrap();
        let engine = ShellEngine(CommandEngine::new(EngineConfig {
            command: "sh".into(),
            args: vec![
                "-c".into(),
                "if grep -q EICAR-STANDARD-ANTIVIRUS-TEST-FILE \"$1\"; then \
                 echo \"$1: Eicar-Signature FOUND\"; exit 1; fi; exit 0"
                    .into(),
                "clamscan".into(),
            ],
            timeout: Duration::from_secs(10),
            ..EngineConfig::default()
        }));
        let agent = Agent::start(engine, root.path()).await;

        let clean = raw_exchange(agent.port, "clean.txt", CLEAN_TEXT).await;
        assert_eq!(clean.status, ScanStatus::Ok);

        let infected = raw_exchange(agent.port, "eicar.com", EICAR.as_bytes()).await;
        assert_eq!(infected.status, ScanStatus::Infected);
        assert!(infected.details.contains("Eicar-Signature FOUND"));
        agent.assert_temp_dir_empties().await;
    }

    // --- Scenario B: EICAR blocks the upload ---

    #[tokio::test]
    async fn scenario_b_eicar_upload_is_blocked() {
        let root = tempfile::tempdir().unwrap();
        let agent = Agent::start(SignatureEngine, root.path()).await;
        let ftp = MockFtpServer::start().await;
        let mut session = logged_in(&ftp, true).await;
        let orch = orchestrator(agent.scan_client());

        let path = root.path().join("eicar.com");
        fs::write(&path, EICAR).unwrap();
        let before = ftp.commands();

        let outcome = orch.upload(&mut session, &path, "eicar.com").await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Blocked(ref v) if v.is_infected()));
        assert_eq!(ftp.commands(), before);
        assert_eq!(ftp.data_connections(), 0);
        assert!(ftp.file("eicar.com").is_none());
        agent.assert_temp_dir_empties().await;
    }

    #[tokio::test]
    async fn clean_upload_reaches_the_server() {
        let root = tempfile::tempdir().unwrap();
        let agent = Agent::start(SignatureEngine, root.path()).await;
        let ftp = MockFtpServer::start().await;
        let mut session = logged_in(&ftp, true).await;
        let orch = orchestrator(agent.scan_client());

        let path = root.path().join("clean.txt");
        fs::write(&path, CLEAN_TEXT).unwrap();

        let outcome = orch.upload(&mut session, &path, "clean.txt").await.unwrap();
        assert!(outcome.is_uploaded());
        assert_eq!(ftp.file("clean.txt").unwrap(), CLEAN_TEXT);
    }

    // --- Upload invariant ---

    #[tokio::test]
    async fn infected_uploads_never_open_a_data_channel() {
        let root = tempfile::tempdir().unwrap();
        let agent = Agent::start(SignatureEngine, root.path()).await;
        let ftp = MockFtpServer::start().await;
        let orch = orchestrator(agent.scan_client());

        for (i, passive) in [true, false].into_iter().enumerate() {
            let mut session = logged_in(&ftp, passive).await;
            let path = root.path().join(format!("infected-{i}.bin"));
            let mut body = vec![b'.'; 100 * i];
            body.extend_from_slice(EICAR.as_bytes());
            fs::write(&path, &body).unwrap();

            let outcome = orch.upload(&mut session, &path, "x.bin").await.unwrap();
            assert!(matches!(outcome, UploadOutcome::Blocked(_)));
        }

        let commands = ftp.commands();
        assert!(
            !commands
                .iter()
                .any(|c| c.starts_with("STOR") || c.starts_with("PASV") || c.starts_with("PORT")),
            "unexpected traffic: {commands:?}"
        );
        assert_eq!(ftp.data_connections(), 0);
    }

    #[tokio::test]
    async fn unreachable_agent_is_never_treated_as_clean() {
        let root = tempfile::tempdir().unwrap();
        let ftp = MockFtpServer::start().await;
        let mut session = logged_in(&ftp, true).await;

        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);
        let orch = orchestrator(ScanClient::new(ScanClientConfig {
            port,
            ..ScanClientConfig::default()
        }));

        let path = root.path().join("a.txt");
        fs::write(&path, b"abc").unwrap();
        let outcome = orch.upload(&mut session, &path, "a.txt").await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Declined(ref v) if v.is_error()));
        assert!(ftp.file("a.txt").is_none());
    }

    // --- Agent cleanup after a broken upload ---

    #[tokio::test]
    async fn mid_stream_disconnect_leaves_no_temp_file() {
        let root = tempfile::tempdir().unwrap();
        let agent = Agent::start(SignatureEngine, root.path()).await;

        let mut stream = TcpStream::connect(("127.0.0.1", agent.port)).await.unwrap();
        let mut ack = [0u8; 16];
        stream.write_all(b"FILENAME:partial.bin").await.unwrap();
        assert_eq!(stream.read(&mut ack).await.unwrap(), 5);
        stream.write_all(b"SIZE:1000").await.unwrap();
        assert_eq!(stream.read(&mut ack).await.unwrap(), 5);
        stream.write_all(&[0u8; 10]).await.unwrap();
        drop(stream);

        agent.assert_temp_dir_empties().await;
    }

    // --- Scenario C: greeting codes ---

    #[tokio::test]
    async fn scenario_c_greeting_decides_connect() {
        let ready = MockFtpServer::start().await;
        let mut session = ControlSession::new(SessionOptions::default());
        let greeting = session.connect("127.0.0.1", ready.port()).await.unwrap();
        assert_eq!(greeting.code(), Some(220));
        assert!(session.is_connected());

        let busy = MockFtpServer::with_greeting("421 Service not available").await;
        let mut session = ControlSession::new(SessionOptions::default());
        assert!(session.connect("127.0.0.1", busy.port()).await.is_err());
        assert!(!session.is_connected());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn cancelled_scan_does_not_upload() {
        let root = tempfile::tempdir().unwrap();
        let agent = Agent::start(SignatureEngine, root.path()).await;
        let client = agent.scan_client();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let path = root.path().join("a.txt");
        fs::write(&path, b"abc").unwrap();
        let result = client.scan_file(&path, &cancel).await;
        assert!(result.is_error());
    }
}
