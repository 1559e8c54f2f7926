//! Scanner seam and the external-command engine.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info, warn};

use guardftp_protocol::ScanResult;

use crate::AgentError;

/// A boxed future returned by engine methods.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that scans a file on disk.
///
/// `scan` never fails: problems running the scanner come back as an
/// `ERROR` result.
pub trait ScanEngine: Send + Sync + 'static {
    /// Verifies the scanner can be invoked. Returns a version string.
    fn self_check(&self) -> EngineFuture<'_, Result<String, AgentError>>;

    /// Scans the file at `path`.
    fn scan<'a>(&'a self, path: &'a Path) -> EngineFuture<'a, ScanResult>;
}

/// How to invoke the external scanner.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Program name or path, e.g. `clamscan`.
    pub command: String,
    /// Arguments placed before the file path.
    pub args: Vec<String>,
    /// Bound on one scan.
    pub timeout: Duration,
    /// Bound on the `--version` self-check.
    pub check_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "clamscan".into(),
            args: vec!["--no-summary".into(), "--infected".into()],
            timeout: Duration::from_secs(60),
            check_timeout: Duration::from_secs(10),
        }
    }
}

/// Runs a clamscan-compatible program as a subprocess.
///
/// Exit code 0 is clean, 1 is infected, anything else (or a timeout) is
/// an error. Stdout becomes `details` for verdicts, stderr for errors.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: EngineConfig,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn run_scan(&self, path: &Path) -> ScanResult {
        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                error!(command = %self.config.command, error = %e, "cannot start scanner");
                return ScanResult::error("Scan failed", e.to_string());
            }
        };

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ScanResult::error("Scan failed", e.to_string()),
            Err(_) => {
                error!(path = %path.display(), "scan timed out");
                return ScanResult::error("Scan timeout", "Scan took too long");
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        match output.status.code() {
            Some(0) => {
                info!(path = %path.display(), "file clean");
                ScanResult::clean(stdout)
            }
            Some(1) => {
                warn!(path = %path.display(), details = %stdout, "file infected");
                ScanResult::infected(stdout)
            }
            _ => {
                error!(status = %output.status, %stderr, "scanner error");
                let details = if stderr.is_empty() {
                    format!("scanner exited with {}", output.status)
                } else {
                    stderr
                };
                ScanResult::error("Scan failed", details)
            }
        }
    }

    async fn run_self_check(&self) -> Result<String, AgentError> {
        let output = Command::new(&self.config.command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.config.check_timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AgentError::SelfCheck(format!(
                    "cannot run {}: {e}",
                    self.config.command
                )));
            }
            Err(_) => {
                return Err(AgentError::SelfCheck(format!(
                    "{} --version timed out",
                    self.config.command
                )));
            }
        };

        if !output.status.success() {
            return Err(AgentError::SelfCheck(format!(
                "{} --version exited with {}",
                self.config.command, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl ScanEngine for CommandEngine {
    fn self_check(&self) -> EngineFuture<'_, Result<String, AgentError>> {
        Box::pin(self.run_self_check())
    }

    fn scan<'a>(&'a self, path: &'a Path) -> EngineFuture<'a, ScanResult> {
        Box::pin(self.run_scan(path))
    }
}
