//! Agent configuration.
//!
//! Stored as TOML, by default at:
//! - Linux: `~/.config/guardftp/agent.toml`
//! - Windows: `%APPDATA%/guardftp/agent.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use guardftp_agent_server::{EngineConfig, ServerConfig};
use guardftp_protocol::constants::{DEFAULT_AGENT_PORT, DEFAULT_BUFFER_SIZE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub scanner: ScannerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 picks a free port.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// How long an excess connection waits for a slot before it is closed.
    #[serde(default = "default_admission_wait_ms")]
    pub admission_wait_ms: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerSection {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_AGENT_PORT
}

fn default_max_connections() -> usize {
    5
}

fn default_admission_wait_ms() -> u64 {
    2000
}

fn default_io_timeout_secs() -> u64 {
    30
}

fn default_command() -> String {
    "clamscan".into()
}

fn default_args() -> Vec<String> {
    vec!["--no-summary".into(), "--infected".into()]
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp_files")
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            admission_wait_ms: default_admission_wait_ms(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            temp_dir: default_temp_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads `path`, or writes and returns the defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.max_connections == 0 {
            bail!("server.max_connections must be at least 1");
        }
        if self.server.io_timeout_secs == 0 || self.scanner.timeout_secs == 0 {
            bail!("timeouts must be at least 1 second");
        }
        if self.scanner.command.trim().is_empty() {
            bail!("scanner.command must not be empty");
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            max_connections: self.server.max_connections,
            admission_wait: Duration::from_millis(self.server.admission_wait_ms),
            temp_dir: self.scanner.temp_dir.clone(),
            io_timeout: Duration::from_secs(self.server.io_timeout_secs),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            command: self.scanner.command.clone(),
            args: self.scanner.args.clone(),
            timeout: Duration::from_secs(self.scanner.timeout_secs),
            ..EngineConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("guardftp").join("agent.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("guardftp")
            .join("agent.toml")
    }
}
