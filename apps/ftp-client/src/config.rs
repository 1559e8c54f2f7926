//! Client configuration.
//!
//! Stored as TOML, by default at:
//! - Linux: `~/.config/guardftp/client.toml`
//! - Windows: `%APPDATA%/guardftp/client.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use guardftp_control::SessionOptions;
use guardftp_protocol::constants::{DEFAULT_AGENT_PORT, DEFAULT_BUFFER_SIZE, DEFAULT_CONTROL_PORT};
use guardftp_scan_gateway::ScanClientConfig;
use guardftp_transfer::TransferOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub scan_agent: ScanAgentSection,
    #[serde(default)]
    pub client: ClientSection,
}

/// The FTP server to log in to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAgentSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_agent_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_true")]
    pub passive_mode: bool,
    /// Data connection timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_control_timeout_secs")]
    pub control_timeout_secs: u64,
    /// Send `AUTH TLS` before logging in. The connection stays cleartext.
    #[serde(default = "default_true")]
    pub explicit_tls: bool,
    /// Ask before each file of `mput`/`mget`.
    #[serde(default = "default_true")]
    pub prompt: bool,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_ftp_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

fn default_username() -> String {
    "testuser".into()
}

fn default_password() -> String {
    "testpass".into()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_control_timeout_secs() -> u64 {
    10
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_ftp_port(),
            username: default_username(),
            password: default_password(),
        }
    }
}

impl Default for ScanAgentSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_agent_port(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            passive_mode: true,
            timeout_secs: default_timeout_secs(),
            buffer_size: default_buffer_size(),
            control_timeout_secs: default_control_timeout_secs(),
            explicit_tls: true,
            prompt: true,
        }
    }
}

impl Config {
    /// Loads `path`, or writes and returns the defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
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

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file holds a password.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        if self.server.port == 0 {
            bail!("server.port must not be 0");
        }
        if self.scan_agent.host.trim().is_empty() {
            bail!("scan_agent.host must not be empty");
        }
        if self.scan_agent.port == 0 {
            bail!("scan_agent.port must not be 0");
        }
        if self.client.timeout_secs == 0 || self.client.control_timeout_secs == 0 {
            bail!("client timeouts must be at least 1 second");
        }
        if self.client.buffer_size == 0 {
            bail!("client.buffer_size must be at least 1");
        }
        Ok(())
    }

    /// TOML for `--show-config`, with the password masked.
    pub fn display_toml(&self) -> anyhow::Result<String> {
        let mut shown = self.clone();
        if !shown.server.password.is_empty() {
            shown.server.password = "****".into();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            control_timeout: Duration::from_secs(self.client.control_timeout_secs),
            data_timeout: Duration::from_secs(self.client.timeout_secs),
            explicit_tls: self.client.explicit_tls,
            passive: self.client.passive_mode,
        }
    }

    pub fn scan_client_config(&self) -> ScanClientConfig {
        let control = Duration::from_secs(self.client.control_timeout_secs);
        ScanClientConfig {
            host: self.scan_agent.host.clone(),
            port: self.scan_agent.port,
            connect_timeout: control,
            reply_timeout: control,
            buffer_size: self.client.buffer_size,
            ..ScanClientConfig::default()
        }
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            buffer_size: self.client.buffer_size,
            idle_timeout: Duration::from_secs(self.client.timeout_secs),
            prompt: self.client.prompt,
            ..TransferOptions::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("guardftp").join("client.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("guardftp")
            .join("client.toml")
    }
}
