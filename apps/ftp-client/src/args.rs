use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "guardftp")]
#[command(version, about = "FTP client that virus-scans every upload before sending it")]
pub struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// FTP server host
    #[arg(long)]
    pub host: Option<String>,

    /// FTP server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Login name
    #[arg(long)]
    pub user: Option<String>,

    /// Login password
    #[arg(long)]
    pub password: Option<String>,

    /// Use passive data connections
    #[arg(long, conflicts_with = "active")]
    pub passive: bool,

    /// Use active data connections
    #[arg(long)]
    pub active: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Test that the scan agent and FTP server are reachable, then exit
    #[arg(long)]
    pub check: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(user) = &self.user {
            config.server.username = user.clone();
        }
        if let Some(password) = &self.password {
            config.server.password = password.clone();
        }
        if self.passive {
            config.client.passive_mode = true;
        }
        if self.active {
            config.client.passive_mode = false;
        }
    }
}
