//! `--check`: can we reach the scan agent and the FTP server?

use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::Config;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens and closes a TCP connection to `host:port`.
pub async fn reachable(host: &str, port: u16, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("no answer within {}s", timeout.as_secs())),
    }
}

/// Prints one line per endpoint. Fails if either is unreachable.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let endpoints = [
        ("scan agent", &config.scan_agent.host, config.scan_agent.port),
        ("FTP server", &config.server.host, config.server.port),
    ];

    let mut failed = 0;
    for (name, host, port) in endpoints {
        match reachable(host, port, CHECK_TIMEOUT).await {
            Ok(()) => println!("{name} {host}:{port}: reachable"),
            Err(e) => {
                failed += 1;
                println!("{name} {host}:{port}: UNREACHABLE ({e})");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} endpoint(s) unreachable");
    }
    Ok(())
}
