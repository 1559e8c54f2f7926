//! guardftp interactive client entry point.

mod app;
mod args;
mod check;
mod config;
mod prompt;
mod shell;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use guardftp_transfer::TransferEvent;

use crate::app::{App, Flow};
use crate::args::Cli;
use crate::config::Config;
use crate::prompt::StdioConfirm;
use crate::shell::ShellCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = Config::load(&path)?;
    cli.apply(&mut config);
    config.validate()?;
    tracing::info!(path = %path.display(), "configuration loaded");

    if cli.show_config {
        print!("{}", config.display_toml()?);
        return Ok(());
    }
    if cli.check {
        return check::run(&config).await;
    }

    let mut app = App::new(config, Arc::new(StdioConfirm), std::io::stdout());
    if let Some(events) = app.take_events() {
        tokio::spawn(print_events(events));
    }

    // Ctrl-C interrupts the running transfer, not the shell.
    let cancel_slot = app.cancel_slot();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            cancel_slot
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .cancel();
        }
    });

    app.execute(ShellCommand::Open {
        host: None,
        port: None,
    })
    .await;

    loop {
        print!("guardftp> ");
        std::io::stdout().flush()?;

        let Some(line) = read_line().await? else {
            println!();
            break;
        };
        if app.execute(shell::parse(&line)).await == Flow::Quit {
            return Ok(());
        }
    }

    app.shutdown().await;
    Ok(())
}

/// Reads one line from stdin. `None` at end of input.
async fn read_line() -> anyhow::Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|n| (n, line))
    })
    .await??;

    Ok(match line {
        (0, _) => None,
        (_, text) => Some(text),
    })
}

async fn print_events(mut events: mpsc::Receiver<TransferEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Scanning { path } => {
                eprintln!("Scanning {} ...", path.display());
            }
            TransferEvent::Scanned { verdict, .. } => {
                eprintln!("Scan result: {} - {}", verdict.status, verdict.message);
            }
            TransferEvent::Progress { name, bytes, total } => match total {
                Some(total) if total > 0 => {
                    eprint!("\r{name}: {bytes}/{total} bytes ({}%)", bytes * 100 / total);
                }
                _ => eprint!("\r{name}: {bytes} bytes"),
            },
            TransferEvent::Completed { .. } | TransferEvent::Failed { .. } => eprintln!(),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}
