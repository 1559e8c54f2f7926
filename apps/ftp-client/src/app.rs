//! Command dispatch for the interactive shell.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use guardftp_control::ControlSession;
use guardftp_protocol::{ScanResult, TransferType};
use guardftp_scan_gateway::{ScanClient, ScanGateway};
use guardftp_transfer::{
    BatchItem, Confirm, ItemOutcome, TransferEvent, TransferOrchestrator, UploadOutcome,
    local_name_for,
};

use crate::config::Config;
use crate::shell::{HELP, ShellCommand};

/// Whether the shell keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The client: one control session plus the transfer orchestrator.
pub struct App<W: Write> {
    config: Config,
    session: ControlSession,
    transfers: TransferOrchestrator,
    /// The token Ctrl-C cancels. Replaced before each command.
    cancel_slot: Arc<Mutex<CancellationToken>>,
    out: W,
}

impl<W: Write> App<W> {
    /// Builds a client that scans through the configured agent.
    pub fn new(config: Config, confirm: Arc<dyn Confirm>, out: W) -> Self {
        let gateway = Arc::new(ScanClient::new(config.scan_client_config()));
        Self::with_gateway(config, gateway, confirm, out)
    }

    pub fn with_gateway(
        config: Config,
        gateway: Arc<dyn ScanGateway>,
        confirm: Arc<dyn Confirm>,
        out: W,
    ) -> Self {
        let session = ControlSession::new(config.session_options());
        let transfers = TransferOrchestrator::new(gateway, confirm, config.transfer_options());
        let cancel_slot = Arc::new(Mutex::new(transfers.cancel_token()));
        Self {
            config,
            session,
            transfers,
            cancel_slot,
            out,
        }
    }

    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        self.transfers.take_events()
    }

    /// Shared handle to the token of the command in progress.
    pub fn cancel_slot(&self) -> Arc<Mutex<CancellationToken>> {
        Arc::clone(&self.cancel_slot)
    }

    #[cfg(test)]
    pub fn session(&self) -> &ControlSession {
        &self.session
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Runs one command. Failures are printed; the shell always continues
    /// unless the command was `quit`.
    pub async fn execute(&mut self, command: ShellCommand) -> Flow {
        let token = self.transfers.renew_cancel_token();
        *self.cancel_slot.lock().unwrap_or_else(|e| e.into_inner()) = token;

        match self.run(command).await {
            Ok(flow) => flow,
            Err(e) => {
                tracing::debug!(error = ?e, "command failed");
                if let Err(write_err) = writeln!(self.out, "Error: {e:#}") {
                    tracing::warn!(error = %write_err, "cannot write to output");
                }
                Flow::Continue
            }
        }
    }

    /// Disconnects if still connected.
    pub async fn shutdown(&mut self) {
        if self.session.is_connected() {
            self.session.disconnect().await;
        }
    }

    async fn run(&mut self, command: ShellCommand) -> anyhow::Result<Flow> {
        match command {
            ShellCommand::Empty => {}
            ShellCommand::Help => writeln!(self.out, "{HELP}")?,
            ShellCommand::Quit => {
                self.shutdown().await;
                writeln!(self.out, "Goodbye.")?;
                return Ok(Flow::Quit);
            }
            ShellCommand::Unrecognized(word) => writeln!(self.out, "?Invalid command: {word}")?,
            ShellCommand::Usage(usage) => writeln!(self.out, "usage: {usage}")?,
            ShellCommand::Open { host, port } => self.open(host, port).await?,
            ShellCommand::Close => {
                self.session.disconnect().await;
                writeln!(self.out, "Disconnected.")?;
            }
            ShellCommand::List(path) => {
                let text = self.transfers.list(&mut self.session, path.as_deref()).await?;
                write!(self.out, "{text}")?;
            }
            ShellCommand::Cd(dir) => {
                self.session.change_directory(&dir).await?;
                writeln!(
                    self.out,
                    "Directory changed to {}",
                    self.session.session().working_directory()
                )?;
            }
            ShellCommand::Pwd => {
                self.session.print_working_directory().await?;
                writeln!(self.out, "{}", self.session.session().working_directory())?;
            }
            ShellCommand::Mkdir(dir) => {
                let reply = self.session.make_directory(&dir).await?;
                writeln!(self.out, "{}", reply.message())?;
            }
            ShellCommand::Rmdir(dir) => {
                let reply = self.session.remove_directory(&dir).await?;
                writeln!(self.out, "{}", reply.message())?;
            }
            ShellCommand::Delete(name) => {
                let reply = self.session.delete_file(&name).await?;
                writeln!(self.out, "{}", reply.message())?;
            }
            ShellCommand::Rename { from, to } => {
                let reply = self.session.rename(&from, &to).await?;
                writeln!(self.out, "{}", reply.message())?;
            }
            ShellCommand::Get { remote, local } => {
                let local = match local {
                    Some(l) => PathBuf::from(l),
                    None => PathBuf::from(local_name_for(&remote)?),
                };
                let bytes = self
                    .transfers
                    .download(&mut self.session, &remote, &local)
                    .await?;
                writeln!(
                    self.out,
                    "Downloaded {remote} -> {} ({bytes} bytes)",
                    local.display()
                )?;
            }
            ShellCommand::Put { local, remote } => {
                let path = PathBuf::from(&local);
                let remote = match remote {
                    Some(r) => r,
                    None => remote_name_for(&path)?,
                };
                let outcome = self
                    .transfers
                    .upload(&mut self.session, &path, &remote)
                    .await?;
                self.report_upload(&local, &outcome)?;
            }
            ShellCommand::Mput(patterns) => {
                let items = self
                    .transfers
                    .upload_many(&mut self.session, &patterns)
                    .await?;
                self.report_batch("uploaded", &items)?;
            }
            ShellCommand::Mget(patterns) => {
                let items = self
                    .transfers
                    .download_many(&mut self.session, &patterns, Path::new("."))
                    .await?;
                self.report_batch("downloaded", &items)?;
            }
            ShellCommand::Ascii => {
                self.session.set_transfer_mode(TransferType::Ascii).await?;
                writeln!(self.out, "Transfer type set to ASCII.")?;
            }
            ShellCommand::Binary => {
                self.session.set_transfer_mode(TransferType::Binary).await?;
                writeln!(self.out, "Transfer type set to binary.")?;
            }
            ShellCommand::Passive => {
                let on = self.session.toggle_passive();
                writeln!(self.out, "Passive mode {}.", if on { "on" } else { "off" })?;
            }
            ShellCommand::Prompt => {
                let on = self.transfers.toggle_prompt();
                writeln!(self.out, "Interactive mode {}.", if on { "on" } else { "off" })?;
            }
            ShellCommand::Status => self.print_status()?,
        }
        Ok(Flow::Continue)
    }

    async fn open(&mut self, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
        let host = host.unwrap_or_else(|| self.config.server.host.clone());
        let port = port.unwrap_or(self.config.server.port);

        let greeting = self
            .session
            .connect(&host, port)
            .await
            .with_context(|| format!("cannot connect to {host}:{port}"))?;
        writeln!(self.out, "Connected to {host}:{port}.")?;
        writeln!(self.out, "{}", greeting.message())?;

        let user = self.config.server.username.clone();
        let password = self.config.server.password.clone();
        let reply = self.session.authenticate(&user, &password).await?;
        writeln!(self.out, "{}", reply.message())?;
        Ok(())
    }

    fn report_upload(&mut self, local: &str, outcome: &UploadOutcome) -> anyhow::Result<()> {
        match outcome {
            UploadOutcome::Uploaded { bytes, verdict } => {
                let note = if verdict.is_clean() { "scan clean" } else { "NOT scanned" };
                writeln!(self.out, "Uploaded {local} ({bytes} bytes, {note}).")?;
            }
            UploadOutcome::Blocked(verdict) => {
                writeln!(self.out, "UPLOAD BLOCKED: {local}: {}", describe(verdict))?;
            }
            UploadOutcome::Declined(verdict) => {
                writeln!(self.out, "Upload cancelled: {local}: {}", describe(verdict))?;
            }
        }
        Ok(())
    }

    fn report_batch(&mut self, verb: &str, items: &[BatchItem]) -> anyhow::Result<()> {
        for item in items {
            match &item.result {
                Ok(ItemOutcome::Uploaded(outcome)) => self.report_upload(&item.name, outcome)?,
                Ok(ItemOutcome::Downloaded { bytes }) => {
                    writeln!(self.out, "Downloaded {} ({bytes} bytes).", item.name)?
                }
                Ok(ItemOutcome::Skipped) => writeln!(self.out, "Skipped {}.", item.name)?,
                Err(e) => writeln!(self.out, "Failed {}: {e}", item.name)?,
            }
        }
        let done = items.iter().filter(|i| i.is_success()).count();
        writeln!(self.out, "{done} of {} files {verb}.", items.len())?;
        Ok(())
    }

    fn print_status(&mut self) -> anyhow::Result<()> {
        let status = self.session.status();
        let state = &status.session;
        match status.peer {
            Some(peer) => writeln!(self.out, "Connected to {peer}.")?,
            None => writeln!(self.out, "Not connected.")?,
        }
        writeln!(
            self.out,
            "Logged in: {}",
            match (&status.user, state.authenticated()) {
                (Some(user), true) => user.as_str(),
                _ => "no",
            }
        )?;
        writeln!(self.out, "Directory: {}", state.working_directory())?;
        writeln!(self.out, "Transfer type: {}", state.transfer_type())?;
        writeln!(
            self.out,
            "Data connections: {}",
            if state.passive() { "passive" } else { "active" }
        )?;
        writeln!(
            self.out,
            "Prompting: {}",
            if self.transfers.options().prompt { "on" } else { "off" }
        )?;
        writeln!(
            self.out,
            "Scan agent: {}:{}",
            self.config.scan_agent.host, self.config.scan_agent.port
        )?;
        Ok(())
    }
}

fn remote_name_for(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))
}

fn describe(verdict: &ScanResult) -> String {
    if verdict.details.is_empty() {
        verdict.message.clone()
    } else {
        format!("{} ({})", verdict.message, verdict.details)
    }
}
