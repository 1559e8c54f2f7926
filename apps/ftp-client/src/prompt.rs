//! Yes/no prompts for the transfer orchestrator.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use guardftp_transfer::Confirm;

/// Writes `question [y/N]: ` and reads one answer line.
///
/// Only `y` or `yes` (any case) count as yes. End of input is a no.
pub fn ask(question: &str, input: &mut dyn BufRead, output: &mut dyn Write) -> std::io::Result<bool> {
    write!(output, "{question} [y/N]: ")?;
    output.flush()?;

    let mut response = String::new();
    input.read_line(&mut response)?;
    Ok(matches!(
        response.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct StdioConfirm;

impl Confirm for StdioConfirm {
    fn confirm(&self, question: &str) -> bool {
        let answer = tokio::task::block_in_place(|| {
            let stdin = std::io::stdin();
            ask(question, &mut stdin.lock(), &mut std::io::stdout())
        });
        answer.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read answer; treating as no");
            false
        })
    }
}

/// Asks over arbitrary streams.
pub struct StreamConfirm<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> StreamConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<R: BufRead + Send, W: Write + Send> Confirm for StreamConfirm<R, W> {
    fn confirm(&self, question: &str) -> bool {
        let mut guard = self.io.lock().unwrap_or_else(|e| e.into_inner());
        let (input, output) = &mut *guard;
        ask(question, input, output).unwrap_or(false)
    }
}
