//! Reply framing on the control connection.
//!
//! A reply is one line, or for `ddd-` openers every line up to and
//! including `ddd ` with the same code.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use guardftp_protocol::Reply;
use guardftp_protocol::constants::MAX_REPLY_LINE;
use guardftp_protocol::reply::{is_final_line, opens_multiline};

use crate::error::ControlError;

/// Maximum number of lines accepted in one multi-line reply.
pub const MAX_REPLY_LINES: usize = 512;

/// Reads one complete reply from `reader`.
///
/// A reply whose first line carries no valid code is returned as
/// [`ControlError::Malformed`].
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply, ControlError>
where
    R: AsyncBufRead + Unpin,
{
    let first = read_line(reader).await?;
    let mut raw = first.clone();

    if opens_multiline(&first) {
        let code = Reply::parse(first.as_str()).code();
        if let Some(code) = code {
            let mut count = 1;
            loop {
                let line = read_line(reader).await?;
                raw.push_str(&line);
                count += 1;
                if is_final_line(line.trim_end_matches(['\r', '\n']), code) {
                    break;
                }
                if count >= MAX_REPLY_LINES {
                    return Err(ControlError::Protocol(format!(
                        "multi-line reply exceeds {MAX_REPLY_LINES} lines"
                    )));
                }
            }
        }
    }

    let reply = Reply::parse(raw.trim_end());
    if reply.is_malformed() {
        return Err(ControlError::Malformed(reply.raw().to_string()));
    }
    Ok(reply)
}

/// Reads a single line, CRLF included, capped at [`MAX_REPLY_LINE`] bytes.
async fn read_line<R>(reader: &mut R) -> Result<String, ControlError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_REPLY_LINE as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "control connection closed by server",
        )
        .into());
    }
    if buf.last() != Some(&b'\n') && n >= MAX_REPLY_LINE {
        return Err(ControlError::Protocol(format!(
            "reply line exceeds {MAX_REPLY_LINE} bytes"
        )));
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}
