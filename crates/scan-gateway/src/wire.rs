//! Scan gateway codec, shared by the client and the agent.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use guardftp_protocol::ScanResult;

use crate::error::GatewayError;

/// Prefix of the first client message.
pub const FILENAME_PREFIX: &str = "FILENAME:";

/// Prefix of the second client message.
pub const SIZE_PREFIX: &str = "SIZE:";

/// Agent acknowledgement after each client message.
pub const READY: &str = "READY";

/// Largest text message read in one go.
pub const MAX_MESSAGE: usize = 1024;

/// Largest result document the client accepts.
pub const MAX_RESULT: usize = 64 * 1024;

/// Writes one text message and flushes.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    text: &str,
) -> Result<(), GatewayError> {
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one text message (a single read of at most [`MAX_MESSAGE`]
/// bytes) with trailing CR/LF removed.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, GatewayError> {
    let mut buf = [0u8; MAX_MESSAGE];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(GatewayError::Closed);
    }
    let text = String::from_utf8_lossy(&buf[..n]);
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Returns the declared name of a `FILENAME:` message.
pub fn parse_filename(message: &str) -> Option<&str> {
    message
        .strip_prefix(FILENAME_PREFIX)
        .filter(|name| !name.trim().is_empty())
}

/// Returns the declared byte count of a `SIZE:` message.
pub fn parse_size(message: &str) -> Option<u64> {
    message.strip_prefix(SIZE_PREFIX)?.trim().parse().ok()
}

/// Reads the result document until the peer closes.
pub async fn read_result<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ScanResult, GatewayError> {
    let mut buf = Vec::new();
    reader
        .take(MAX_RESULT as u64 + 1)
        .read_to_end(&mut buf)
        .await?;

    if buf.is_empty() {
        return Err(GatewayError::Closed);
    }
    if buf.len() > MAX_RESULT {
        return Err(GatewayError::ResultTooLarge(MAX_RESULT));
    }
    Ok(serde_json::from_slice(&buf)?)
}

/// Writes the result document and flushes.
pub async fn write_result<W: AsyncWrite + Unpin>(
    writer: &mut W,
    result: &ScanResult,
) -> Result<(), GatewayError> {
    let json = result.to_json()?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
