//! Chunked byte copy between a data socket and local storage.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use guardftp_protocol::constants::DEFAULT_BUFFER_SIZE;

use crate::error::DataChannelError;

/// Tunables for [`pump`].
#[derive(Debug, Clone)]
pub struct PumpOptions {
    /// Size of each read.
    pub buffer_size: usize,
    /// Longest wait for a single read before giving up.
    pub idle_timeout: Duration,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Copies `reader` into `writer` until EOF, in `buffer_size` chunks.
///
/// `progress` is called with the running total after every chunk. The
/// writer is flushed before returning. Returns the byte count.
pub async fn pump<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    options: &PumpOptions,
    cancel: &CancellationToken,
    mut progress: F,
) -> Result<u64, DataChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; options.buffer_size.max(1)];
    let mut total: u64 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(options.idle_timeout, reader.read(&mut buf)) => {
                match result {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };
        if n == 0 {
            break;
        }

        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        progress(total);
    }

    writer.flush().await?;
    Ok(total)
}
