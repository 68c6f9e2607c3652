//! Length-prefixed object framing.
//!
//! ```text
//! [len: u64 little-endian][bincode(object): len bytes]
//! ```
//!
//! Readers pass a limit; a frame announcing more than the limit is rejected
//! before any payload is allocated.

use crate::error::{Error, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 8;

/// Return size-limited bincode options to prevent OOM from malicious input.
fn bincode_options(limit: u64) -> impl Options {
    bincode::options().with_limit(limit)
}

/// Encode an object into a complete frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_frame<T: Serialize>(object: &T) -> Result<Vec<u8>> {
    let body = bincode_options(u64::MAX)
        .serialize(object)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u64).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one framed object and flush.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn write_object<W, T>(writer: &mut W, object: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(object)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed object of at most `max_len` encoded bytes.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the frame exceeds `max_len` or does not
/// decode, and [`Error::Io`] if the read fails.
pub async fn read_object<R, T>(reader: &mut R, max_len: u64) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut prefix = [0u8; PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;
    let len = u64::from_le_bytes(prefix);
    if len > max_len {
        return Err(Error::Protocol(format!(
            "object length {len} exceeds limit {max_len}"
        )));
    }

    let len = usize::try_from(len)
        .map_err(|_| Error::Protocol(format!("object length {len} not addressable")))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    bincode_options(max_len)
        .deserialize(&body)
        .map_err(|e| Error::Protocol(format!("failed to decode object: {e}")))
}
