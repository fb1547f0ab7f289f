//! Length-prefixed framing over an async stream (spec §4.9).
//!
//! Wire shape: 4-byte big-endian length, then that many bytes of (already
//! encrypted) payload. Mirrors `packet_server::read_header`/`read_packet`
//! and `packet_client::read_packet`'s two-phase read.

use repertory_common::{ApiError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Writes one frame: `len(payload) as u32 BE` followed by `payload`.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| ApiError::BufferOverflow)?;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(ApiError::Io)?;
    writer.write_all(payload).await.map_err(ApiError::Io)?;
    writer.flush().await.map_err(ApiError::Io)
}

/// Reads one frame, blocking until the full length-prefixed payload has
/// arrived or the connection is closed/errors.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(ApiError::Io)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(ApiError::Io)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn frame_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        assert_eq!(buf.len(), 4 + 5);

        let mut cursor = Cursor::new(buf);
        let payload = read_frame(&mut cursor).await.unwrap();
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn read_frame_on_truncated_stream_errors() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 5, 1, 2]);
        let result = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }
}
