//! Length-prefixed framing: 4-byte big-endian length prefix, then exactly
//! that many bytes of UTF-8 JSON. Grounded on the pack's UDS event-forwarding
//! loop (`astrid-kernel::socket::handle_client`), generalised from a single
//! fixed message shape into a reusable pair over any `AsyncRead`/`AsyncWrite`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{IpcError, Result};

/// Frames larger than this are rejected before the allocation is made.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(IpcError::FrameTooLarge { size: len, max: MAX_FRAME_BYTES });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| IpcError::FrameTooLarge {
        size: u32::MAX,
        max: MAX_FRAME_BYTES,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_payload() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"{\"action\":\"skill_list\"}").await.unwrap();

        let mut cursor = Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();
        assert_eq!(read_back, b"{\"action\":\"skill_list\"}");
    }

    #[tokio::test]
    async fn rejects_oversized_frame() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, IpcError::FrameTooLarge { .. }));
    }
}
