//! Frame Codec
//!
//! Each frame is a 4-byte big-endian length followed by the bincode encoding
//! of a [`Frame`].

use super::error::TransportError;
use crate::protocol::Frame;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on an encoded frame. A full STORE chunk plus header fits easily.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub fn encode(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    let body = bincode::serialize(frame)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(body.len()));
    }

    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode(frame)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(bincode::deserialize(&body)?))
}
