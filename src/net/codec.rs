//! Length-prefixed framing of the configuration-update protocol.
//!
//! ```text
//! [4 bytes: big-endian u32 length N] [N bytes: UTF-8 JSON document]
//! ```
//!
//! There is no response frame; the sender closes after writing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Errors on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Peer closed before a complete frame arrived.
    #[error("connection closed after {received} of {expected} bytes of the {part}")]
    Truncated {
        part: &'static str,
        expected: usize,
        received: usize,
    },

    #[error("declared payload of {declared} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { declared: usize, limit: usize },

    #[error("timed out after {0} ms waiting for a complete frame")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        declared: payload.len(),
        limit: u32::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, refusing declared lengths above `max_len`.
///
/// The payload buffer grows with the bytes actually received, so a large
/// declared length alone does not allocate.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let received = read_full(reader, &mut header).await?;
    if received < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            part: "length prefix",
            expected: HEADER_LEN,
            received,
        });
    }

    let declared = u32::from_be_bytes(header) as usize;
    if declared > max_len {
        return Err(ProtocolError::PayloadTooLarge {
            declared,
            limit: max_len,
        });
    }

    let mut payload = Vec::with_capacity(declared.min(64 * 1024));
    reader.take(declared as u64).read_to_end(&mut payload).await?;
    if payload.len() < declared {
        return Err(ProtocolError::Truncated {
            part: "payload",
            expected: declared,
            received: payload.len(),
        });
    }
    Ok(payload)
}

/// Fill `buf` unless EOF comes first; returns the bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
