//! latmesh ping wire format.
//!
//! The protocol is one UTF-8 line in each direction: the sender's region
//! identifier followed by `\n`. There is no framing beyond the newline, no
//! acknowledgement and no checksum. Round-trip time is never derived from
//! these messages; it is read from the kernel once both lines have crossed.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest accepted identifier line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("peer closed the connection before sending a full line")]
    Closed,
    #[error("line exceeds the 255 byte limit")]
    TooLong,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("identifier contains a line break")]
    EmbeddedNewline,
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode an identifier as a protocol line.
pub fn encode_line(identifier: &str) -> Result<Vec<u8>, WireError> {
    if identifier.contains(['\n', '\r']) {
        return Err(WireError::EmbeddedNewline);
    }
    if identifier.len() > MAX_LINE_LEN {
        return Err(WireError::TooLong);
    }
    let mut line = Vec::with_capacity(identifier.len() + 1);
    line.extend_from_slice(identifier.as_bytes());
    line.push(b'\n');
    Ok(line)
}

/// Write one identifier line and flush it.
pub async fn write_line<W>(writer: &mut W, identifier: &str) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(identifier)?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one identifier line. A trailing `\r` is stripped.
///
/// Reads at most MAX_LINE_LEN + 2 bytes, so a peer streaming garbage
/// without a newline cannot grow the buffer without bound.
pub async fn read_line<R>(reader: &mut R) -> Result<String, WireError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(64);
    let limit = (MAX_LINE_LEN + 2) as u64;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;

    if n == 0 {
        return Err(WireError::Closed);
    }
    if buf.last() != Some(&b'\n') {
        return if n as u64 >= limit {
            Err(WireError::TooLong)
        } else {
            Err(WireError::Closed)
        };
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > MAX_LINE_LEN {
        return Err(WireError::TooLong);
    }
    String::from_utf8(buf).map_err(|_| WireError::InvalidUtf8)
}
