//! Length-prefixed framing over a duplex byte stream.
//!
//! Wire format: `<decimal length>\n` followed by exactly `length` payload
//! bytes. The reader loops until the full payload has arrived, so partial TCP
//! reads never surface as partial frames. A stream that closes mid-frame
//! fails with [`MessengerError::StreamClosed`]; a malformed length prefix is
//! a [`ProtocolError`].

use crate::transport::MAX_PAYLOAD_SIZE;
use crate::utils::{MessengerError, ProtocolError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on the decimal length prefix, newline excluded. The largest
/// valid prefix is seven digits, so anything past this is not a frame.
const MAX_PREFIX_LEN: usize = 16;

/// Reads length-prefixed frames from the read half of a stream
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

/// Writes length-prefixed frames to the write half of a stream.
///
/// Callers must serialize access (one writer per socket at a time); the
/// connection manager wraps each writer in a per-session mutex.
pub struct FrameWriter<W> {
    inner: W,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap the read half of a stream
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Receive one complete frame, blocking until it has fully arrived.
    ///
    /// # Errors
    ///
    /// [`MessengerError::StreamClosed`] if the peer closed the stream before
    /// or during the frame; [`ProtocolError::InvalidLength`] if the length
    /// prefix is not a decimal number or runs past its byte bound;
    /// [`ProtocolError::FrameTooLarge`] if it exceeds the payload limit.
    pub async fn receive_frame(&mut self) -> Result<Vec<u8>> {
        let mut prefix = Vec::with_capacity(MAX_PREFIX_LEN);
        loop {
            let byte = match self.inner.read_u8().await {
                Ok(byte) => byte,
                // EOF before or inside the length prefix
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(MessengerError::StreamClosed);
                }
                Err(e) => return Err(e.into()),
            };
            if byte == b'\n' {
                break;
            }
            // Cap the prefix before buffering it; a peer streaming bytes
            // with no newline must not grow memory until the payload check
            if prefix.len() >= MAX_PREFIX_LEN {
                return Err(ProtocolError::InvalidLength {
                    reason: "length prefix too long".to_string(),
                }
                .into());
            }
            prefix.push(byte);
        }

        let text = std::str::from_utf8(&prefix).map_err(|_| ProtocolError::InvalidLength {
            reason: "length prefix is not UTF-8".to_string(),
        })?;
        let length: usize = text.trim().parse().map_err(|_| ProtocolError::InvalidLength {
            reason: format!("not a decimal number: {text:?}"),
        })?;

        if length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        // read_exact loops over partial reads; EOF maps to StreamClosed
        let mut payload = vec![0u8; length];
        self.inner.read_exact(&mut payload).await?;
        Ok(payload)
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap the write half of a stream
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Send one frame: length prefix, payload, flush.
    ///
    /// The prefix and payload are written as a single buffer so the frame is
    /// either fully delivered or the stream is considered broken.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        let mut frame = Vec::with_capacity(payload.len() + 12);
        frame.extend_from_slice(payload.len().to_string().as_bytes());
        frame.push(b'\n');
        frame.extend_from_slice(payload);

        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write half, signalling EOF to the peer
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
