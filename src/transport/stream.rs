//! Frame codec shared by all transports.
//!
//! On a stream transport every frame carries a 4-byte header:
//!
//! ```text
//! [ 0xFF | 0xFF | body_len (u16, BE) ] body
//! ```
//!
//! On a datagram transport each datagram is exactly one body. The body is
//! the payload, sealed by the cipher block when one is configured. Size
//! bounds always apply to the payload, never to the sealed body.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::{
    FrameError, MAX_FRAME_SIZE, MIN_FRAME_SIZE, STREAM_HEADER_SIZE, STREAM_MAGIC, TransportResult,
};
use crate::crypto::CipherBlock;

/// How frames are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Length-prefixed frames on a byte stream.
    Stream,
    /// One frame per datagram.
    Datagram,
}

/// Frame codec with size bounds and an optional cipher block.
#[derive(Debug, Clone)]
pub struct DataStream {
    framing: Framing,
    min_size: usize,
    max_size: usize,
    block: Option<Arc<CipherBlock>>,
}

impl DataStream {
    /// Create a codec with the default bounds and no cipher.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            min_size: MIN_FRAME_SIZE,
            max_size: MAX_FRAME_SIZE,
            block: None,
        }
    }

    /// Set the payload size bounds.
    pub fn with_bounds(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Seal every body with `block`.
    pub fn with_block(mut self, block: Option<Arc<CipherBlock>>) -> Self {
        self.block = block;
        self
    }

    /// Framing mode.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Smallest accepted payload.
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Largest accepted payload.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether bodies are sealed.
    pub fn is_encrypted(&self) -> bool {
        self.block.is_some()
    }

    /// Validate a payload length against the bounds.
    pub fn check_size(&self, len: usize) -> Result<(), FrameError> {
        if len < self.min_size {
            return Err(FrameError::TooShort {
                len,
                min: self.min_size,
            });
        }
        if len > self.max_size {
            return Err(FrameError::TooLong {
                len,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Encode a payload into wire bytes.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        self.check_size(payload.len())?;
        let body = self.seal(payload)?;

        match self.framing {
            Framing::Datagram => Ok(body),
            Framing::Stream => {
                let len = u16::try_from(body.len()).map_err(|_| FrameError::TooLong {
                    len: payload.len(),
                    max: self.max_size,
                })?;
                let mut framed = Vec::with_capacity(STREAM_HEADER_SIZE + body.len());
                framed.extend_from_slice(&STREAM_MAGIC.to_be_bytes());
                framed.extend_from_slice(&len.to_be_bytes());
                framed.extend_from_slice(&body);
                Ok(framed)
            }
        }
    }

    /// Decode wire bytes into a payload.
    ///
    /// For stream framing `raw` must hold exactly one frame, header included.
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<u8>, FrameError> {
        match self.framing {
            Framing::Datagram => self.decode_body(raw),
            Framing::Stream => {
                if raw.len() < STREAM_HEADER_SIZE {
                    return Err(FrameError::Truncated {
                        expected: STREAM_HEADER_SIZE,
                        actual: raw.len(),
                    });
                }
                let (header, body) = raw.split_at(STREAM_HEADER_SIZE);
                let len = Self::parse_header(header)?;
                if body.len() != len {
                    return Err(FrameError::Truncated {
                        expected: len,
                        actual: body.len(),
                    });
                }
                self.decode_body(body)
            }
        }
    }

    /// Open and validate one body.
    pub fn decode_body(&self, body: &[u8]) -> Result<Vec<u8>, FrameError> {
        let payload = match &self.block {
            Some(block) => block.open(body)?,
            None => body.to_vec(),
        };
        self.check_size(payload.len())?;
        Ok(payload)
    }

    /// Read one frame from a byte stream.
    ///
    /// The body is always consumed in full before it is validated, so a
    /// rejected frame leaves the stream aligned on the next header.
    pub async fn read_frame<R>(&self, reader: &mut R) -> TransportResult<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; STREAM_HEADER_SIZE];
        reader.read_exact(&mut header).await?;
        let len = Self::parse_header(&header)?;

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await?;
        Ok(self.decode_body(&body)?)
    }

    /// Write one frame to a byte stream.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> TransportResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let framed = self.encode(payload)?;
        writer.write_all(&framed).await?;
        writer.flush().await?;
        Ok(())
    }

    fn seal(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        match &self.block {
            Some(block) => Ok(block.seal(payload)?),
            None => Ok(payload.to_vec()),
        }
    }

    fn parse_header(header: &[u8]) -> Result<usize, FrameError> {
        let magic = u16::from_be_bytes([header[0], header[1]]);
        if magic != STREAM_MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        Ok(u16::from_be_bytes([header[2], header[3]]) as usize)
    }
}
