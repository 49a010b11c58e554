//! Frame reading and writing for length-authoritative game packets
//!
//! Every frame starts with a header whose length field covers the whole
//! frame, header included. The stream reader trusts that field and nothing
//! else when splitting the byte stream.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::packet::HeaderFormat;

/// Errors that can occur during frame I/O
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Declared length {0} is shorter than the {1}-byte header")]
    LengthTooShort(usize, usize),
    #[error("Frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Largest frame expressible by the 16-bit length field
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Read one frame in the given header layout
///
/// Returns the complete frame (header included), exactly as long as its
/// declared length.
pub async fn read_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
    format: HeaderFormat,
) -> Result<Vec<u8>, FramingError> {
    let header_len = format.header_len();
    let mut frame = vec![0u8; header_len];
    read_exact_or_closed(stream, &mut frame).await?;

    let declared = format.declared_len(&frame) as usize;
    if declared < header_len {
        return Err(FramingError::LengthTooShort(declared, header_len));
    }

    frame.resize(declared, 0);
    read_exact_or_closed(stream, &mut frame[header_len..]).await?;
    Ok(frame)
}

async fn read_exact_or_closed<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
) -> Result<(), FramingError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write one complete frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    frame: &[u8],
) -> Result<(), FramingError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(FramingError::FrameTooLarge(frame.len(), MAX_FRAME_SIZE));
    }

    stream.write_all(frame).await?;
    stream.flush().await?;

    Ok(())
}

/// Builder for little-endian packet bodies
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write(mut self, data: &[u8]) -> Self {
        self.buffer.extend_from_slice(data);
        self
    }

    pub fn write_u8(mut self, value: u8) -> Self {
        self.buffer.push(value);
        self
    }

    pub fn write_u16(mut self, value: u16) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_u32(mut self, value: u32) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_f32(mut self, value: f32) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Overwrite a u16 already written at `offset`
    ///
    /// Used to fill in a length field once the body is complete.
    pub fn patch_u16(mut self, offset: usize, value: u16) -> Self {
        if let Some(slot) = self.buffer.get_mut(offset..offset + 2) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a little-endian packet body
pub struct FrameReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read n bytes
    pub fn read(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.position + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Some(slice)
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.read(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read(1).map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.read(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.read(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }
}
