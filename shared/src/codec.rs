//! Length-prefixed codec for the bridge TCP connection
//!
//! All frames are laid out as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: JSON Frame ]
//! ```
//!
//! This ensures frame boundaries are preserved over TCP streams.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::wire::Frame;

/// Maximum frame size (1 MB); a length prefix beyond this is a protocol
/// violation and the connection is torn down
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("frame body error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a frame into a length-prefixed byte buffer
pub fn encode(frame: &Frame) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(frame)?;

    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);

    Ok(buf.freeze())
}

/// Try to decode a length-prefixed frame from a buffer
///
/// Returns:
/// - `Ok(Some(frame))` if a complete frame was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if body_len > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidLength(body_len));
    }

    let total_len = 4 + body_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let body = buf.split_to(body_len as usize);

    let frame = serde_json::from_slice(&body)?;
    Ok(Some(frame))
}

/// Decoder state machine for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all
    /// complete frames
    pub fn decode_next(&mut self) -> Result<Option<Frame>, CodecError> {
        decode(&mut self.buffer)
    }
}
