//! Wire frames
//!
//! Every unit on the wire is a frame:
//!
//! ```text
//! +----------+------------------+
//! | type: u8 | body (type-dep.) |
//! +----------+------------------+
//! ```
//!
//! WebSocket carries one frame per binary message. Raw TCP has no message
//! boundaries, so each frame is prefixed with its length:
//!
//! ```text
//! +-------------------+----------+------+
//! | len: u32 (BE)     | type: u8 | body |
//! +-------------------+----------+------+
//!   len = 1 + body.len()
//! ```
//!
//! Bodies:
//! - `Setup`:   `version: u8` followed by the stream filter as JSON
//! - `Accept`:  empty
//! - `Reject`:  UTF-8 reason
//! - `Message`: codec output, opaque at this layer
//! - `Close`:   empty

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::message::MagixMessageFilter;

use super::constants::*;

/// A single protocol frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Client opens the session
    Setup {
        /// Protocol version spoken by the client
        version: u8,
        /// Server-side filter for the inbound stream
        filter: MagixMessageFilter,
    },
    /// Server accepted the setup
    Accept,
    /// Server refused the setup
    Reject(String),
    /// Encoded message
    Message(Bytes),
    /// Graceful close
    Close,
}

impl Frame {
    /// Frame type byte
    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::Setup { .. } => FRAME_SETUP,
            Frame::Accept => FRAME_ACCEPT,
            Frame::Reject(_) => FRAME_REJECT,
            Frame::Message(_) => FRAME_MESSAGE,
            Frame::Close => FRAME_CLOSE,
        }
    }

    /// Encode type and body (no length prefix)
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(1 + self.body_hint());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode with the `u32` length prefix used on raw TCP
    pub fn encode_length_prefixed(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let start = buf.len();
        buf.put_u32(0);
        self.encode_into(buf)?;

        let len = buf.len() - start - LENGTH_PREFIX_SIZE;
        let len = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
            size: len,
            max: u32::MAX as usize,
        })?;
        buf[start..start + LENGTH_PREFIX_SIZE].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(self.frame_type());

        match self {
            Frame::Setup { version, filter } => {
                buf.put_u8(*version);
                let json = serde_json::to_vec(filter)
                    .map_err(|e| ProtocolError::InvalidSetup(e.to_string()))?;
                buf.put_slice(&json);
            }
            Frame::Reject(reason) => buf.put_slice(reason.as_bytes()),
            Frame::Message(data) => buf.put_slice(data),
            Frame::Accept | Frame::Close => {}
        }

        Ok(())
    }

    fn body_hint(&self) -> usize {
        match self {
            Frame::Setup { .. } => 64,
            Frame::Reject(reason) => reason.len(),
            Frame::Message(data) => data.len(),
            Frame::Accept | Frame::Close => 0,
        }
    }

    /// Decode type and body (no length prefix)
    ///
    /// `Message` bodies are sliced out of `data` without copying.
    pub fn decode(mut data: Bytes) -> Result<Frame, ProtocolError> {
        if !data.has_remaining() {
            return Err(ProtocolError::EmptyFrame);
        }

        let frame_type = data.get_u8();
        match frame_type {
            FRAME_SETUP => {
                if !data.has_remaining() {
                    return Err(ProtocolError::InvalidSetup("missing version".into()));
                }
                let version = data.get_u8();
                let filter = if data.is_empty() {
                    MagixMessageFilter::ALL
                } else {
                    serde_json::from_slice(&data)
                        .map_err(|e| ProtocolError::InvalidSetup(e.to_string()))?
                };
                Ok(Frame::Setup { version, filter })
            }
            FRAME_ACCEPT => Ok(Frame::Accept),
            FRAME_REJECT => String::from_utf8(data.to_vec())
                .map(Frame::Reject)
                .map_err(|_| ProtocolError::InvalidUtf8),
            FRAME_MESSAGE => Ok(Frame::Message(data)),
            FRAME_CLOSE => Ok(Frame::Close),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

/// Incremental decoder for length-prefixed frames
///
/// Feed it the raw read buffer; it consumes complete frames and leaves
/// partial ones in place.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder with the given frame size limit
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Try to decode one frame from the buffer
    ///
    /// Returns `Ok(None)` when more data is needed.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&buf[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if buf.len() < LENGTH_PREFIX_SIZE + len {
            buf.reserve(LENGTH_PREFIX_SIZE + len - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let data = buf.split_to(len).freeze();
        Frame::decode(data).map(Some)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}
