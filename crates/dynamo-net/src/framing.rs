//! Message framing for network transport
//!
//! Provides length-prefixed framing for request/response frames.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    TooLarge(usize),
    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),
    #[error("Frame without a type byte")]
    MissingType,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for FrameError {
    fn from(e: postcard::Error) -> Self {
        FrameError::Serialization(e.to_string())
    }
}

/// A framed message
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame type
    pub frame_type: FrameType,
    /// Payload bytes
    pub payload: Vec<u8>,
}

/// Frame types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Install a preference list
    SendPreferenceList = 10,
    /// Coordinated write
    Put = 11,
    /// Local-only write (replication primitive)
    PutOnce = 12,
    /// Coordinated read
    Get = 20,
    /// Local-only read
    GetOnce = 21,
    /// Run anti-entropy
    Gossip = 30,
    /// Start a crash window
    Crash = 31,
    /// Successful response
    Reply = 40,
    /// Error response
    Fault = 41,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Self::SendPreferenceList),
            11 => Ok(Self::Put),
            12 => Ok(Self::PutOnce),
            20 => Ok(Self::Get),
            21 => Ok(Self::GetOnce),
            30 => Ok(Self::Gossip),
            31 => Ok(Self::Crash),
            40 => Ok(Self::Reply),
            41 => Ok(Self::Fault),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

/// Length-prefixed frame codec.
///
/// A frame is a big-endian `u32` length, then the type byte, then the
/// payload. The length counts the type byte.
#[derive(Debug, Default)]
pub struct FrameCodec;

/// Bytes in the length prefix
const LENGTH_PREFIX: usize = 4;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let Some(prefix) = src.get(..LENGTH_PREFIX) else {
            return Ok(None);
        };
        let body_len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        match body_len {
            0 => return Err(FrameError::MissingType),
            n if n > MAX_FRAME_SIZE => return Err(FrameError::TooLarge(n)),
            _ => {}
        }

        let total = LENGTH_PREFIX + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut body = src.split_to(total);
        body.advance(LENGTH_PREFIX);
        let frame_type = FrameType::try_from(body.get_u8())?;
        Ok(Some(Frame::new(frame_type, body.to_vec())))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let body_len = frame.payload.len() + 1;
        if body_len > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(body_len));
        }

        dst.reserve(LENGTH_PREFIX + body_len);
        dst.put_u32(body_len as u32);
        dst.put_u8(frame.frame_type as u8);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

impl Frame {
    /// Create a new frame
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self { frame_type, payload }
    }

    /// Frame with no payload
    pub fn empty(frame_type: FrameType) -> Self {
        Self::new(frame_type, vec![])
    }
}
