//! Request and response messages carried in frames
//!
//! The frame type names the operation; the payload is the postcard encoding
//! of that operation's body.

use crate::framing::{Frame, FrameError, FrameType};
use dynamo_core::{DynamoNode, DynamoResult, Error as CoreError, PutArgs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An operation invoked on a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    SendPreferenceList(Vec<DynamoNode>),
    Put(PutArgs),
    PutOnce(PutArgs),
    Get(String),
    GetOnce(String),
    Gossip,
    Crash(u64),
}

/// A successful answer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Operation completed, nothing to report
    Ack,
    /// Write/crash outcome
    Success(bool),
    /// Read outcome
    Entries(DynamoResult),
}

/// Why a node refused an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    Unavailable,
    AlreadyCrashed,
    StaleWrite,
    DuplicateWrite,
    BadRequest,
    Internal,
}

/// Error response sent in a `Fault` frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<&CoreError> for Fault {
    fn from(e: &CoreError) -> Self {
        let kind = match e {
            CoreError::Unavailable(_) => FaultKind::Unavailable,
            CoreError::AlreadyCrashed(_) => FaultKind::AlreadyCrashed,
            CoreError::StaleWrite { .. } => FaultKind::StaleWrite,
            CoreError::DuplicateWrite { .. } => FaultKind::DuplicateWrite,
            CoreError::InvalidDuration(_) | CoreError::InvalidConfig(_) => FaultKind::BadRequest,
        };
        Fault::new(kind, e.to_string())
    }
}

impl Request {
    /// Frame type carrying this request
    pub fn frame_type(&self) -> FrameType {
        match self {
            Request::SendPreferenceList(_) => FrameType::SendPreferenceList,
            Request::Put(_) => FrameType::Put,
            Request::PutOnce(_) => FrameType::PutOnce,
            Request::Get(_) => FrameType::Get,
            Request::GetOnce(_) => FrameType::GetOnce,
            Request::Gossip => FrameType::Gossip,
            Request::Crash(_) => FrameType::Crash,
        }
    }

    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        let payload = match self {
            Request::SendPreferenceList(list) => postcard::to_allocvec(list)?,
            Request::Put(args) | Request::PutOnce(args) => postcard::to_allocvec(args)?,
            Request::Get(key) | Request::GetOnce(key) => postcard::to_allocvec(key)?,
            Request::Gossip => Vec::new(),
            Request::Crash(seconds) => postcard::to_allocvec(seconds)?,
        };
        Ok(Frame::new(self.frame_type(), payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, FrameError> {
        let payload = &frame.payload;
        let request = match frame.frame_type {
            FrameType::SendPreferenceList => {
                Request::SendPreferenceList(postcard::from_bytes(payload)?)
            }
            FrameType::Put => Request::Put(postcard::from_bytes(payload)?),
            FrameType::PutOnce => Request::PutOnce(postcard::from_bytes(payload)?),
            FrameType::Get => Request::Get(postcard::from_bytes(payload)?),
            FrameType::GetOnce => Request::GetOnce(postcard::from_bytes(payload)?),
            FrameType::Gossip => Request::Gossip,
            FrameType::Crash => Request::Crash(postcard::from_bytes(payload)?),
            FrameType::Reply | FrameType::Fault => {
                return Err(FrameError::Serialization(format!(
                    "{:?} is not a request",
                    frame.frame_type
                )))
            }
        };
        Ok(request)
    }
}

impl Response {
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        Ok(Frame::new(FrameType::Reply, postcard::to_allocvec(self)?))
    }
}

/// Encode a fault frame
pub fn fault_frame(fault: &Fault) -> Result<Frame, FrameError> {
    Ok(Frame::new(FrameType::Fault, postcard::to_allocvec(fault)?))
}

/// Decode a reply frame into either a response or the remote fault
pub fn decode_reply(frame: &Frame) -> Result<Result<Response, Fault>, FrameError> {
    match frame.frame_type {
        FrameType::Reply => Ok(Ok(postcard::from_bytes(&frame.payload)?)),
        FrameType::Fault => Ok(Err(postcard::from_bytes(&frame.payload)?)),
        other => Err(FrameError::Serialization(format!(
            "{:?} is not a reply",
            other
        ))),
    }
}
