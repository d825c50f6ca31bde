//! Networking primitives for Dynamo replicas
//!
//! This crate provides:
//! - Length-prefixed message framing
//! - Request/response messages for every node operation
//! - A per-peer connection pool implementing [`PeerClient`]
//! - A typed single-node client for tooling

pub mod client;
pub mod framing;
pub mod messages;
pub mod peer;
pub mod transport;

pub use client::DynamoClient;
pub use framing::{Frame, FrameCodec, FrameType};
pub use messages::{Fault, FaultKind, Request, Response};
pub use peer::PeerConnection;
pub use transport::{PeerClient, Transport, TransportError};
