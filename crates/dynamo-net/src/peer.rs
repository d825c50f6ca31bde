//! A framed connection to one peer

use crate::framing::FrameCodec;
use crate::messages::{decode_reply, Request, Response};
use crate::transport::TransportError;
use dynamo_core::DynamoNode;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Request/response connection to a single node.
///
/// Exactly one request is outstanding at a time; replies arrive in order.
pub struct PeerConnection {
    node: DynamoNode,
    framed: Framed<TcpStream, FrameCodec>,
}

impl PeerConnection {
    /// Dial `node`, giving up after `timeout`
    pub async fn connect(node: &DynamoNode, timeout: Duration) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(node.endpoint()))
            .await
            .map_err(|_| TransportError::Timeout(node.clone()))??;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(node.clone(), stream))
    }

    /// Wrap an already established stream
    pub fn from_stream(node: DynamoNode, stream: TcpStream) -> Self {
        Self {
            node,
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }

    pub fn node(&self) -> &DynamoNode {
        &self.node
    }

    /// Send one request and wait for its reply
    pub async fn call(&mut self, request: &Request) -> Result<Response, TransportError> {
        self.framed.send(request.to_frame()?).await?;
        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Err(TransportError::ConnectionClosed),
        };
        decode_reply(&frame)?.map_err(TransportError::Remote)
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection").field("node", &self.node).finish()
    }
}

