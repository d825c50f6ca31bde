//! Typed client for invoking operations on a single node

use crate::messages::{Request, Response};
use crate::peer::PeerConnection;
use crate::transport::{TransportError, DEFAULT_CONNECT_TIMEOUT};
use dynamo_core::{DynamoNode, DynamoResult, PutArgs};

/// Client bound to one node, used by tooling and tests
#[derive(Debug)]
pub struct DynamoClient {
    conn: PeerConnection,
}

impl DynamoClient {
    /// Connect to `node`
    pub async fn connect(node: &DynamoNode) -> Result<Self, TransportError> {
        Ok(Self {
            conn: PeerConnection::connect(node, DEFAULT_CONNECT_TIMEOUT).await?,
        })
    }

    pub fn node(&self) -> &DynamoNode {
        self.conn.node()
    }

    /// Install the node's preference list
    pub async fn send_preference_list(&mut self, list: Vec<DynamoNode>) -> Result<(), TransportError> {
        self.ack(Request::SendPreferenceList(list)).await
    }

    /// Coordinated write; `Ok(false)` when the node refused the version
    pub async fn put(&mut self, args: PutArgs) -> Result<bool, TransportError> {
        self.success(Request::Put(args)).await
    }

    /// Local-only write on the node
    pub async fn put_once(&mut self, args: PutArgs) -> Result<bool, TransportError> {
        self.success(Request::PutOnce(args)).await
    }

    /// Quorum read
    pub async fn get(&mut self, key: impl Into<String>) -> Result<DynamoResult, TransportError> {
        self.entries(Request::Get(key.into())).await
    }

    /// Local-only read on the node
    pub async fn get_once(&mut self, key: impl Into<String>) -> Result<DynamoResult, TransportError> {
        self.entries(Request::GetOnce(key.into())).await
    }

    /// Trigger anti-entropy on the node
    pub async fn gossip(&mut self) -> Result<(), TransportError> {
        self.ack(Request::Gossip).await
    }

    /// Make the node unavailable for `seconds`
    pub async fn crash(&mut self, seconds: u64) -> Result<bool, TransportError> {
        self.success(Request::Crash(seconds)).await
    }

    async fn ack(&mut self, request: Request) -> Result<(), TransportError> {
        match self.conn.call(&request).await? {
            Response::Ack => Ok(()),
            other => Err(TransportError::UnexpectedResponse(other)),
        }
    }

    async fn success(&mut self, request: Request) -> Result<bool, TransportError> {
        match self.conn.call(&request).await? {
            Response::Success(ok) => Ok(ok),
            other => Err(TransportError::UnexpectedResponse(other)),
        }
    }

    async fn entries(&mut self, request: Request) -> Result<DynamoResult, TransportError> {
        match self.conn.call(&request).await? {
            Response::Entries(result) => Ok(result),
            other => Err(TransportError::UnexpectedResponse(other)),
        }
    }
}
