//! TCP transport layer
//!
//! Keeps one reusable connection per peer, keyed by node identity, and
//! exposes the peer-call capability the replica coordinator depends on.

use crate::framing::FrameError;
use crate::messages::{Fault, Request, Response};
use crate::peer::PeerConnection;
use async_trait::async_trait;
use dynamo_core::{DynamoNode, DynamoResult, PutArgs};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default dial timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Timed out talking to {0}")]
    Timeout(DynamoNode),
    #[error("Remote error: {0}")]
    Remote(Fault),
    #[error("Unexpected response: {0:?}")]
    UnexpectedResponse(Response),
}

impl TransportError {
    /// Whether the connection can no longer be trusted to stay in sync
    pub fn breaks_connection(&self) -> bool {
        !matches!(
            self,
            TransportError::Remote(_) | TransportError::UnexpectedResponse(_)
        )
    }
}

/// Calls a replica makes on its peers.
///
/// Any error means "peer currently unreachable" to the caller.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Prepare connections for a newly installed peer set
    async fn connect_peers(&self, _peers: &[DynamoNode]) {}

    /// Replicate one entry to `peer`; `Ok(false)` means the peer refused it
    async fn put_once(&self, peer: &DynamoNode, args: &PutArgs) -> Result<bool, TransportError>;

    /// Read `key` from `peer`'s local store
    async fn get_once(&self, peer: &DynamoNode, key: &str) -> Result<DynamoResult, TransportError>;
}

type SharedConnection = Arc<Mutex<PeerConnection>>;

/// Connection pool keyed by peer identity
pub struct Transport {
    /// Live connections
    connections: RwLock<HashMap<DynamoNode, SharedConnection>>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Transport {
    /// Create an empty pool
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connect_timeout,
            request_timeout,
        }
    }

    /// Check if a connection to `node` is pooled
    pub fn is_connected(&self, node: &DynamoNode) -> bool {
        self.connections.read().contains_key(node)
    }

    /// Drop every pooled connection and dial each of `peers`.
    ///
    /// Returns how many peers were reached; unreachable ones are redialled
    /// lazily on their next call.
    pub async fn connect_all(&self, peers: &[DynamoNode]) -> usize {
        self.connections.write().clear();

        let mut connected = 0;
        for peer in peers {
            match PeerConnection::connect(peer, self.connect_timeout).await {
                Ok(conn) => {
                    self.connections
                        .write()
                        .insert(peer.clone(), Arc::new(Mutex::new(conn)));
                    connected += 1;
                }
                Err(e) => warn!("Could not connect to {}: {}", peer, e),
            }
        }
        connected
    }

    /// Invoke `request` on `node`
    pub async fn call(&self, node: &DynamoNode, request: &Request) -> Result<Response, TransportError> {
        let conn = self.connection(node).await?;

        let result = {
            let mut guard = conn.lock().await;
            match tokio::time::timeout(self.request_timeout, guard.call(request)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(node.clone())),
            }
        };

        if let Err(e) = &result {
            if e.breaks_connection() {
                debug!("Dropping connection to {}: {}", node, e);
                self.evict(node, &conn);
            }
        }
        result
    }

    /// Pooled connection for `node`, dialling if there is none
    async fn connection(&self, node: &DynamoNode) -> Result<SharedConnection, TransportError> {
        let existing = self.connections.read().get(node).cloned();
        if let Some(conn) = existing {
            return Ok(conn);
        }

        let conn = PeerConnection::connect(node, self.connect_timeout).await?;
        debug!("Connected to {}", node);
        let shared = Arc::new(Mutex::new(conn));
        // A concurrent caller may have dialled first; keep theirs
        let pooled = self
            .connections
            .write()
            .entry(node.clone())
            .or_insert(shared)
            .clone();
        Ok(pooled)
    }

    fn evict(&self, node: &DynamoNode, conn: &SharedConnection) {
        let mut connections = self.connections.write();
        if connections
            .get(node)
            .map(|current| Arc::ptr_eq(current, conn))
            .unwrap_or(false)
        {
            connections.remove(node);
        }
    }
}

#[async_trait]
impl PeerClient for Transport {
    async fn connect_peers(&self, peers: &[DynamoNode]) {
        let connected = self.connect_all(peers).await;
        debug!("Connected to {}/{} peers", connected, peers.len());
    }

    async fn put_once(&self, peer: &DynamoNode, args: &PutArgs) -> Result<bool, TransportError> {
        match self.call(peer, &Request::PutOnce(args.clone())).await? {
            Response::Success(accepted) => Ok(accepted),
            other => Err(TransportError::UnexpectedResponse(other)),
        }
    }

    async fn get_once(&self, peer: &DynamoNode, key: &str) -> Result<DynamoResult, TransportError> {
        match self.call(peer, &Request::GetOnce(key.to_string())).await? {
            Response::Entries(result) => Ok(result),
            other => Err(TransportError::UnexpectedResponse(other)),
        }
    }
}
