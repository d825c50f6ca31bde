//! dynamod server - accept loop, request dispatch and gossip timer

use crate::config::{Config, NodeSettings};
use crate::replica::{Replica, ReplicaStats};
use dynamo_core::Error as CoreError;
use dynamo_net::framing::FrameError;
use dynamo_net::messages::fault_frame;
use dynamo_net::{Fault, FaultKind, Frame, FrameCodec, Request, Response, Transport};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Bind failed: {0}")]
    BindFailed(SocketAddr),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Server state
pub struct Server {
    config: Config,
    settings: NodeSettings,
    replica: Arc<Replica>,
    connection_limit: Arc<Semaphore>,
    /// Shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let settings = config
            .resolve()
            .map_err(|e| ServerError::Config(format!("{:#}", e)))?;

        let transport = Arc::new(Transport::default());
        let replica = Arc::new(Replica::new(settings.replica.clone(), transport));
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            settings,
            replica,
            connection_limit,
            shutdown_tx,
        })
    }

    pub fn replica(&self) -> &Arc<Replica> {
        &self.replica
    }

    /// Bind the configured listen address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.listen)
            .await
            .map_err(|_| ServerError::BindFailed(self.config.listen))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        info!(
            "Starting dynamod {} on {} (W={}, R={})",
            self.settings.replica.node_id,
            listener.local_addr()?,
            self.settings.replica.write_quorum,
            self.settings.replica.read_quorum
        );

        // Subscribe before anything can signal shutdown
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if let Some(list) = &self.settings.preference_list {
            self.replica.send_preference_list(list.clone()).await;
        }

        let gossip_handle = self.spawn_gossip_task();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.clone().accept(stream, addr),
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        if let Some(handle) = gossip_handle {
            handle.abort();
        }
        Ok(())
    }

    fn accept(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let permit = match self.connection_limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting {}", addr);
                return;
            }
        };

        debug!("Accepted connection from {}", addr);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = self.handle_connection(stream, addr).await {
                warn!("Connection error from {}: {}", addr, e);
            }
        });
    }

    /// Answer every request frame on the connection with one reply frame
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let frame = tokio::select! {
                frame = framed.next() => frame,
                _ = shutdown_rx.recv() => break,
            };
            let frame = match frame {
                Some(frame) => frame?,
                None => break,
            };
            let reply = self.dispatch(&frame).await?;
            framed.send(reply).await?;
        }

        debug!("Connection from {} closed", addr);
        Ok(())
    }

    async fn dispatch(&self, frame: &Frame) -> Result<Frame, FrameError> {
        let outcome = match Request::from_frame(frame) {
            Ok(request) => self.execute(request).await,
            Err(e) => Err(Fault::new(FaultKind::BadRequest, e.to_string())),
        };
        match outcome {
            Ok(response) => response.to_frame(),
            Err(fault) => fault_frame(&fault),
        }
    }

    async fn execute(&self, request: Request) -> Result<Response, Fault> {
        let replica = &self.replica;
        match request {
            Request::SendPreferenceList(list) => {
                replica.send_preference_list(list).await;
                Ok(Response::Ack)
            }
            Request::Put(args) => success(replica.put(args).await),
            Request::PutOnce(args) => success(replica.put_once(&args).map(|_| ())),
            Request::Get(key) => entries(replica.get(&key).await),
            Request::GetOnce(key) => entries(replica.get_once(&key)),
            Request::Gossip => replica
                .gossip()
                .await
                .map(|_| Response::Ack)
                .map_err(|e| Fault::from(&e)),
            Request::Crash(seconds) => match replica.crash(seconds) {
                Ok(()) => Ok(Response::Success(true)),
                Err(CoreError::AlreadyCrashed(_)) => Ok(Response::Success(false)),
                Err(e) => Err(Fault::from(&e)),
            },
        }
    }

    /// Spawn the periodic gossip task, if an interval is configured
    fn spawn_gossip_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.gossip_interval_secs == 0 {
            return None;
        }

        let replica = self.replica.clone();
        let period = Duration::from_secs(self.config.gossip_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match replica.gossip().await {
                            Ok(report) => debug!("Gossip round: {:?}", report),
                            // Crashed nodes skip the round
                            Err(e) => debug!("Gossip round skipped: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        }))
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            open_connections: self.config.max_connections
                - self.connection_limit.available_permits(),
            replica: self.replica.stats(),
        }
    }
}

/// Store refusals are an ordinary `false`; anything else is a fault
fn success(result: dynamo_core::Result<()>) -> Result<Response, Fault> {
    match result {
        Ok(()) => Ok(Response::Success(true)),
        Err(e) if e.is_rejection() => Ok(Response::Success(false)),
        Err(e) => Err(Fault::from(&e)),
    }
}

fn entries(result: dynamo_core::Result<dynamo_core::DynamoResult>) -> Result<Response, Fault> {
    result.map(Response::Entries).map_err(|e| Fault::from(&e))
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub open_connections: usize,
    pub replica: ReplicaStats,
}
