//! dynamod - Dynamo replica daemon
//!
//! This daemon provides:
//! - A versioned in-memory store keeping each key's causal frontier
//! - Quorum-coordinated Put/Get across the node's preference list
//! - Crash simulation gating every operation
//! - Per-peer gossip outboxes and anti-entropy rounds

pub mod availability;
pub mod config;
pub mod gossiper;
pub mod replica;
pub mod server;
pub mod storage;

pub use availability::CrashGate;
pub use config::Config;
pub use gossiper::Gossiper;
pub use replica::{Replica, ReplicaConfig};
pub use server::Server;
pub use storage::Storage;
