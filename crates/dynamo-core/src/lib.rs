//! Dynamo Core Library
//!
//! This crate provides the versioning model shared by every Dynamo replica
//! and by the tooling that talks to them.
//!
//! # Modules
//!
//! - [`clock`]: Vector clocks and causal comparison
//! - [`types`]: Context, ObjectEntry, DynamoNode, request/result types
//! - [`frontier`]: Causal-frontier insertion and pruning
//! - [`cluster`]: Static cluster configuration
//! - [`error`]: Error types

pub mod clock;
pub mod cluster;
pub mod error;
pub mod frontier;
pub mod types;

#[cfg(test)]
mod test_vectors;

pub use clock::{Causality, VectorClock};
pub use cluster::ClusterConfig;
pub use error::{Error, Result};
pub use frontier::Insertion;
pub use types::*;
