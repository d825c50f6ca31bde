//! Core replica types
//!
//! Everything here crosses the wire between nodes, so all types derive
//! serde and are encoded with postcard.

use crate::clock::VectorClock;
use crate::error::Error;
use crate::frontier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// VERSIONING
// =============================================================================

/// Causal context attached to every stored or replicated value
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub clock: VectorClock,
}

impl Context {
    pub fn new(clock: VectorClock) -> Self {
        Self { clock }
    }

    /// Empty context for a write that is not based on any prior read
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// One causally-addressable version of a key's value
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub context: Context,
    pub value: Vec<u8>,
}

impl ObjectEntry {
    pub fn new(context: Context, value: impl Into<Vec<u8>>) -> Self {
        Self {
            context,
            value: value.into(),
        }
    }

    pub fn clock(&self) -> &VectorClock {
        &self.context.clock
    }
}

// =============================================================================
// CLUSTER IDENTITY
// =============================================================================

/// Network identity of a node; equal iff address and port are equal
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DynamoNode {
    pub address: String,
    pub port: u16,
}

impl DynamoNode {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `address:port`, suitable for dialling
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for DynamoNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Parses `host:port`
impl FromStr for DynamoNode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidConfig(format!("expected host:port, got '{}'", s));
        let (address, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if address.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self::new(address, port))
    }
}

impl From<std::net::SocketAddr> for DynamoNode {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Rotate a preference list left by `n`, so node `n` comes first.
///
/// Giving node `i` the list rotated by `i` yields a distinct list per node.
pub fn rotate_preference_list(list: &[DynamoNode], n: usize) -> Vec<DynamoNode> {
    if list.is_empty() {
        return Vec::new();
    }
    let mut rotated = list.to_vec();
    rotated.rotate_left(n % list.len());
    rotated
}

// =============================================================================
// REQUESTS AND RESULTS
// =============================================================================

/// Write request body for `Put` and `PutOnce`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutArgs {
    pub key: String,
    pub context: Context,
    pub value: Vec<u8>,
}

impl PutArgs {
    pub fn new(key: impl Into<String>, context: Context, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            context,
            value: value.into(),
        }
    }

    /// Write with an empty context
    pub fn fresh(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(key, Context::fresh(), value)
    }

    pub fn to_entry(&self) -> ObjectEntry {
        ObjectEntry::new(self.context.clone(), self.value.clone())
    }
}

/// Entries returned by a read
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamoResult {
    pub entries: Vec<ObjectEntry>,
}

impl DynamoResult {
    pub fn new(entries: Vec<ObjectEntry>) -> Self {
        Self { entries }
    }

    /// Fold another replica's entries into this result
    pub fn merge(&mut self, other: DynamoResult) {
        self.entries.extend(other.entries);
    }

    /// Drop every entry causally dominated by another entry in the result
    pub fn remove_ancestors(&mut self) {
        frontier::prune_dominated(&mut self.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
