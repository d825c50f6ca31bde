//! Static cluster description loaded at process start

use crate::error::{Error, Result};
use crate::types::{rotate_preference_list, DynamoNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cluster membership and quorum sizes, read from a JSON file:
///
/// ```json
/// { "write_quorum": 2, "read_quorum": 2,
///   "nodes": [ { "address": "localhost", "port": 8080 } ] }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub write_quorum: usize,
    pub read_quorum: usize,
    pub nodes: Vec<DynamoNode>,
}

impl ClusterConfig {
    /// Load and validate a cluster file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config: ClusterConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Quorums must be at least one and at most the cluster size
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("cluster has no nodes".into()));
        }
        for (name, quorum) in [("write", self.write_quorum), ("read", self.read_quorum)] {
            if quorum == 0 || quorum > self.nodes.len() {
                return Err(Error::InvalidConfig(format!(
                    "{} quorum {} outside 1..={}",
                    name,
                    quorum,
                    self.nodes.len()
                )));
            }
        }
        Ok(())
    }

    pub fn cluster_size(&self) -> usize {
        self.nodes.len()
    }

    pub fn position(&self, node: &DynamoNode) -> Option<usize> {
        self.nodes.iter().position(|n| n == node)
    }

    /// Preference list for the node at `index`: the cluster rotated so that
    /// node comes first
    pub fn preference_list_for(&self, index: usize) -> Vec<DynamoNode> {
        rotate_preference_list(&self.nodes, index)
    }
}
