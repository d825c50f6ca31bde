//! Configuration for dynamod

use crate::replica::ReplicaConfig;
use anyhow::Context as _;
use clap::Parser;
use dynamo_core::{ClusterConfig, DynamoNode};
use std::net::SocketAddr;
use std::path::PathBuf;

/// dynamod - Dynamo replica daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "dynamod")]
#[command(about = "Dynamo-style replicated key/value node")]
pub struct Config {
    /// Listen address for client and peer connections
    #[arg(short, long, default_value = "127.0.0.1:8080", env = "DYNAMO_LISTEN")]
    pub listen: SocketAddr,

    /// Address peers know this node by, as host:port (defaults to --listen)
    #[arg(long, env = "DYNAMO_ADVERTISE")]
    pub advertise: Option<String>,

    /// Replica id stamped into vector clocks (defaults to the node's index
    /// in the cluster file, else its address)
    #[arg(long, env = "DYNAMO_NODE_ID")]
    pub node_id: Option<String>,

    /// Replicas written directly by a Put, including this one. Only the
    /// cluster file's quorum is checked against the cluster size
    #[arg(short = 'w', long, default_value = "1")]
    pub write_quorum: usize,

    /// Replicas read by a Get, including this one. Only the cluster file's
    /// quorum is checked against the cluster size
    #[arg(short = 'r', long, default_value = "1")]
    pub read_quorum: usize,

    /// Cluster file (JSON); its quorums override -w/-r and the node installs
    /// its own preference list at startup
    #[arg(long, env = "DYNAMO_CLUSTER")]
    pub cluster: Option<PathBuf>,

    /// Seconds between automatic gossip rounds (0 disables)
    #[arg(long, default_value = "0")]
    pub gossip_interval_secs: u64,

    /// Maximum concurrent connections served
    #[arg(long, default_value = "256")]
    pub max_connections: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

/// Everything the server needs, derived from [`Config`]
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub replica: ReplicaConfig,
    /// Preference list to install at startup
    pub preference_list: Option<Vec<DynamoNode>>,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.write_quorum == 0 || self.read_quorum == 0 {
            anyhow::bail!("Write and read quorums must be at least 1");
        }
        if self.max_connections == 0 {
            anyhow::bail!("max-connections must be at least 1");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format '{}'", self.log_format);
        }
        if let Some(node_id) = &self.node_id {
            if node_id.is_empty() {
                anyhow::bail!("Node id cannot be empty");
            }
        }
        self.self_node()?;
        Ok(())
    }

    /// This node's identity in preference lists
    pub fn self_node(&self) -> anyhow::Result<DynamoNode> {
        match &self.advertise {
            Some(advertise) => advertise
                .parse::<DynamoNode>()
                .with_context(|| format!("Invalid --advertise '{}'", advertise)),
            None => Ok(DynamoNode::from(self.listen)),
        }
    }

    /// Load the cluster file, if one was given
    pub fn load_cluster(&self) -> anyhow::Result<Option<ClusterConfig>> {
        self.cluster
            .as_ref()
            .map(|path| ClusterConfig::load(path).context("Failed to load cluster file"))
            .transpose()
    }

    /// Resolve identity, quorums and the startup preference list
    pub fn resolve(&self) -> anyhow::Result<NodeSettings> {
        self.validate()?;
        let self_node = self.self_node()?;

        let Some(cluster) = self.load_cluster()? else {
            return Ok(NodeSettings {
                replica: ReplicaConfig {
                    node_id: self.node_id.clone().unwrap_or_else(|| self_node.endpoint()),
                    self_node,
                    write_quorum: self.write_quorum,
                    read_quorum: self.read_quorum,
                },
                preference_list: None,
            });
        };

        let index = cluster.position(&self_node).with_context(|| {
            format!("{} is not listed in the cluster file", self_node)
        })?;
        Ok(NodeSettings {
            replica: ReplicaConfig {
                node_id: self.node_id.clone().unwrap_or_else(|| index.to_string()),
                self_node,
                write_quorum: cluster.write_quorum,
                read_quorum: cluster.read_quorum,
            },
            preference_list: Some(cluster.preference_list_for(index)),
        })
    }
}
