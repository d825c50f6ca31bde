//! dynamoctl command line

use clap::{Parser, Subcommand};
use dynamo_core::{Context, DynamoNode, VectorClock};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Issue operations to Dynamo nodes
#[derive(Parser, Debug, Clone)]
#[command(name = "dynamoctl")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Node to send the command to (host:port)
    #[arg(long, default_value = "127.0.0.1:8080", env = "DYNAMO_NODE")]
    pub node: DynamoNode,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a value
    Put {
        key: String,
        value: String,
        /// Context clock as JSON, e.g. '{"0":1}' (omit for a fresh context)
        #[arg(long, value_parser = parse_context)]
        context: Option<Context>,
        /// Write to the node's local store only
        #[arg(long)]
        local: bool,
    },
    /// Read a key
    Get {
        key: String,
        /// Read the node's local store only
        #[arg(long)]
        local: bool,
    },
    /// Make the node unavailable for a number of seconds
    Crash { seconds: u64 },
    /// Run one anti-entropy round on the node
    Gossip,
    /// Install the node's preference list
    PreferenceList {
        #[arg(required = true)]
        nodes: Vec<DynamoNode>,
    },
    /// Send every node in a cluster file its rotated preference list
    InstallCluster { file: PathBuf },
}

/// Parse a context clock from a JSON object of replica id to counter
pub fn parse_context(s: &str) -> Result<Context, String> {
    let counters: BTreeMap<String, u64> =
        serde_json::from_str(s).map_err(|e| format!("invalid context clock: {}", e))?;
    Ok(Context::new(VectorClock::from(counters)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put_with_context() {
        let config = Config::parse_from([
            "dynamoctl",
            "--node",
            "localhost:8081",
            "put",
            "s1",
            "abcde",
            "--context",
            r#"{"0": 2, "1": 1}"#,
        ]);

        assert_eq!(config.node, DynamoNode::new("localhost", 8081));
        match config.command {
            Command::Put { key, value, context, local } => {
                assert_eq!(key, "s1");
                assert_eq!(value, "abcde");
                let clock = context.unwrap().clock;
                assert!(clock.version_is("0", 2));
                assert!(clock.version_is("1", 1));
                assert!(!local);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_preference_list() {
        let config = Config::parse_from([
            "dynamoctl",
            "preference-list",
            "localhost:8080",
            "localhost:8081",
        ]);
        match config.command {
            Command::PreferenceList { nodes } => assert_eq!(nodes.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Config::try_parse_from(["dynamoctl", "--node", "nohost", "gossip"]).is_err());
        assert!(Config::try_parse_from(["dynamoctl", "preference-list"]).is_err());
        assert!(parse_context("[1, 2]").is_err());
        assert!(parse_context("{}").unwrap().clock.is_empty());
    }
}
