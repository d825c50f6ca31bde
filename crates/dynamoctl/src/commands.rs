//! Command execution

use crate::config::Command;
use anyhow::{bail, Context as _};
use dynamo_core::{ClusterConfig, Context, DynamoNode, DynamoResult, PutArgs};
use dynamo_net::DynamoClient;
use std::fmt::Write as _;
use tracing::{info, warn};

/// Run `command` against `node`, returning what to print
pub async fn execute(node: &DynamoNode, command: Command) -> anyhow::Result<String> {
    match command {
        Command::Put { key, value, context, local } => {
            let mut client = connect(node).await?;
            let args = PutArgs::new(key, context.unwrap_or_else(Context::fresh), value.into_bytes());
            let accepted = if local {
                client.put_once(args).await?
            } else {
                client.put(args).await?
            };
            if !accepted {
                bail!("{} refused the write (stale or duplicate context)", node);
            }
            Ok("OK".to_string())
        }
        Command::Get { key, local } => {
            let mut client = connect(node).await?;
            let result = if local {
                client.get_once(key).await?
            } else {
                client.get(key).await?
            };
            Ok(format_result(&result))
        }
        Command::Crash { seconds } => {
            if !connect(node).await?.crash(seconds).await? {
                bail!("{} is already crashed", node);
            }
            Ok(format!("{} crashed for {}s", node, seconds))
        }
        Command::Gossip => {
            connect(node).await?.gossip().await?;
            Ok("OK".to_string())
        }
        Command::PreferenceList { nodes } => {
            connect(node).await?.send_preference_list(nodes).await?;
            Ok("OK".to_string())
        }
        Command::InstallCluster { file } => {
            let cluster = ClusterConfig::load(&file).context("Failed to load cluster file")?;
            install_cluster(&cluster).await
        }
    }
}

async fn connect(node: &DynamoNode) -> anyhow::Result<DynamoClient> {
    DynamoClient::connect(node)
        .await
        .with_context(|| format!("Failed to connect to {}", node))
}

/// Give node `i` the cluster list rotated by `i`. Unreachable nodes are
/// reported and skipped.
pub async fn install_cluster(cluster: &ClusterConfig) -> anyhow::Result<String> {
    let mut installed = 0;
    for (index, node) in cluster.nodes.iter().enumerate() {
        let list = cluster.preference_list_for(index);
        let outcome = match DynamoClient::connect(node).await {
            Ok(mut client) => client.send_preference_list(list).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                info!("Installed preference list on {}", node);
                installed += 1;
            }
            Err(e) => warn!("Could not install preference list on {}: {}", node, e),
        }
    }

    if installed == 0 {
        bail!("No node in the cluster was reachable");
    }
    Ok(format!("Installed {}/{} nodes", installed, cluster.cluster_size()))
}

/// One line per version: clock, then the value
pub fn format_result(result: &DynamoResult) -> String {
    if result.is_empty() {
        return "(no value)".to_string();
    }
    let mut out = String::new();
    for (i, entry) in result.entries.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{} {}",
            entry.context.clock,
            String::from_utf8_lossy(&entry.value)
        );
    }
    out
}
