//! dynamod - Dynamo replica daemon
//!
//! Serves quorum Put/Get, the local replication primitives, crash
//! simulation and anti-entropy gossip for one node of the cluster.

use clap::Parser;
use dynamod::config::Config;
use dynamod::server::Server;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &Config) {
    let default_level = if config.verbose { "dynamod=debug" } else { "dynamod=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();
    init_logging(&config);

    info!("dynamod v{} - Dynamo replica daemon", env!("CARGO_PKG_VERSION"));

    let server = match Server::new(config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("Failed to initialize server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Install signal handler
    let signal_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_server.shutdown();
    });

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
