//! dynamoctl - operator and test harness for Dynamo nodes
//!
//! Sends a single operation to a node (or preference lists to a whole
//! cluster) and prints the outcome.

mod commands;
mod config;

use clap::Parser;
use config::Config;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging; stdout is reserved for command output
    let default_level = if config.verbose { "dynamoctl=debug" } else { "dynamoctl=warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match commands::execute(&config.node, config.command).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
