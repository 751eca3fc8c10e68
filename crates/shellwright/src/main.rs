//! # shellwright
//!
//! Runs commands through a stateful shell session and prints their
//! de-noised output. Logs go to stderr so stdout carries only command output.

use clap::Parser;
use shellwright::{load_config, run_with_connector, Args};
use shellwright_transport::LocalConnector;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "shellwright v{} starting: target={}:{}",
        env!("CARGO_PKG_VERSION"),
        config.connection.host,
        config.connection.port
    );

    let connector = LocalConnector::new(config.local.clone());
    let mut stdout = std::io::stdout().lock();
    run_with_connector(&args, &config, connector, &mut stdout).map_err(|e| {
        tracing::error!("{:#}", e);
        e
    })
}
