use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dns_zone_server::{logging, DnsServer, Resolver, ZoneStore};
use tokio::signal;
use tracing::info;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    logging::init_logging(&args.log_level);

    let config = args.server_config();
    let zone = ZoneStore::from_file(&config.zone_file)
        .with_context(|| format!("Failed to load zone file {}", config.zone_file.display()))?;

    let server = DnsServer::bind(&config, Resolver::new(Arc::new(zone))).await?;

    tokio::select! {
        res = server.start() => res,
        res = signal::ctrl_c() => {
            res.context("Unable to listen for shutdown signal")?;
            info!("received shutdown signal, stopping");
            Ok(())
        }
    }
}
