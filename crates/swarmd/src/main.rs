use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::RootCommand;

mod cli;
mod config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    RootCommand::parse().run().await
}

/// Daemon crates log at info by default; `RUST_LOG` directives are appended
/// on top and can narrow or widen any of them.
fn init_tracing() -> eyre::Result<()> {
    let defaults = "swarmd=info,swarmd_daemon=info,swarmd_host=info";

    let filter = match std::env::var("RUST_LOG") {
        Ok(overrides) => EnvFilter::builder().parse(format!("{defaults},{overrides}"))?,
        Err(_) => EnvFilter::new(defaults),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
