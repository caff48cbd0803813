mod cli;
mod config;
mod devops;
mod error;
mod export;
mod iteration;
mod leadtime;
mod listing;
mod model;
mod retriever;
mod util;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // Progress goes to stderr so stdout only carries output paths and listings
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    cli::run(cli).await
}
