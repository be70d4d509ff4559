mod archive;
mod auth;
mod cli;
mod collector;
mod error;
mod providers;
mod report;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting TestStats - CI test report uploader");
    cli.execute().await?;

    Ok(())
}
