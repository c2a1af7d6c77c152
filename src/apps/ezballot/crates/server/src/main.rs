use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ezballot_server::cli::Cli::parse();
    cli.run().await
}
