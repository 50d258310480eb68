//! `weatherzip` binary: serves current temperatures by postal code.

use clap::Parser;
use weatherzip_api::logging::{LoggingConfig, init_logging};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    init_logging(&LoggingConfig::from_env())?;
    cmd.run().await
}
