//! Entry-point for the `repochat` binary.
use clap::Parser;
use repochat_cli::Cli;
use repochat_cli::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_main(Cli::parse()).await
}
