use clap::Parser;
use graphmind::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ask(args) => cli::ask::run(args).await,
        Command::Config => cli::config::run().await,
    }
}
