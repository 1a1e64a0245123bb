use anyhow::Result;
use clap::Parser;
use marrvel_main::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    marrvel_main::run(cli).await
}
