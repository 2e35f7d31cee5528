use anyhow::Result;
use clap::Parser;
use contribwatch::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.execute()
}
