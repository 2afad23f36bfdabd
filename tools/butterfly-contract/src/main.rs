use anyhow::Result;
use butterfly_contract::cli::Cli;
use clap::Parser;

fn main() -> Result<()> {
    Cli::parse().run()
}
