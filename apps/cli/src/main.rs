//! FeedBuilder CLI: vendor catalog to static feed converter.
//!
//! Fetches vendor XML over FTP, selects and prices products, and publishes
//! CSV files, an XML feed and a run status marker for static hosting.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
