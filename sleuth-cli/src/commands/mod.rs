pub mod analyze;
pub mod graph;
pub mod init;
pub mod quotes;

use std::path::Path;

use anyhow::Context;
use clap::Subcommand;

use sleuth_core::config::SleuthConfig;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Investigate a ticker's price move and reveal the reasoning graph
    Analyze(analyze::AnalyzeArgs),
    /// Build a graph from a saved model response without calling any service
    Graph(graph::GraphArgs),
    /// Fetch and print the daily price series for a ticker
    Quotes(quotes::QuotesArgs),
    /// Write a default sleuth.toml
    Init(init::InitArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Analyze(args) => analyze::run(args).await,
        Command::Graph(args) => graph::run(args).await,
        Command::Quotes(args) => quotes::run(args).await,
        Command::Init(args) => init::run(args).await,
    }
}

/// Load `--config` if given, otherwise `./sleuth.toml` when present.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SleuthConfig> {
    let cwd = std::env::current_dir().context("Cannot read current directory")?;
    SleuthConfig::discover(path, &cwd).context("Cannot load config")
}
