use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;

use sleuth_core::classify::KeywordClassifier;
use sleuth_core::graph::GraphBuilder;
use sleuth_core::pipeline::graph_from_response;
use sleuth_core::render::{Format, render_graph};

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// File holding a raw model response, or `-` for stdin
    #[arg(long, default_value = "-")]
    pub input: PathBuf,

    /// Output format: text, json, dot, mermaid
    #[arg(long, default_value = "text")]
    pub format: Format,

    /// Config file (default: ./sleuth.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Exit non-zero if the built graph violates a structural invariant
    #[arg(long)]
    pub check: bool,
}

#[allow(clippy::unused_async)]
pub async fn run(args: GraphArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let raw = read_input(&args.input)?;

    let builder = GraphBuilder::new(config.reveal.cross_validate_lookback);
    let (normalized, graph) = graph_from_response(&raw, &KeywordClassifier::default(), &builder);
    info!(
        reading = normalized.kind(),
        nodes = graph.len(),
        edges = graph.edges.len(),
        "Graph built"
    );

    if args.check {
        let problems = graph.check_invariants();
        if !problems.is_empty() {
            anyhow::bail!("Graph invariant violated: {}", problems.join("; "));
        }
    }

    print!("{}", render_graph(&graph, args.format));
    if args.format == Format::Json {
        println!();
    }
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Cannot read stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read input: {}", path.display()))
    }
}
