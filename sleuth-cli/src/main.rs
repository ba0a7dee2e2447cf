use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "sleuth",
    version,
    about = "Watch an investigation of a stock's price move unfold as a reasoning graph"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0: success
///   1: general/unknown error
///   2: configuration error
///   5: quote provider or network error
///   6: LLM API error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    // LLM key errors mention "configuration", so check them first.
    if lower.contains("llm error") || lower.contains("api_key") {
        6 // LLM API error
    } else if lower.contains("quote error")
        || lower.contains("price data")
        || lower.contains("network error")
    {
        5 // quote provider error
    } else if lower.contains("config") {
        2 // config error
    } else {
        1 // general error
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // reqwest is built without a default TLS provider.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
