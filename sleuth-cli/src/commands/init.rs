use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use sleuth_core::config::{CONFIG_FILE_NAME, SleuthConfig};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to write sleuth.toml into (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing sleuth.toml
    #[arg(long)]
    pub force: bool,
}

#[allow(clippy::unused_async)]
pub async fn run(args: InitArgs) -> anyhow::Result<()> {
    let dir = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;
    let target = dir.join(CONFIG_FILE_NAME);

    if target.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite the config",
            target.display()
        );
    }

    let text = SleuthConfig::default()
        .to_toml()
        .context("Cannot serialize default config")?;
    std::fs::write(&target, text)
        .with_context(|| format!("Cannot write config: {}", target.display()))?;

    println!("Wrote {}", target.display());
    Ok(())
}
