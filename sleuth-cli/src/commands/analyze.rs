use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Args;
use tracing::info;

use sleuth_core::config::SleuthConfig;
use sleuth_core::investigate::{
    InvestigationRequest, LlmReasoner, ReasoningService, ScriptedReasoner,
};
use sleuth_core::llm::providers::create_provider_from_config;
use sleuth_core::pipeline::InvestigationSession;
use sleuth_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter, reveal_observer};
use sleuth_core::quote::{QuoteSource, StooqQuotes};
use sleuth_core::render::{Format, render_state};
use sleuth_core::reveal::RevealPhase;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Ticker symbol, e.g. AAPL
    pub ticker: String,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Use the scripted investigation instead of an LLM
    #[arg(long)]
    pub offline: bool,

    /// Skip the price series fetch
    #[arg(long)]
    pub no_quotes: bool,

    /// Pause between revealed steps, overriding reveal.delay_ms
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Output format: text, json, dot, mermaid
    #[arg(long, default_value = "text")]
    pub format: Format,

    /// Config file (default: ./sleuth.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    if args.ticker.trim().is_empty() {
        anyhow::bail!("Ticker must not be empty");
    }
    if args.start > args.end {
        anyhow::bail!(
            "Invalid date range: start {} is after end {}",
            args.start,
            args.end
        );
    }

    let mut config = super::load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let reasoner: Box<dyn ReasoningService> = if args.offline {
        Box::new(ScriptedReasoner)
    } else {
        let provider = create_provider_from_config(&config.llm)?;
        Box::new(LlmReasoner::new(provider, config.llm.temperature))
    };
    let quotes: Option<Box<dyn QuoteSource>> = if config.quotes.enabled {
        Some(Box::new(StooqQuotes::new(&config.quotes)?))
    } else {
        None
    };

    let mut session = InvestigationSession::from_config(&config, reasoner, quotes);
    let request = InvestigationRequest::new(&args.ticker, args.start, args.end);

    let reporter: Arc<dyn ProgressReporter> = if args.format == Format::Text {
        Arc::new(IndicatifReporter::new())
    } else {
        Arc::new(NoopReporter)
    };
    let observer = reveal_observer(
        Arc::clone(&reporter),
        format!("Investigating {}", request.ticker),
    );

    let investigation = session
        .analyze(&request, observer)
        .await
        .context("Investigation failed")?;
    info!(
        ticker = %request.ticker,
        nodes = investigation.graph.len(),
        strict = investigation.strict,
        prices = investigation.prices.as_ref().map_or(0, Vec::len),
        "Revealing investigation"
    );

    let handle = investigation.handle.clone();
    let phase = tokio::select! {
        phase = handle.wait() => phase,
        _ = tokio::signal::ctrl_c() => {
            session.cancel();
            RevealPhase::Cancelled
        }
    };
    reporter.finish();

    if phase == RevealPhase::Cancelled {
        eprintln!("Investigation cancelled");
    }
    print!("{}", render_state(&handle.snapshot(), args.format));
    if args.format == Format::Json {
        println!();
    }
    Ok(())
}

fn apply_overrides(config: &mut SleuthConfig, args: &AnalyzeArgs) {
    if let Some(delay_ms) = args.delay_ms {
        config.reveal.delay_ms = delay_ms;
    }
    if args.no_quotes {
        config.quotes.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> AnalyzeArgs {
        AnalyzeArgs {
            ticker: "AAPL".into(),
            start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 28).unwrap(),
            offline: true,
            no_quotes: true,
            delay_ms: Some(0),
            format: Format::Json,
            config: None,
        }
    }

    #[test]
    fn overrides_apply_to_config() {
        let mut config = SleuthConfig::default();
        apply_overrides(&mut config, &args());
        assert_eq!(config.reveal.delay_ms, 0);
        assert!(!config.quotes.enabled);
    }

    #[test]
    fn absent_overrides_keep_config() {
        let mut config = SleuthConfig::default();
        let args = AnalyzeArgs {
            delay_ms: None,
            no_quotes: false,
            ..args()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.reveal.delay_ms, 1000);
        assert!(config.quotes.enabled);
    }
}
