use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;

use sleuth_core::quote::{PriceSummary, QuoteSource, StooqQuotes};

#[derive(Args, Debug)]
pub struct QuotesArgs {
    /// Ticker symbol, e.g. AAPL
    pub ticker: String,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day of the range (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Emit JSON instead of CSV
    #[arg(long)]
    pub json: bool,

    /// Config file (default: ./sleuth.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn run(args: QuotesArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let source = StooqQuotes::new(&config.quotes)?;

    let ticker = args.ticker.trim().to_uppercase();
    let Some(bars) = source
        .fetch_price_series(&ticker, args.start, args.end)
        .await?
    else {
        anyhow::bail!(
            "No price data for {ticker} between {} and {}",
            args.start,
            args.end
        );
    };

    if args.json {
        let doc = serde_json::json!({
            "ticker": ticker,
            "summary": PriceSummary::from_bars(&bars),
            "bars": bars,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Date,Open,High,Low,Close,Volume");
    for bar in &bars {
        println!(
            "{},{},{},{},{},{}",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        );
    }
    if let Some(summary) = PriceSummary::from_bars(&bars) {
        eprintln!(
            "{ticker}: {} sessions, {:.2} -> {:.2} ({:+.2}%)",
            summary.sessions, summary.first_close, summary.last_close, summary.change_pct
        );
    }
    Ok(())
}
