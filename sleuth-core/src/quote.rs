// Daily OHLCV series from Stooq's CSV download endpoint (no API key).
#![allow(clippy::cast_precision_loss)]

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::QuotesSection;
use crate::error::{QuoteError, SleuthError};

/// One trading session. Malformed numeric fields are `NaN`, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Source of a daily price series for a ticker and inclusive date range.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync + std::fmt::Debug {
    /// `Ok(None)` means the provider has no rows for the range.
    async fn fetch_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Option<Vec<PriceBar>>>;
}

// ── Stooq ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct StooqQuotes {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl StooqQuotes {
    pub fn new(config: &QuotesSection) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SleuthError::Quote(QuoteError::Network(e.to_string())))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn url_for(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/q/d/l/?s={}&d1={}&d2={}&i=d",
            self.base_url,
            stooq_symbol(ticker),
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }
}

#[async_trait::async_trait]
impl QuoteSource for StooqQuotes {
    #[instrument(skip(self), name = "stooq_fetch")]
    async fn fetch_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> crate::error::Result<Option<Vec<PriceBar>>> {
        validate_request(ticker, start, end)?;
        let url = self.url_for(ticker, start, end);
        debug!(url = %url, "Fetching price CSV");

        // Stooq sometimes rejects requests without a browser-like UA.
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| SleuthError::Quote(QuoteError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SleuthError::Quote(QuoteError::Status { status, body }));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| SleuthError::Quote(QuoteError::Network(e.to_string())))?;
        let bars = parse_price_csv(&text);
        info!(ticker, rows = bars.len(), "Price series fetched");
        Ok((!bars.is_empty()).then_some(bars))
    }
}

fn validate_request(ticker: &str, start: NaiveDate, end: NaiveDate) -> crate::error::Result<()> {
    if ticker.trim().is_empty() {
        return Err(QuoteError::InvalidRequest("ticker is empty".into()).into());
    }
    if start > end {
        return Err(
            QuoteError::InvalidRequest(format!("start {start} is after end {end}")).into(),
        );
    }
    Ok(())
}

/// Stooq symbol for a ticker: lower-cased, `.us` appended unless a market
/// suffix is already present.
pub fn stooq_symbol(ticker: &str) -> String {
    let ticker = ticker.trim();
    if ticker.contains('.') {
        ticker.to_string()
    } else {
        format!("{}.us", ticker.to_lowercase())
    }
}

/// Parse `Date,Open,High,Low,Close,Volume` CSV. The first non-empty line is
/// the header and is discarded.
pub fn parse_price_csv(csv: &str) -> Vec<PriceBar> {
    let mut lines = csv
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty());
    if lines.next().is_none() {
        return Vec::new();
    }

    lines
        .map(|line| {
            let mut fields = line.split(',');
            let date = fields.next().unwrap_or_default().trim().to_string();
            let mut num = || {
                fields
                    .next()
                    .and_then(|f| f.trim().parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            };
            PriceBar {
                date,
                open: num(),
                high: num(),
                low: num(),
                close: num(),
                volume: num(),
            }
        })
        .collect()
}

/// Headline numbers for a series, used to enrich the investigation prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub first_date: String,
    pub last_date: String,
    pub first_close: f64,
    pub last_close: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub sessions: usize,
}

impl PriceSummary {
    /// `None` when there is no bar with a finite close.
    pub fn from_bars(bars: &[PriceBar]) -> Option<Self> {
        let mut closes = bars.iter().filter(|b| b.close.is_finite());
        let first = closes.next()?;
        let last = closes.last().unwrap_or(first);

        let high = bars
            .iter()
            .map(|b| b.high)
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max);
        let low = bars
            .iter()
            .map(|b| b.low)
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::min);
        let change_pct = if first.close.abs() < f64::EPSILON {
            0.0
        } else {
            (last.close - first.close) / first.close * 100.0
        };

        Some(Self {
            first_date: first.date.clone(),
            last_date: last.date.clone(),
            first_close: first.close,
            last_close: last.close,
            change_pct,
            high,
            low,
            sessions: bars.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Date,Open,High,Low,Close,Volume\r\n\
        2024-01-02,187.15,188.44,183.89,185.64,82488700\r\n\
        2024-01-03,184.22,185.88,183.43,184.25,58414500\r\n\
        \r\n\
        2024-01-04,182.15,183.09,180.88,181.91,71983600\r\n";

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_rows_and_drops_header() {
        let bars = parse_price_csv(CSV);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, "2024-01-02");
        assert!((bars[0].open - 187.15).abs() < 1e-9);
        assert!((bars[2].volume - 71_983_600.0).abs() < 1e-3);
    }

    #[test]
    fn malformed_fields_become_nan() {
        let bars = parse_price_csv("Date,Open,High,Low,Close,Volume\n2024-01-02,abc,1,2\n");
        assert_eq!(bars.len(), 1);
        assert!(bars[0].open.is_nan());
        assert!((bars[0].high - 1.0).abs() < f64::EPSILON);
        assert!(bars[0].close.is_nan());
        assert!(bars[0].volume.is_nan());
    }

    #[test]
    fn header_only_or_no_data_is_empty() {
        assert!(parse_price_csv("").is_empty());
        assert!(parse_price_csv("No data").is_empty());
        assert!(parse_price_csv("Date,Open,High,Low,Close,Volume\n").is_empty());
    }

    #[test]
    fn symbol_and_url() {
        assert_eq!(stooq_symbol("AAPL"), "aapl.us");
        assert_eq!(stooq_symbol("vod.uk"), "vod.uk");

        let quotes = StooqQuotes::new(&QuotesSection {
            base_url: "https://stooq.example/".into(),
            ..QuotesSection::default()
        })
        .unwrap();
        assert_eq!(
            quotes.url_for("AAPL", date("2024-01-02"), date("2024-02-01")),
            "https://stooq.example/q/d/l/?s=aapl.us&d1=20240102&d2=20240201&i=d"
        );
    }

    #[test]
    fn request_validation() {
        assert!(validate_request("AAPL", date("2024-01-02"), date("2024-01-02")).is_ok());
        assert!(validate_request(" ", date("2024-01-02"), date("2024-01-03")).is_err());
        let err = validate_request("AAPL", date("2024-02-01"), date("2024-01-01")).unwrap_err();
        assert!(err.to_string().contains("is after end"));
    }

    #[test]
    fn summary_skips_non_finite_values() {
        let mut bars = parse_price_csv(CSV);
        bars[1].high = f64::NAN;
        let summary = PriceSummary::from_bars(&bars).unwrap();
        assert_eq!(summary.first_date, "2024-01-02");
        assert_eq!(summary.last_date, "2024-01-04");
        assert_eq!(summary.sessions, 3);
        assert!((summary.high - 188.44).abs() < 1e-9);
        assert!((summary.low - 180.88).abs() < 1e-9);
        assert!(summary.change_pct < 0.0);

        assert!(PriceSummary::from_bars(&[]).is_none());
    }
}
