//! Reasoning service: produces the raw step text for an investigation.
//!
//! [`LlmReasoner`] asks a model for a JSON step list; [`ScriptedReasoner`]
//! is the offline fallback with a fixed five-step narrative. Either way the
//! result is raw text for the normalizer, which tolerates whatever shape
//! comes back.

use std::fmt::Write;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::llm::{Completion, LlmProvider};
use crate::quote::{PriceBar, PriceSummary};
use crate::types::Step;

/// Rows beyond this are summarized rather than listed in the prompt.
const MAX_PROMPT_ROWS: usize = 60;

pub const SYSTEM_PROMPT: &str = "You are an autonomous stock investigator. Decide which leads \
to follow, what to investigate, and provide structured insights.";

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl InvestigationRequest {
    pub fn new(ticker: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: ticker.into().trim().to_uppercase(),
            start,
            end,
        }
    }
}

/// Produces raw investigation text. Failures are reported as errors and no
/// graph is built from them.
#[async_trait::async_trait]
pub trait ReasoningService: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn generate_investigation(
        &self,
        request: &InvestigationRequest,
        prices: Option<&[PriceBar]>,
    ) -> crate::error::Result<String>;
}

// ── LLM-backed ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LlmReasoner {
    provider: Box<dyn LlmProvider>,
    temperature: f64,
}

impl LlmReasoner {
    pub fn new(provider: Box<dyn LlmProvider>, temperature: f64) -> Self {
        Self {
            provider,
            temperature,
        }
    }
}

#[async_trait::async_trait]
impl ReasoningService for LlmReasoner {
    fn name(&self) -> &str {
        self.provider.name()
    }

    #[instrument(skip_all, name = "llm_investigate", fields(ticker = %request.ticker))]
    async fn generate_investigation(
        &self,
        request: &InvestigationRequest,
        prices: Option<&[PriceBar]>,
    ) -> crate::error::Result<String> {
        let prompt = build_prompt(request, prices);
        let (text, usage) = self
            .provider
            .call(&Completion {
                system: SYSTEM_PROMPT,
                prompt: &prompt,
                temperature: self.temperature,
            })
            .await?;
        info!(
            provider = self.provider.name(),
            model = self.provider.model_id(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            chars = text.len(),
            "Investigation text received"
        );
        Ok(text)
    }
}

/// User prompt for the model: the goal, the expected output shape and, when
/// available, the price series.
pub fn build_prompt(request: &InvestigationRequest, prices: Option<&[PriceBar]>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Determine why {} stock changed price from {} to {}.",
        request.ticker, request.start, request.end
    );
    prompt.push_str(
        "Use news, earnings, SEC filings, social media, and historical prices. \
         Make independent decisions, spawn sub-investigations, cross-validate data, \
         form hypotheses, and produce a final conclusion.\n\n",
    );
    prompt.push_str(
        "Respond with a JSON array only, one object per reasoning step in the order you took \
         them: [{\"label\": \"short title\", \"description\": \"what you did and found\"}]. \
         Put \"Sub-Investigation\" in the label of a step that opens a side inquiry, \
         \"Cross-Validation\" in the label of a step that re-checks an earlier finding, and \
         \"Inference\" or \"Conclusion\" in the label of a step that draws a conclusion.\n",
    );

    match prices.filter(|p| !p.is_empty()) {
        Some(bars) => {
            prompt.push_str("\nDaily prices (date,open,high,low,close,volume):\n");
            if let Some(summary) = PriceSummary::from_bars(bars) {
                let _ = writeln!(
                    prompt,
                    "Summary: {} sessions, close {:.2} on {} -> {:.2} on {} ({:+.2}%), \
                     range {:.2}-{:.2}.",
                    summary.sessions,
                    summary.first_close,
                    summary.first_date,
                    summary.last_close,
                    summary.last_date,
                    summary.change_pct,
                    summary.low,
                    summary.high,
                );
            }
            for bar in sample_rows(bars) {
                let _ = writeln!(
                    prompt,
                    "{},{},{},{},{},{}",
                    bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
                );
            }
        }
        None => prompt.push_str("\nNo price data is available; reason from other sources.\n"),
    }
    prompt
}

/// First and last rows when the series is too long for the prompt.
fn sample_rows(bars: &[PriceBar]) -> impl Iterator<Item = &PriceBar> {
    let half = MAX_PROMPT_ROWS / 2;
    let (head, tail) = if bars.len() > MAX_PROMPT_ROWS {
        (&bars[..half], &bars[bars.len() - half..])
    } else {
        (bars, &bars[..0])
    };
    head.iter().chain(tail.iter())
}

// ── Scripted fallback ───────────────────────────────────────────────

/// Offline reasoner with a fixed narrative. Emits a JSON step list.
#[derive(Debug, Default)]
pub struct ScriptedReasoner;

impl ScriptedReasoner {
    pub fn steps(request: &InvestigationRequest, prices: Option<&[PriceBar]>) -> Vec<Step> {
        let ticker = &request.ticker;
        let movement = prices
            .and_then(PriceSummary::from_bars)
            .map(|s| {
                format!(
                    " Close moved {:+.2}% from {:.2} to {:.2}.",
                    s.change_pct, s.first_close, s.last_close
                )
            })
            .unwrap_or_default();

        vec![
            Step::new(
                format!("Fetch {ticker} Price Data"),
                format!(
                    "Fetching price data for {ticker} from {} to {}.{movement}",
                    request.start, request.end
                ),
            ),
            Step::new(
                "Sentiment Analysis: News Articles",
                format!("Analyzing latest news for {ticker} to determine market sentiment"),
            ),
            Step::new(
                "Agent Decision: Investigate Earnings",
                "Based on sentiment and price trends, the AI chooses to investigate earnings reports",
            ),
            Step::new(
                "Cross-Validation: Data Check",
                "Comparing historical price movement vs earnings report for validation",
            ),
            Step::new(
                "Inference Node: Price Prediction",
                format!(
                    "AI predicts price movement for {ticker}. Reason: strong earnings + positive \
                     sentiment. Recommendation: BUY"
                ),
            ),
        ]
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl ReasoningService for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_investigation(
        &self,
        request: &InvestigationRequest,
        prices: Option<&[PriceBar]>,
    ) -> crate::error::Result<String> {
        let steps = Self::steps(request, prices);
        // Serializing plain strings cannot fail.
        Ok(serde_json::to_string(&steps).unwrap_or_default())
    }
}

/// The "Expected Inputs / Outputs" step optionally placed first.
pub fn brief_step(request: &InvestigationRequest) -> Step {
    Step::new(
        "Expected Inputs / Outputs",
        format!(
            "Expected inputs: ticker {}, start date {} and price, end date {} and price\n\
             Expected output: why {} price changed (increased or decreased)",
            request.ticker, request.start, request.end, request.ticker
        ),
    )
}
