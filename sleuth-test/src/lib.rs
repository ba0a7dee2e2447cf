// Integration test utilities and fixtures for Sleuth.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;

use sleuth_core::error::{LlmError, QuoteError, Result, SleuthError};
use sleuth_core::investigate::InvestigationRequest;
use sleuth_core::llm::{Completion, LlmProvider, TokenUsage};
use sleuth_core::quote::{PriceBar, QuoteSource, parse_price_csv};

// ── Canned model responses ─────────────────────────────────────────

/// The three-step example: fetch, sub-investigation, cross-validation.
pub const SCENARIO: &str = include_str!("../fixtures/scenario.json");

/// `{"steps": [...]}` with `title`/`content` keys inside a code fence.
pub const FENCED_ENVELOPE: &str = include_str!("../fixtures/fenced_envelope.md");

/// Numbered prose with blank lines; not JSON.
pub const PROSE: &str = include_str!("../fixtures/prose.txt");

/// Nine steps with three branch steps and two cross-validations.
pub const DEEP_INVESTIGATION: &str = include_str!("../fixtures/deep_investigation.json");

/// Stooq CSV for AAPL, four sessions in early January 2024.
pub const AAPL_CSV: &str = include_str!("../fixtures/aapl.csv");

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("fixture date")
}

pub fn request(ticker: &str, start: &str, end: &str) -> InvestigationRequest {
    InvestigationRequest::new(ticker, date(start), date(end))
}

pub fn aapl_bars() -> Vec<PriceBar> {
    parse_price_csv(AAPL_CSV)
}

// ── Mock LLM provider ──────────────────────────────────────────────

/// Replays queued replies in order and records every prompt it receives.
/// An exhausted queue answers with an HTTP 500.
#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<std::result::Result<String, u16>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    pub fn replying<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Arc::default(),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(status)])),
            prompts: Arc::default(),
        }
    }

    /// Shared view of received prompts, still readable once the provider
    /// has been boxed into a reasoner.
    pub fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model_id(&self) -> &'static str {
        "mock-1"
    }

    async fn call(&self, completion: &Completion<'_>) -> Result<(String, TokenUsage)> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(completion.prompt.to_string());
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(500));
        match reply {
            Ok(text) => {
                let usage = TokenUsage {
                    input_tokens: completion.prompt.len() as u64,
                    output_tokens: text.len() as u64,
                };
                Ok((text, usage))
            }
            Err(status) => Err(SleuthError::Llm(LlmError::ApiError {
                status,
                body: "mock failure".into(),
            })),
        }
    }
}

// ── Mock quote source ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum QuoteBehavior {
    Bars(Vec<PriceBar>),
    NoData,
    HttpStatus(u16),
}

/// Answers every fetch the same way and counts calls.
#[derive(Debug)]
pub struct MockQuotes {
    behavior: QuoteBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockQuotes {
    pub fn new(behavior: QuoteBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::default(),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait::async_trait]
impl QuoteSource for MockQuotes {
    async fn fetch_price_series(
        &self,
        _ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Option<Vec<PriceBar>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            QuoteBehavior::Bars(bars) => Ok(Some(bars.clone())),
            QuoteBehavior::NoData => Ok(None),
            QuoteBehavior::HttpStatus(status) => Err(QuoteError::Status {
                status: *status,
                body: "mock failure".into(),
            }
            .into()),
        }
    }
}
