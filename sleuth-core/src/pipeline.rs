//! Investigation session: one `analyze` action end to end.
//!
//! Each call retires the previous reveal before doing anything else, then
//! fetches quotes (optional), asks the reasoner for steps, builds the full
//! graph and hands it to the reveal scheduler.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::classify::{KeywordClassifier, StepClassifier};
use crate::config::SleuthConfig;
use crate::error::{QuoteError, Result};
use crate::graph::{GraphBuilder, InvestigationGraph};
use crate::investigate::{InvestigationRequest, ReasoningService, brief_step};
use crate::normalize::{Normalized, normalize_tagged};
use crate::quote::{PriceBar, QuoteSource};
use crate::reveal::{RevealHandle, RevealScheduler, RevealState};
use crate::types::StepRole;

/// Outcome of a successful `analyze` call.
#[derive(Debug)]
pub struct Investigation {
    pub request: InvestigationRequest,
    pub prices: Option<Vec<PriceBar>>,
    /// Whether the model's text was a strict JSON step list.
    pub strict: bool,
    pub graph: Arc<InvestigationGraph>,
    pub handle: RevealHandle,
}

/// Normalize, classify and build in one go.
pub fn graph_from_response(
    raw: &str,
    classifier: &dyn StepClassifier,
    builder: &GraphBuilder,
) -> (Normalized, InvestigationGraph) {
    let normalized = normalize_tagged(raw);
    let graph = builder.build_steps(normalized.steps(), classifier);
    (normalized, graph)
}

#[derive(Debug)]
pub struct InvestigationSession {
    reasoner: Box<dyn ReasoningService>,
    quotes: Option<Box<dyn QuoteSource>>,
    classifier: Box<dyn StepClassifier>,
    builder: GraphBuilder,
    scheduler: RevealScheduler,
    delay: Duration,
    quotes_required: bool,
    include_brief: bool,
}

impl InvestigationSession {
    pub fn new(reasoner: Box<dyn ReasoningService>) -> Self {
        Self {
            reasoner,
            quotes: None,
            classifier: Box::new(KeywordClassifier::default()),
            builder: GraphBuilder::default(),
            scheduler: RevealScheduler::new(),
            delay: Duration::from_secs(1),
            quotes_required: false,
            include_brief: false,
        }
    }

    /// Session wired from a loaded config. `quotes` is ignored when
    /// `quotes.enabled` is off.
    pub fn from_config(
        config: &SleuthConfig,
        reasoner: Box<dyn ReasoningService>,
        quotes: Option<Box<dyn QuoteSource>>,
    ) -> Self {
        let mut session = Self::new(reasoner)
            .with_builder(GraphBuilder::new(config.reveal.cross_validate_lookback))
            .with_delay(config.reveal.delay())
            .quotes_required(config.quotes.required)
            .include_brief(config.investigation.include_brief);
        if config.quotes.enabled {
            session.quotes = quotes;
        }
        session
    }

    #[must_use]
    pub fn with_quotes(mut self, quotes: Box<dyn QuoteSource>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn StepClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_builder(mut self, builder: GraphBuilder) -> Self {
        self.builder = builder;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn quotes_required(mut self, required: bool) -> Self {
        self.quotes_required = required;
        self
    }

    #[must_use]
    pub fn include_brief(mut self, include: bool) -> Self {
        self.include_brief = include;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Handle of the run currently owned by this session.
    pub fn current(&self) -> Option<&RevealHandle> {
        self.scheduler.current()
    }

    pub fn cancel(&mut self) -> bool {
        self.scheduler.cancel()
    }

    /// Run one investigation and start revealing it.
    ///
    /// The previous run is cancelled first, even if this call later fails.
    /// Must be called within a Tokio runtime.
    #[instrument(skip_all, name = "analyze", fields(ticker = %request.ticker))]
    pub async fn analyze<F>(
        &mut self,
        request: &InvestigationRequest,
        on_update: F,
    ) -> Result<Investigation>
    where
        F: FnMut(&RevealState) + Send + 'static,
    {
        self.scheduler.cancel();

        let prices = self.fetch_prices(request).await?;
        let raw = self
            .reasoner
            .generate_investigation(request, prices.as_deref())
            .await?;

        let Plan { strict, graph } = self.plan(request, &raw);
        let graph = Arc::new(graph);
        let handle = self
            .scheduler
            .start(Arc::clone(&graph), self.delay, on_update);

        Ok(Investigation {
            request: request.clone(),
            prices,
            strict,
            graph,
            handle,
        })
    }

    /// Build the target graph for `raw` without starting a reveal.
    pub fn plan(&self, request: &InvestigationRequest, raw: &str) -> Plan {
        let normalized = normalize_tagged(raw);
        let strict = normalized.is_strict();
        let mut steps = normalized.into_steps();
        if self.include_brief {
            steps.insert(0, brief_step(request));
        }

        let graph = self.builder.build_steps(&steps, self.classifier.as_ref());
        let counts = graph.role_counts();
        info!(
            reasoner = self.reasoner.name(),
            strict,
            nodes = graph.len(),
            edges = graph.edges.len(),
            branches = counts.get(&StepRole::Branch).copied().unwrap_or(0),
            "Investigation graph built"
        );
        Plan { strict, graph }
    }

    async fn fetch_prices(&self, request: &InvestigationRequest) -> Result<Option<Vec<PriceBar>>> {
        let Some(quotes) = &self.quotes else {
            return Ok(None);
        };

        match quotes
            .fetch_price_series(&request.ticker, request.start, request.end)
            .await
        {
            Ok(Some(bars)) => Ok(Some(bars)),
            Ok(None) if self.quotes_required => Err(QuoteError::Unavailable {
                ticker: request.ticker.clone(),
                start: request.start.to_string(),
                end: request.end.to_string(),
            }
            .into()),
            Ok(None) => {
                warn!(ticker = %request.ticker, "No price data, continuing without prices");
                Ok(None)
            }
            Err(e) if self.quotes_required => Err(e),
            Err(e) => {
                warn!(error = %e, "Quote fetch failed, continuing without prices");
                Ok(None)
            }
        }
    }
}

/// A built graph plus how its text was read.
#[derive(Debug, Clone)]
pub struct Plan {
    pub strict: bool,
    pub graph: InvestigationGraph,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SleuthError;
    use crate::investigate::ScriptedReasoner;
    use crate::reveal::RevealPhase;
    use crate::types::EdgeKind;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request() -> InvestigationRequest {
        InvestigationRequest::new(
            "TSLA",
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
        )
    }

    #[derive(Debug)]
    struct FixedReasoner {
        text: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ReasoningService for FixedReasoner {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate_investigation(
            &self,
            _request: &InvestigationRequest,
            _prices: Option<&[PriceBar]>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.text.clone().ok_or_else(|| {
                SleuthError::Llm(crate::error::LlmError::Network("connection reset".into()))
            })
        }
    }

    fn fixed(text: &str) -> Box<FixedReasoner> {
        Box::new(FixedReasoner {
            text: Some(text.to_string()),
            calls: Arc::default(),
        })
    }

    #[derive(Debug)]
    enum QuoteReply {
        Rows,
        Empty,
        Fail,
    }

    #[derive(Debug)]
    struct StubQuotes(QuoteReply);

    #[async_trait::async_trait]
    impl QuoteSource for StubQuotes {
        async fn fetch_price_series(
            &self,
            _ticker: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Option<Vec<PriceBar>>> {
            match self.0 {
                QuoteReply::Rows => Ok(Some(vec![PriceBar {
                    date: "2024-04-01".into(),
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    volume: 10.0,
                }])),
                QuoteReply::Empty => Ok(None),
                QuoteReply::Fail => Err(QuoteError::Status {
                    status: 503,
                    body: "down".into(),
                }
                .into()),
            }
        }
    }

    const SCENARIO: &str = r#"[
        {"label": "Fetch Price Data", "description": "x"},
        {"label": "Spawn Sub-Investigation", "description": "y"},
        {"label": "Cross-validate Data", "description": "z"}
    ]"#;

    #[test]
    fn graph_from_response_scenario() {
        let (normalized, graph) = graph_from_response(
            SCENARIO,
            &KeywordClassifier::default(),
            &GraphBuilder::default(),
        );
        assert!(normalized.is_strict());
        let roles: Vec<_> = graph.nodes.iter().map(|n| n.role).collect();
        assert_eq!(
            roles,
            [StepRole::Sequential, StepRole::Branch, StepRole::CrossValidate]
        );
        let edges: Vec<_> = graph
            .edges
            .iter()
            .map(|e| (e.source.0, e.target.0, e.kind))
            .collect();
        assert_eq!(
            edges,
            [
                (0, 1, EdgeKind::Branch),
                (0, 2, EdgeKind::CrossValidate),
                (1, 2, EdgeKind::Sequential),
            ]
        );
    }

    #[test]
    fn plan_prepends_brief_when_enabled() {
        let session = InvestigationSession::new(fixed(SCENARIO)).include_brief(true);
        let plan = session.plan(&request(), SCENARIO);
        assert_eq!(plan.graph.len(), 4);
        assert_eq!(plan.graph.nodes[0].label, "Expected Inputs / Outputs");
        assert!(plan.graph.check_invariants().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_reveals_scripted_investigation() {
        let mut session = InvestigationSession::new(Box::new(ScriptedReasoner))
            .with_delay(Duration::from_millis(500));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let investigation = session
            .analyze(&request(), move |state| sink.lock().unwrap().push(state.cursor))
            .await
            .unwrap();

        assert!(investigation.strict);
        assert_eq!(investigation.graph.len(), 5);
        assert_eq!(investigation.handle.wait().await, RevealPhase::Completed);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_analyze_cancels_first_run() {
        let mut session = InvestigationSession::new(Box::new(ScriptedReasoner));
        let first = session.analyze(&request(), |_| {}).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let second = session.analyze(&request(), |_| {}).await.unwrap();
        assert_eq!(first.handle.phase(), RevealPhase::Cancelled);
        assert_eq!(first.handle.snapshot().cursor, 2);
        assert_eq!(second.handle.generation(), 2);
        assert_eq!(second.handle.wait().await, RevealPhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn reasoner_failure_builds_nothing_but_still_cancels() {
        let mut session = InvestigationSession::new(Box::new(ScriptedReasoner));
        let first = session.analyze(&request(), |_| {}).await.unwrap();

        session.reasoner = Box::new(FixedReasoner {
            text: None,
            calls: Arc::default(),
        });
        let err = session.analyze(&request(), |_| {}).await.unwrap_err();
        assert!(matches!(err, SleuthError::Llm(_)));
        assert_eq!(first.handle.phase(), RevealPhase::Cancelled);
        assert!(session.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_completes_immediately() {
        let mut session = InvestigationSession::new(fixed("   "));
        let investigation = session.analyze(&request(), |_| {}).await.unwrap();
        assert!(investigation.graph.is_empty());
        assert_eq!(investigation.handle.phase(), RevealPhase::Completed);
    }

    #[tokio::test]
    async fn optional_quote_failure_is_tolerated() {
        let mut session = InvestigationSession::new(fixed("No data"))
            .with_quotes(Box::new(StubQuotes(QuoteReply::Fail)))
            .with_delay(Duration::ZERO);
        let investigation = session.analyze(&request(), |_| {}).await.unwrap();
        assert!(investigation.prices.is_none());
        assert!(!investigation.strict);
        assert_eq!(investigation.graph.nodes[0].label, "No data");
    }

    #[tokio::test]
    async fn required_quotes_abort_before_reasoning() {
        for reply in [QuoteReply::Fail, QuoteReply::Empty] {
            let calls = Arc::new(AtomicUsize::new(0));
            let reasoner = FixedReasoner {
                text: Some(SCENARIO.into()),
                calls: Arc::clone(&calls),
            };
            let mut session = InvestigationSession::new(Box::new(reasoner))
                .with_quotes(Box::new(StubQuotes(reply)))
                .quotes_required(true);
            let err = session.analyze(&request(), |_| {}).await.unwrap_err();
            assert!(matches!(err, SleuthError::Quote(_)));
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn prices_are_returned_when_available() {
        let mut session = InvestigationSession::new(fixed(SCENARIO))
            .with_quotes(Box::new(StubQuotes(QuoteReply::Rows)))
            .with_delay(Duration::ZERO);
        let investigation = session.analyze(&request(), |_| {}).await.unwrap();
        assert_eq!(investigation.prices.map(|p| p.len()), Some(1));
    }

    #[test]
    fn from_config_respects_disabled_quotes() {
        let mut config = SleuthConfig::default();
        config.quotes.enabled = false;
        config.reveal.delay_ms = 250;
        config.reveal.cross_validate_lookback = 3;
        let session = InvestigationSession::from_config(
            &config,
            Box::new(ScriptedReasoner),
            Some(Box::new(StubQuotes(QuoteReply::Rows))),
        );
        assert!(session.quotes.is_none());
        assert_eq!(session.delay(), Duration::from_millis(250));
        assert_eq!(session.builder.cross_validate_lookback(), 3);
    }
}
