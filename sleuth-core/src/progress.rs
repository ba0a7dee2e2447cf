//! Progress reporting for a running reveal.
//!
//! The CLI uses `IndicatifReporter` to show nodes as they appear.
//! Library callers can use `NoopReporter` or provide their own implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

use crate::reveal::{RevealPhase, RevealState};
use crate::types::Node;

/// Receives reveal progress.
pub trait ProgressReporter: Send + Sync {
    /// Begin a new run with an optional total node count.
    fn start(&self, task: &str, total: Option<u64>);

    /// Advance progress by the given amount.
    fn advance(&self, amount: u64);

    /// Mark the current run as finished.
    fn finish(&self);

    /// Display an informational message.
    fn message(&self, msg: &str);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _task: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter backed by an `indicatif` progress bar for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    completed: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    /// Draws to stderr.
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Draws nothing; messages are dropped too.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            completed: AtomicU64::new(0),
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, task: &str, total: Option<u64>) {
        self.completed.store(0, Ordering::Relaxed);
        let style = if let Some(total) = total {
            self.bar.set_length(total);
            ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .map(|s| s.progress_chars("=> "))
        } else {
            self.bar.set_length(0);
            ProgressStyle::with_template("{spinner:.green} {msg} {pos} nodes")
        };
        self.bar
            .set_style(style.unwrap_or_else(|_| ProgressStyle::default_bar()));
        self.bar.set_message(task.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.completed.fetch_add(amount, Ordering::Relaxed);
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}

/// One line per revealed node, indented by branch depth.
pub fn node_line(node: &Node) -> String {
    format!(
        "{}[{}] {} ({})",
        "  ".repeat(node.branch_depth as usize),
        node.id,
        node.label,
        node.role
    )
}

/// Adapt a reporter into a reveal observer. The first update starts `task`,
/// each update reports the nodes that appeared since the previous one and a
/// completed run finishes the bar.
pub fn reveal_observer(
    reporter: Arc<dyn ProgressReporter>,
    task: String,
) -> impl FnMut(&RevealState) + Send + 'static {
    let mut reported: Option<usize> = None;
    move |state: &RevealState| {
        let seen = *reported.get_or_insert_with(|| {
            reporter.start(&task, None);
            0
        });
        for node in state.visible_nodes.iter().skip(seen) {
            reporter.message(&node_line(node));
            reporter.advance(1);
        }
        reported = Some(state.visible_nodes.len());
        if state.phase == RevealPhase::Completed {
            reporter.finish();
        }
    }
}
