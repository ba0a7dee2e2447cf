//! Paced, cancellable reveal of an [`InvestigationGraph`].
//!
//! A run moves `Idle → Running → {Completed, Cancelled}`. The first node
//! appears as soon as the run's task is polled, every later node after a
//! further fixed delay. Each tick appends one node plus every edge whose
//! endpoints are both visible, then hands the new [`RevealState`] to the
//! observer.
//!
//! The observer is called while the run is locked, so once
//! [`RevealHandle::cancel`] returns no further update can fire for that
//! run. The observer must therefore not call back into its own handle.
//! An observer that panics ends its run as `Cancelled`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::graph::InvestigationGraph;
use crate::types::{Edge, EdgeId, Node, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RevealPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl RevealPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// What the renderer may show right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevealState {
    pub visible_nodes: Vec<Node>,
    pub visible_edges: Vec<Edge>,
    /// Number of nodes revealed so far.
    pub cursor: usize,
    pub phase: RevealPhase,
}

impl RevealState {
    /// Empty state for a fresh run over `graph`.
    pub fn start(graph: &InvestigationGraph) -> Self {
        Self {
            phase: if graph.is_empty() {
                RevealPhase::Completed
            } else {
                RevealPhase::Running
            },
            ..Self::default()
        }
    }

    /// Reveal the next node and every held-back edge that can now be drawn.
    /// Returns `false` when there was nothing left to reveal.
    pub fn advance(&mut self, graph: &InvestigationGraph) -> bool {
        let Some(node) = graph.nodes.get(self.cursor) else {
            return false;
        };
        self.visible_nodes.push(node.clone());
        self.cursor += 1;

        let visible: HashSet<NodeId> = self.visible_nodes.iter().map(|n| n.id).collect();
        let shown: HashSet<EdgeId> = self.visible_edges.iter().map(|e| e.id).collect();
        self.visible_edges.extend(graph.edges.iter().filter(|e| {
            !shown.contains(&e.id) && visible.contains(&e.source) && visible.contains(&e.target)
        }));

        if self.cursor >= graph.len() {
            self.phase = RevealPhase::Completed;
        }
        true
    }
}

type UpdateFn = Box<dyn FnMut(&RevealState) + Send>;

struct RunInner {
    state: RevealState,
    on_update: UpdateFn,
}

struct Run {
    generation: u64,
    graph: Arc<InvestigationGraph>,
    inner: Mutex<RunInner>,
    phase_tx: watch::Sender<RevealPhase>,
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("generation", &self.generation)
            .field("nodes", &self.graph.len())
            .field("phase", &*self.phase_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl Run {
    fn lock(&self) -> MutexGuard<'_, RunInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One reveal step. Returns whether another tick should be scheduled.
    fn tick(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.phase != RevealPhase::Running {
            return false;
        }
        if !inner.state.advance(&self.graph) {
            inner.state.phase = RevealPhase::Completed;
            self.phase_tx.send_replace(RevealPhase::Completed);
            return false;
        }

        let RunInner { state, on_update } = &mut *inner;
        debug!(
            generation = self.generation,
            cursor = state.cursor,
            edges = state.visible_edges.len(),
            "Reveal tick"
        );
        on_update(state);

        if state.phase == RevealPhase::Completed {
            info!(generation = self.generation, nodes = state.cursor, "Reveal completed");
            self.phase_tx.send_replace(RevealPhase::Completed);
            return false;
        }
        true
    }

    fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.phase != RevealPhase::Running {
            return false;
        }
        inner.state.phase = RevealPhase::Cancelled;
        self.phase_tx.send_replace(RevealPhase::Cancelled);
        info!(
            generation = self.generation,
            cursor = inner.state.cursor,
            "Reveal cancelled"
        );
        true
    }
}

/// Retires a run whose task ends while it is still `Running`, e.g. when
/// the observer panics.
struct RetireOnExit(Arc<Run>);

impl Drop for RetireOnExit {
    fn drop(&mut self) {
        if self.0.cancel() && std::thread::panicking() {
            warn!(generation = self.0.generation, "Reveal observer panicked");
        }
    }
}

async fn drive(run: Arc<Run>, delay: Duration) {
    let _retire = RetireOnExit(Arc::clone(&run));
    let mut phase_rx = run.phase_tx.subscribe();
    while run.tick() {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            // Only a terminal transition can happen after a run starts.
            _ = phase_rx.changed() => break,
        }
    }
}

/// Caller-side view of one reveal run.
#[derive(Debug, Clone)]
pub struct RevealHandle {
    run: Arc<Run>,
}

impl RevealHandle {
    /// Sequence number of this run within its scheduler, starting at 1.
    pub fn generation(&self) -> u64 {
        self.run.generation
    }

    pub fn phase(&self) -> RevealPhase {
        *self.run.phase_tx.borrow()
    }

    pub fn snapshot(&self) -> RevealState {
        self.run.lock().state.clone()
    }

    /// Stop the run. Returns `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        self.run.cancel()
    }

    /// Resolve once the run is `Completed` or `Cancelled`.
    pub async fn wait(&self) -> RevealPhase {
        let mut rx = self.run.phase_tx.subscribe();
        loop {
            let phase = *rx.borrow_and_update();
            if phase.is_terminal() {
                return phase;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

/// Cancel `handle`; see [`RevealHandle::cancel`].
pub fn cancel(handle: &RevealHandle) -> bool {
    handle.cancel()
}

#[derive(Debug)]
struct ActiveRun {
    handle: RevealHandle,
    task: Option<JoinHandle<()>>,
}

/// Owns at most one active reveal run.
#[derive(Debug, Default)]
pub struct RevealScheduler {
    generation: u64,
    active: Option<ActiveRun>,
}

impl RevealScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current(&self) -> Option<&RevealHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    /// Start revealing `graph`, one node per `delay`.
    ///
    /// Any previous run is cancelled and its timer task aborted first.
    /// Must be called within a Tokio runtime.
    pub fn start<F>(
        &mut self,
        graph: Arc<InvestigationGraph>,
        delay: Duration,
        on_update: F,
    ) -> RevealHandle
    where
        F: FnMut(&RevealState) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;

        let state = RevealState::start(&graph);
        let (phase_tx, _) = watch::channel(state.phase);
        let empty = graph.is_empty();
        let run = Arc::new(Run {
            generation: self.generation,
            graph,
            inner: Mutex::new(RunInner {
                state,
                on_update: Box::new(on_update),
            }),
            phase_tx,
        });
        let handle = RevealHandle {
            run: Arc::clone(&run),
        };

        let task = if empty {
            info!(generation = self.generation, "Empty graph, reveal completed");
            None
        } else {
            info!(
                generation = self.generation,
                nodes = run.graph.len(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reveal started"
            );
            Some(tokio::spawn(drive(run, delay)))
        };

        self.active = Some(ActiveRun {
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Cancel and retire the active run, if any.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        let cancelled = active.handle.cancel();
        if let Some(task) = active.task {
            task.abort();
        }
        cancelled
    }
}

impl Drop for RevealScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
