//! Debounced, single-flight rebuild scheduling.
//!
//! One consumer loop owns all state. Debounce waits run as their own tasks and only
//! report back that they elapsed; rebuilds run on the blocking pool and report back
//! their outcome. Neither ever touches orchestrator state directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::output::Reporter;
use crate::pipeline::{BuildOutcome, Rebuild, RebuildError};
use crate::watcher::event::ChangeEvent;

/// One debounce attempt. Dropping it cancels the wait.
#[derive(Debug)]
struct RebuildTask {
    id: u64,
    triggered_at: Instant,
    cancel: oneshot::Sender<()>,
}

impl RebuildTask {
    fn cancel(self) {
        let _ = self.cancel.send(());
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Debouncing(RebuildTask),
    /// `rerun` records that a qualifying event arrived mid-build.
    Building { rerun: bool },
}

/// Messages from spawned tasks back to the consumer loop.
#[derive(Debug)]
enum Signal {
    Elapsed(u64),
    Finished(BuildOutcome),
}

/// Consecutive output reset failures tolerated before `run` gives up.
pub const DEFAULT_RESET_LIMIT: u32 = 3;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("output directory unavailable after {attempts} consecutive rebuilds: {last}")]
    OutputUnavailable { attempts: u32, last: String },
}

/// The orchestrator's externally visible phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing,
    Building,
}

pub struct Orchestrator<R, P> {
    watch_root: PathBuf,
    debounce: Duration,
    rebuild: Arc<R>,
    reporter: P,
    state: State,
    next_task_id: u64,
    builds_started: u64,
    reset_limit: u32,
    reset_failures: u32,
    fatal: Option<OrchestratorError>,
}

impl<R: Rebuild, P: Reporter> Orchestrator<R, P> {
    pub fn new(watch_root: PathBuf, debounce: Duration, rebuild: Arc<R>, reporter: P) -> Self {
        Self {
            watch_root,
            debounce,
            rebuild,
            reporter,
            state: State::Idle,
            next_task_id: 0,
            builds_started: 0,
            reset_limit: DEFAULT_RESET_LIMIT,
            reset_failures: 0,
            fatal: None,
        }
    }

    /// Give up after `limit` rebuilds in a row fail to reset the output tree.
    /// Zero retries forever.
    pub fn with_reset_limit(mut self, limit: u32) -> Self {
        self.reset_limit = limit;
        self
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Debouncing(_) => Phase::Debouncing,
            State::Building { .. } => Phase::Building,
        }
    }

    /// Process events until the event stream closes.
    ///
    /// A rebuild still running at that point is awaited and reported before
    /// returning. Returns the number of rebuilds started, or an error once the
    /// output tree could not be reset for too many rebuilds in a row.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ChangeEvent>,
        mut errors: mpsc::Receiver<notify::Error>,
    ) -> Result<u64, OrchestratorError> {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<Signal>();
        let mut errors_open = true;

        loop {
            let before = self.phase();
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_event(event, &signal_tx),
                    None => break,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(err) => tracing::warn!("watcher error: {err}"),
                    None => {
                        tracing::warn!("watcher error channel closed; watcher errors will no longer be reported");
                        errors_open = false;
                    }
                },
                Some(signal) = signal_rx.recv() => self.on_signal(signal, &signal_tx),
            }

            let after = self.phase();
            if after != before {
                tracing::trace!(from = ?before, to = ?after, "phase changed");
            }
            if self.fatal.is_some() {
                break;
            }
        }

        tracing::debug!("event loop stopped");
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Debouncing(task) => task.cancel(),
            State::Building { .. } => self.state = State::Building { rerun: false },
            State::Idle => {}
        }

        while matches!(self.state, State::Building { .. }) {
            match signal_rx.recv().await {
                Some(Signal::Finished(outcome)) => {
                    self.reporter.report(&outcome);
                    self.state = State::Idle;
                }
                Some(Signal::Elapsed(_)) => {}
                None => break,
            }
        }

        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(self.builds_started),
        }
    }

    fn on_event(&mut self, event: ChangeEvent, signals: &mpsc::UnboundedSender<Signal>) {
        if !event.qualifies(&self.watch_root) {
            tracing::trace!(path = %event.path.display(), op = ?event.op, "ignored event");
            return;
        }
        tracing::debug!(path = %event.path.display(), op = ?event.op, "change");

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => self.start_debounce(signals),
            State::Debouncing(task) => {
                tracing::debug!(task = task.id, "superseded pending rebuild");
                task.cancel();
                self.start_debounce(signals);
            }
            State::Building { .. } => self.state = State::Building { rerun: true },
        }
    }

    fn on_signal(&mut self, signal: Signal, signals: &mpsc::UnboundedSender<Signal>) {
        match signal {
            Signal::Elapsed(id) => match std::mem::replace(&mut self.state, State::Idle) {
                State::Debouncing(task) if task.id == id => {
                    tracing::debug!(
                        task = id,
                        waited_ms = task.triggered_at.elapsed().as_millis() as u64,
                        "debounce elapsed"
                    );
                    self.start_build(signals);
                }
                other => {
                    // Superseded between elapsing and being observed here.
                    self.state = other;
                }
            },
            Signal::Finished(outcome) => {
                self.reporter.report(&outcome);
                if let BuildOutcome::Failed(err @ RebuildError::OutputReset(_)) = &outcome {
                    self.reset_failures += 1;
                    if self.reset_limit > 0 && self.reset_failures >= self.reset_limit {
                        tracing::error!(attempts = self.reset_failures, "giving up: {err}");
                        self.fatal = Some(OrchestratorError::OutputUnavailable {
                            attempts: self.reset_failures,
                            last: err.to_string(),
                        });
                        self.state = State::Idle;
                        return;
                    }
                } else {
                    self.reset_failures = 0;
                }
                if matches!(self.state, State::Building { rerun: true }) {
                    tracing::debug!("changes arrived during rebuild");
                    self.start_debounce(signals);
                } else {
                    self.state = State::Idle;
                }
            }
        }
    }

    fn start_debounce(&mut self, signals: &mpsc::UnboundedSender<Signal>) {
        self.next_task_id += 1;
        let id = self.next_task_id;
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let delay = self.debounce;
        let tx = signals.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Signal::Elapsed(id));
                }
                _ = cancel_rx => {}
            }
        });

        self.state = State::Debouncing(RebuildTask {
            id,
            triggered_at: Instant::now(),
            cancel: cancel_tx,
        });
    }

    fn start_build(&mut self, signals: &mpsc::UnboundedSender<Signal>) {
        self.builds_started += 1;
        tracing::info!(build = self.builds_started, "building");

        let rebuild = Arc::clone(&self.rebuild);
        let tx = signals.clone();
        tokio::spawn(async move {
            let outcome = match tokio::task::spawn_blocking(move || rebuild.rebuild()).await {
                Ok(outcome) => outcome,
                Err(err) => BuildOutcome::Failed(RebuildError::Panicked(err.to_string())),
            };
            let _ = tx.send(Signal::Finished(outcome));
        });

        self.state = State::Building { rerun: false };
    }
}
