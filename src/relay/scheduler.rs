//! Periodic engine scheduler
//!
//! Runs one independent loop per [`PeriodicTask`]: execute a cycle, capture
//! its outcome, sleep the task's interval, repeat. A failing or panicking
//! cycle is logged and recorded, never allowed to end its loop.

use crate::error::RelayError;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

/// Counts produced by one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Units handled successfully (proxies added, records delivered)
    pub processed: u64,
    /// Units that failed after retries
    pub failed: u64,
}

/// Captured result of one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed(String),
    Panicked(String),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

/// Status of a task's loop
#[derive(Debug, Clone, Default)]
pub struct CycleStatus {
    /// When the last cycle finished
    pub last_run: Option<SystemTime>,
    /// Outcome of the last cycle
    pub last_outcome: Option<CycleOutcome>,
    /// Cycles finished since the loop started
    pub cycles: u64,
    /// Whether a cycle is currently running
    pub in_progress: bool,
}

/// One engine driven on a fixed interval
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Name used in logs and status
    fn name(&self) -> &str;

    /// Sleep between the end of one cycle and the start of the next
    fn interval(&self) -> Duration;

    /// Run a single cycle
    async fn run_cycle(&self) -> Result<CycleReport, RelayError>;
}

/// Why [`Scheduler::run`] returned
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerExit {
    /// Shutdown was requested
    Shutdown,
    /// A task loop ended on its own; the scheduler stopped the others
    LoopEnded(String),
}

type StatusMap = Arc<RwLock<HashMap<String, CycleStatus>>>;

/// Scheduler for the proxy refresh and harvest loops
pub struct Scheduler {
    tasks: Vec<Arc<dyn PeriodicTask>>,
    status: StatusMap,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Scheduler {
    pub fn new(tasks: Vec<Arc<dyn PeriodicTask>>, shutdown_rx: broadcast::Receiver<()>) -> Self {
        let status = tasks
            .iter()
            .map(|t| (t.name().to_string(), CycleStatus::default()))
            .collect();

        Self {
            tasks,
            status: Arc::new(RwLock::new(status)),
            shutdown_rx,
        }
    }

    /// Shared handle on the per-task status map
    pub fn status_handle(&self) -> StatusMap {
        Arc::clone(&self.status)
    }

    /// Get the current status for all tasks
    pub async fn get_status(&self) -> HashMap<String, CycleStatus> {
        self.status.read().await.clone()
    }

    /// Run every task loop until shutdown or until one loop ends
    pub async fn run(mut self) -> SchedulerExit {
        info!(tasks = self.tasks.len(), "Starting scheduler");

        let (task_shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut loops = JoinSet::new();

        for task in &self.tasks {
            let task = Arc::clone(task);
            let status = Arc::clone(&self.status);
            let task_shutdown_rx = task_shutdown_tx.subscribe();
            loops.spawn(async move {
                let name = task.name().to_string();
                Self::run_task_loop(task, status, task_shutdown_rx).await;
                name
            });
        }

        let exit = loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    let _ = task_shutdown_tx.send(());
                    while loops.join_next().await.is_some() {}
                    break SchedulerExit::Shutdown;
                }
                Some(joined) = loops.join_next() => {
                    let reason = match joined {
                        Ok(name) => format!("loop {} returned", name),
                        Err(err) if err.is_panic() => {
                            format!("loop panicked: {}", panic_message(err.into_panic()))
                        }
                        Err(err) => format!("loop aborted: {}", err),
                    };
                    error!(reason = %reason, "Task loop ended unexpectedly");
                    loops.shutdown().await;
                    break SchedulerExit::LoopEnded(reason);
                }
            }
        };

        info!("Scheduler stopped");
        exit
    }

    async fn run_task_loop(
        task: Arc<dyn PeriodicTask>,
        status: StatusMap,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let name = task.name().to_string();
        let interval = task.interval();

        loop {
            Self::perform_cycle(&task, &status).await;

            debug!(task = name, interval_secs = interval.as_secs(), "Sleeping until next cycle");
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(task = name, "Task loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn perform_cycle(task: &Arc<dyn PeriodicTask>, status: &StatusMap) -> CycleOutcome {
        let name = task.name().to_string();

        {
            let mut status_map = status.write().await;
            if let Some(s) = status_map.get_mut(&name) {
                s.in_progress = true;
            }
        }

        // run on its own task so a panic surfaces as a JoinError; the handle
        // aborts the cycle if this loop is dropped mid-cycle
        let runner = Arc::clone(task);
        let cycle = tokio::spawn(async move { runner.run_cycle().await });
        let joined = AbortOnDropHandle::new(cycle).await;

        let outcome = match joined {
            Ok(Ok(report)) => {
                info!(
                    task = name,
                    processed = report.processed,
                    failed = report.failed,
                    "Cycle completed"
                );
                CycleOutcome::Completed(report)
            }
            Ok(Err(err)) => {
                warn!(task = name, error = %err, "Cycle failed");
                CycleOutcome::Failed(err.to_string())
            }
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                error!(task = name, panic = %message, "Cycle panicked");
                CycleOutcome::Panicked(message)
            }
            Err(err) => {
                error!(task = name, error = %err, "Cycle aborted");
                CycleOutcome::Panicked(err.to_string())
            }
        };

        let mut status_map = status.write().await;
        if let Some(s) = status_map.get_mut(&name) {
            s.in_progress = false;
            s.last_run = Some(SystemTime::now());
            s.last_outcome = Some(outcome.clone());
            s.cycles += 1;
        }

        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
