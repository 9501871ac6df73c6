//! Restart wrapper around the [`Scheduler`]
//!
//! Rebuilds the task set and starts a fresh scheduler whenever the previous
//! one ends without a shutdown request.

use crate::relay::scheduler::{PeriodicTask, Scheduler, SchedulerExit};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct Supervisor {
    restart_delay: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Supervisor {
    pub fn new(restart_delay: Duration) -> Self {
        Self { restart_delay }
    }

    /// Keep a scheduler running until shutdown, returning the restart count
    ///
    /// `build` is called once per (re)start and may hand back the same shared
    /// engines every time.
    pub async fn run<F>(&self, mut build: F, mut shutdown_rx: broadcast::Receiver<()>) -> u32
    where
        F: FnMut() -> Vec<Arc<dyn PeriodicTask>>,
    {
        let mut restarts = 0u32;

        loop {
            let (scheduler_tx, scheduler_rx) = broadcast::channel(1);
            let mut handle = tokio::spawn(Scheduler::new(build(), scheduler_rx).run());

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = scheduler_tx.send(());
                    let _ = handle.await;
                    break;
                }
                exit = &mut handle => {
                    let reason = match exit {
                        Ok(SchedulerExit::LoopEnded(reason)) => reason,
                        Ok(SchedulerExit::Shutdown) => "scheduler stopped".to_string(),
                        Err(err) => format!("scheduler task failed: {}", err),
                    };
                    restarts += 1;
                    error!(reason = %reason, restarts, "Engines terminated, restarting");
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }

        info!(restarts, "Supervisor stopped");
        restarts
    }
}
