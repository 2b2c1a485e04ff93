//! Bounded-parallel execution of per-table tasks.
//!
//! Every task handed to [`TaskOrchestrator::run`] produces exactly one
//! [`Outcome`], whatever happens inside the worker, and the outcomes are
//! folded into a single [`Report`].

pub mod progress;
pub mod report;
pub mod task;

pub use progress::{NoProgress, ProgressBarObserver, ProgressLogWriter, ProgressObserver};
pub use report::{Report, ReportBuilder};
pub use task::{Outcome, Task};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::{DbToolError, Result};

pub struct TaskOrchestrator {
    pool_size: usize,
    progress: Arc<dyn ProgressObserver>,
}

impl TaskOrchestrator {
    pub fn new(pool_size: usize, progress: Arc<dyn ProgressObserver>) -> Result<Self> {
        if pool_size == 0 {
            return Err(DbToolError::Config(
                "worker pool size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            pool_size,
            progress,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Runs every task through `worker`, at most `pool_size` at a time.
    ///
    /// Returns once every task has an outcome. A worker that panics is
    /// recorded as a failed outcome for its task; the other tasks carry on.
    /// Task identifiers must be unique.
    pub async fn run<F, Fut>(&self, tasks: Vec<Task>, worker: F) -> Report
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let started = Instant::now();
        let total = tasks.len();
        self.progress.on_start(total);

        let worker = Arc::new(worker);
        let permits = Arc::new(Semaphore::new(self.pool_size));
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
        let mut pending: HashSet<String> = HashSet::with_capacity(total);

        for task in tasks {
            let id = task.id().to_string();
            let kind = task.kind();
            pending.insert(id.clone());

            let worker = Arc::clone(&worker);
            let permits = Arc::clone(&permits);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(table = %id, %kind, "worker started");
                        // Spawned separately so a panic surfaces as a JoinError here.
                        match tokio::spawn(async move { worker.as_ref()(task).await }).await {
                            Ok(outcome) => outcome.reassign(&id),
                            Err(err) => Outcome::failed(
                                id.as_str(),
                                DbToolError::Worker(format!("aborted: {}", err)).to_string(),
                            ),
                        }
                    }
                    Err(_) => Outcome::failed(
                        id.as_str(),
                        DbToolError::Worker("pool closed".to_string()).to_string(),
                    ),
                };
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut builder = ReportBuilder::default();
        let mut completed = 0;
        while let Some(outcome) = rx.recv().await {
            if !pending.remove(outcome.id()) {
                warn!(table = outcome.id(), "ignoring duplicate outcome");
                continue;
            }
            completed += 1;
            self.record(&mut builder, outcome, completed, total);
        }
        for id in pending.drain() {
            completed += 1;
            let outcome = Outcome::failed(id, "worker exited without reporting an outcome");
            self.record(&mut builder, outcome, completed, total);
        }

        self.progress.on_finish();
        builder.seal(started.elapsed())
    }

    fn record(&self, builder: &mut ReportBuilder, outcome: Outcome, completed: usize, total: usize) {
        if outcome.is_success() {
            debug!(table = outcome.id(), "[{}/{}] done", completed, total);
        } else {
            warn!(
                table = outcome.id(),
                "[{}/{}] failed: {}",
                completed,
                total,
                outcome.detail()
            );
        }
        self.progress.on_outcome(completed, total, &outcome);
        builder.record(outcome);
    }
}
