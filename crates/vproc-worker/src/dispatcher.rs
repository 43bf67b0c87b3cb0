//! Polling dispatcher.
//!
//! Drives forward progress without external triggering: every cycle it
//! fetches the oldest eligible pending jobs and fans them out, each
//! execution bounded by the shared concurrency ceiling. Nothing in the
//! loop is fatal; a bad cycle only delays the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use vproc_jobstore::JobStore;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::pipeline::{self, ProcessContext};

pub struct Dispatcher {
    ctx: Arc<ProcessContext>,
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<ProcessContext>,
        config: EngineConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        // The ceiling belongs to this instance, not the process, so
        // several engines (and tests) can coexist.
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            ctx,
            config,
            semaphore,
            shutdown,
        }
    }

    /// Free execution slots; `max_concurrent_jobs - available_permits()`
    /// is the number of in-flight executions.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run the poll loop until shutdown is signaled.
    pub async fn run(mut self) {
        info!(
            "Starting dispatcher with {} max concurrent jobs",
            self.config.max_concurrent_jobs.max(1)
        );

        wait_for_store(
            &self.ctx.store,
            self.config.store_wait_attempts,
            self.config.store_wait_delay,
        )
        .await;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = match self.run_cycle().await {
                Ok(count) => {
                    if count > 0 {
                        debug!("Dispatch cycle executed {} jobs", count);
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    error!("Error in dispatch cycle: {}", e);
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        info!("Dispatcher stopped");
    }

    /// One poll cycle: claim-and-execute a batch, waiting for the whole
    /// batch before returning. The ceiling is enforced per execution slot,
    /// so a batch larger than the ceiling simply queues on the semaphore.
    pub async fn run_cycle(&self) -> EngineResult<usize> {
        let batch = self.ctx.store.query_pending(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let mut executions = JoinSet::new();

        for job in batch {
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&self.semaphore);
            executions.spawn(async move {
                // Acquired before the claim, released by drop on every
                // path out of the execution.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                pipeline::execute_job(&ctx, &job.id).await;
            });
        }

        while executions.join_next().await.is_some() {}

        Ok(count)
    }
}

/// Wait for the job store to become reachable: bounded attempts with a
/// fixed delay, then proceed anyway with a warning.
pub(crate) async fn wait_for_store(store: &JobStore, max_attempts: u32, delay: Duration) {
    for attempt in 1..=max_attempts {
        match store.ping().await {
            Ok(()) => {
                info!("Job store is ready");
                return;
            }
            Err(e) => {
                debug!(
                    "Job store not ready yet (attempt {}/{}): {}",
                    attempt, max_attempts, e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    warn!("Job store did not become ready within expected time, continuing anyway");
}
