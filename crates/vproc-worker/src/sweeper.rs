//! Retention sweeper.
//!
//! Periodically deletes jobs older than the retention period, together
//! with every blob they reference. Blob deletion is best-effort; record
//! deletion happens in one batch per pass.

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vproc_jobstore::JobStore;
use vproc_models::JobId;
use vproc_storage::BlobStore;

use crate::config::EngineConfig;
use crate::dispatcher::wait_for_store;
use crate::error::EngineResult;

pub struct RetentionSweeper {
    store: JobStore,
    blobs: BlobStore,
    config: EngineConfig,
    shutdown: watch::Receiver<bool>,
}

impl RetentionSweeper {
    pub fn new(
        store: JobStore,
        blobs: BlobStore,
        config: EngineConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            blobs,
            config,
            shutdown,
        }
    }

    /// Run the sweep loop until shutdown is signaled.
    pub async fn run(mut self) {
        info!(
            "Starting retention sweeper (retention {:?}, interval {:?})",
            self.config.retention_period, self.config.sweep_interval
        );

        wait_for_store(
            &self.store,
            self.config.store_wait_attempts,
            self.config.store_wait_delay,
        )
        .await;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = match self.sweep_once().await {
                Ok(_) => self.config.sweep_interval,
                Err(e) => {
                    error!("Error in retention sweep: {}", e);
                    self.config.sweep_error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        info!("Retention sweeper stopped");
    }

    /// One sweep pass. Returns how many jobs were purged; an empty
    /// eligible set is a no-op.
    pub async fn sweep_once(&self) -> EngineResult<usize> {
        let cutoff = Utc::now()
            - ChronoDuration::milliseconds(self.config.retention_period.as_millis() as i64);

        let expired = self.store.query_older_than(cutoff).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        for job in &expired {
            for reference in &job.inputs {
                self.delete_blob(reference).await;
            }
            if let Some(reference) = &job.output {
                self.delete_blob(reference).await;
            }
        }

        let ids: Vec<JobId> = expired.iter().map(|job| job.id.clone()).collect();
        self.store.delete_batch(&ids).await?;

        info!("Cleaned up {} expired jobs", ids.len());
        Ok(ids.len())
    }

    async fn delete_blob(&self, reference: &str) {
        match self.blobs.delete(reference).await {
            Ok(true) => debug!("Deleted blob {}", reference),
            Ok(false) => debug!("Blob {} already gone", reference),
            Err(e) => warn!("Failed to delete blob {}: {}", reference, e),
        }
    }
}
