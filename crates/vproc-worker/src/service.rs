//! Job operations exposed to the API layer.
//!
//! The HTTP surface itself lives elsewhere; this is the whole contract it
//! consumes: submit, inspect, cancel, fetch output.

use chrono::Utc;
use tracing::info;

use vproc_jobstore::JobStore;
use vproc_media::command;
use vproc_models::{Job, JobId, JobStatus, JobStatusView, OperationType, ProcessingParams};
use vproc_storage::{BlobReader, BlobStore};

use crate::error::EngineResult;

#[derive(Clone)]
pub struct JobService {
    store: JobStore,
    blobs: BlobStore,
}

impl JobService {
    pub fn new(store: JobStore, blobs: BlobStore) -> Self {
        Self { store, blobs }
    }

    /// Validate and persist a new pending job, returning its id.
    ///
    /// Validation runs synchronously so a structurally invalid request
    /// (no inputs, Trim without a window, ...) is rejected before a job
    /// record exists.
    pub async fn create_job(
        &self,
        operation_type: OperationType,
        inputs: Vec<String>,
        parameters: ProcessingParams,
        created_by: impl Into<String>,
    ) -> EngineResult<JobId> {
        command::validate(operation_type, inputs.len(), &parameters)?;

        let job = Job::new(operation_type, inputs, parameters, created_by);
        let id = job.id.clone();
        self.store.insert(&job).await?;

        info!(job_id = %id, operation = %operation_type, "Created job with {} inputs", job.inputs.len());
        Ok(id)
    }

    /// Status snapshot of a job, or `None` when it does not exist.
    pub async fn get_status(&self, id: &JobId) -> EngineResult<Option<JobStatusView>> {
        Ok(self
            .store
            .get(id)
            .await?
            .as_ref()
            .map(JobStatusView::from))
    }

    /// Cancel a job that is still pending. Returns whether anything
    /// changed; a job past Pending is left untouched.
    pub async fn cancel(&self, id: &JobId) -> EngineResult<bool> {
        let canceled = self.store.try_cancel(id, Utc::now()).await?;
        if canceled {
            info!(job_id = %id, "Job was canceled");
        }
        Ok(canceled)
    }

    /// Open the output blob of a completed job for streaming.
    pub async fn open_output(&self, id: &JobId) -> EngineResult<Option<BlobReader>> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(None);
        };

        if job.status != JobStatus::Completed {
            return Ok(None);
        }
        let Some(reference) = job.output.as_deref() else {
            return Ok(None);
        };

        Ok(Some(self.blobs.open_read(reference).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vproc_media::MediaError;

    fn service() -> JobService {
        JobService::new(JobStore::memory(), BlobStore::local("/tmp/vproc-test-unused"))
    }

    #[tokio::test]
    async fn test_create_job_rejects_invalid_requests_synchronously() {
        let service = service();

        let err = service
            .create_job(
                OperationType::Trim,
                vec!["uploads/in.mp4".to_string()],
                ProcessingParams::default(),
                "key-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Media(MediaError::InvalidOperation(_))
        ));

        let err = service
            .create_job(
                OperationType::Merge,
                Vec::new(),
                ProcessingParams::default(),
                "key-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Media(MediaError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_then_status() {
        let service = service();
        let id = service
            .create_job(
                OperationType::Convert,
                vec!["uploads/in.mp4".to_string()],
                ProcessingParams::default(),
                "key-1",
            )
            .await
            .unwrap();

        let view = service.get_status(&id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert!(view.output.is_none());
        assert!(view.operations.is_empty());

        let missing = JobId::new();
        assert!(service.get_status(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_only_while_pending() {
        let service = service();
        let id = service
            .create_job(
                OperationType::ExtractAudio,
                vec!["uploads/in.mp4".to_string()],
                ProcessingParams::default(),
                "key-1",
            )
            .await
            .unwrap();

        assert!(service.cancel(&id).await.unwrap());
        // Already canceled: a second cancel reports no mutation.
        assert!(!service.cancel(&id).await.unwrap());

        let view = service.get_status(&id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Canceled);
        assert!(view.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_output_unavailable_until_completed() {
        let service = service();
        let id = service
            .create_job(
                OperationType::Convert,
                vec!["uploads/in.mp4".to_string()],
                ProcessingParams::default(),
                "key-1",
            )
            .await
            .unwrap();

        assert!(service.open_output(&id).await.unwrap().is_none());
        assert!(service.open_output(&JobId::new()).await.unwrap().is_none());
    }
}
