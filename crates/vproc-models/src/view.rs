//! Read-models handed back to the API layer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobStatus, OperationType};

/// One attempt, as exposed in a status response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationView {
    pub operation_type: OperationType,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub is_successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

/// Status snapshot of a job, as returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub operation_type: OperationType,

    /// Output blob reference; present only once the job completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,

    pub retry_count: u32,
    pub operations: Vec<OperationView>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            operation_type: job.operation_type,
            output: if job.status == JobStatus::Completed {
                job.output.clone()
            } else {
                None
            },
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            processing_duration_ms: job.processing_duration_ms,
            output_size_bytes: job.output_size_bytes,
            retry_count: job.retry_count,
            operations: job
                .operations
                .iter()
                .map(|op| OperationView {
                    operation_type: op.operation_type,
                    started_at: op.started_at,
                    completed_at: op.completed_at,
                    is_successful: op.is_successful,
                    error_details: op.error_details.clone(),
                })
                .collect(),
        }
    }
}
