//! Job records and the status machine they move through.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::params::ProcessingParams;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed by the dispatcher
    #[default]
    Pending,
    /// Claimed; the transcoder is (or is about to be) running
    Processing,
    /// Finished successfully, output available
    Completed,
    /// Finished with an error; never retried automatically
    Failed,
    /// Canceled while still pending
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Terminal states are never revisited by the dispatcher.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

/// The media transformation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Concatenate all inputs into one output, in listed order
    Merge,
    /// Re-encode a single input (scale/crop/bitrate)
    Convert,
    /// Re-encode a single input for size (crop/scale/bitrate)
    Compress,
    /// Stream-copy a time window out of a single input
    Trim,
    /// Drop the video stream, copy the audio
    ExtractAudio,
    /// Overlay a text or image watermark
    AddWatermark,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Merge => "merge",
            OperationType::Convert => "convert",
            OperationType::Compress => "compress",
            OperationType::Trim => "trim",
            OperationType::ExtractAudio => "extract_audio",
            OperationType::AddWatermark => "add_watermark",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt at executing a job, recorded for auditing.
///
/// The log is append-only; entries are never rewritten once pushed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OperationRecord {
    /// Operation that was attempted
    pub operation_type: OperationType,

    /// When the attempt started
    pub started_at: DateTime<Utc>,

    /// When the attempt finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Whether the attempt succeeded
    pub is_successful: bool,

    /// Error detail for failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

/// A media-transformation job and its full lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Requested transformation, fixed at creation
    pub operation_type: OperationType,

    /// Job status
    #[serde(default)]
    pub status: JobStatus,

    /// Ordered input blob references; order matters for Merge
    pub inputs: Vec<String>,

    /// Operation-specific settings; unused fields stay absent
    #[serde(default)]
    pub parameters: ProcessingParams,

    /// Output blob reference, set only on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Size of the produced output, set only on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,

    /// Wall-clock processing time, set only on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_duration_ms: Option<i64>,

    /// Human-readable failure reason, set only on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Failed-attempt counter; observability only, never drives re-dispatch
    #[serde(default)]
    pub retry_count: u32,

    /// Once true the job can never enter Processing
    #[serde(default)]
    pub is_canceled: bool,

    /// Creation timestamp, immutable
    pub created_at: DateTime<Utc>,

    /// Set once by the claiming execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set once when a terminal state is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Opaque caller identity, audit only
    pub created_by: String,

    /// Append-only per-attempt log
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        operation_type: OperationType,
        inputs: Vec<String>,
        parameters: ProcessingParams,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            operation_type,
            status: JobStatus::Pending,
            inputs,
            parameters,
            output: None,
            output_size_bytes: None,
            processing_duration_ms: None,
            error_message: None,
            retry_count: 0,
            is_canceled: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            created_by: created_by.into(),
            operations: Vec::new(),
        }
    }

    /// Whether the dispatcher may still claim this job.
    pub fn is_dispatchable(&self) -> bool {
        self.status == JobStatus::Pending && !self.is_canceled
    }

    /// Mark the job claimed by an execution.
    pub fn start(mut self, now: DateTime<Utc>) -> Self {
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self
    }

    /// Mark the job completed with its output.
    pub fn complete(mut self, output: impl Into<String>, output_size_bytes: Option<u64>) -> Self {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.output = Some(output.into());
        self.output_size_bytes = output_size_bytes;
        self.finished_at = Some(now);
        self.processing_duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
        self
    }

    /// Mark the job failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.finished_at = Some(Utc::now());
        self.retry_count += 1;
        self
    }

    /// Mark the job canceled. Valid only while pending.
    pub fn cancel(mut self, now: DateTime<Utc>) -> Self {
        self.status = JobStatus::Canceled;
        self.is_canceled = true;
        self.finished_at = Some(now);
        self
    }

    /// Append an attempt record to the audit log.
    pub fn record_operation(&mut self, record: OperationRecord) {
        self.operations.push(record);
    }
}
