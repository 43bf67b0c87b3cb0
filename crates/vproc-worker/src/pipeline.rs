//! Per-job execution pipeline.
//!
//! Owns the life of one claimed job: claim, stage inputs, build the
//! transcoder invocation, run it, store the output, and persist the
//! terminal state with its audit record. Errors never escape this module;
//! they become a Failed job.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use vproc_jobstore::JobStore;
use vproc_media::{classify, CommandBuilder, FfmpegRunner};
use vproc_models::{Job, JobId, OperationRecord, OperationType};
use vproc_storage::BlobStore;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Blob directory that holds produced outputs.
const OUTPUT_DIRECTORY: &str = "processed";

/// Shared dependencies of every job execution.
pub struct ProcessContext {
    pub store: JobStore,
    pub blobs: BlobStore,
    pub builder: CommandBuilder,
    pub runner: FfmpegRunner,
    pub work_dir: PathBuf,
}

impl ProcessContext {
    pub fn new(config: &EngineConfig, store: JobStore, blobs: BlobStore) -> Self {
        Self {
            store,
            blobs,
            builder: CommandBuilder::new(config.ffmpeg_binary.clone(), &config.default_quality)
                .with_quality_presets(config.quality_presets.clone()),
            runner: FfmpegRunner::new(config.timeout_minutes),
            work_dir: config.work_dir.clone(),
        }
    }
}

/// Claim and execute one job to a terminal state.
///
/// The caller holds the concurrency-ceiling permit for the duration of this
/// call; a lost claim (already claimed, canceled, or deleted) returns
/// without side effects.
pub async fn execute_job(ctx: &ProcessContext, id: &JobId) {
    let job = match ctx.store.try_claim(id, Utc::now()).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            debug!(job_id = %id, "Job no longer claimable, skipping");
            return;
        }
        Err(e) => {
            error!(job_id = %id, "Failed to claim job: {}", e);
            return;
        }
    };

    info!(job_id = %job.id, operation = %job.operation_type, "Starting processing for job");

    let attempt_started = job.started_at.unwrap_or_else(Utc::now);
    let result = run_transformation(ctx, &job).await;

    let record = OperationRecord {
        operation_type: job.operation_type,
        started_at: attempt_started,
        completed_at: Some(Utc::now()),
        is_successful: result.is_ok(),
        error_details: result.as_ref().err().map(failure_message),
    };

    let mut finished = match result {
        Ok(outcome) => {
            info!(
                job_id = %job.id,
                output = %outcome.reference,
                "Completed processing for job"
            );
            job.complete(outcome.reference, outcome.size_bytes)
        }
        Err(e) => {
            let message = failure_message(&e);
            error!(job_id = %job.id, "Failed to process job: {}", message);
            job.fail(message)
        }
    };
    finished.record_operation(record);

    // The terminal state and its audit entry land in one update.
    if let Err(e) = ctx.store.update(&finished).await {
        error!(job_id = %finished.id, "Failed to persist job outcome: {}", e);
    }

    cleanup_scratch(ctx, &finished.id).await;
}

struct TransformOutcome {
    reference: String,
    size_bytes: Option<u64>,
}

async fn run_transformation(ctx: &ProcessContext, job: &Job) -> EngineResult<TransformOutcome> {
    let scratch = scratch_dir(ctx, &job.id);
    fs::create_dir_all(&scratch).await?;

    let mut staged = Vec::with_capacity(job.inputs.len());
    for (index, reference) in job.inputs.iter().enumerate() {
        staged.push(stage_blob(ctx, reference, &scratch, &format!("input-{index}")).await?);
    }

    // A watermark image is a blob too; the builder needs it as a path.
    let mut params = job.parameters.clone();
    if job.operation_type == OperationType::AddWatermark {
        if let Some(reference) = job.parameters.watermark_image.as_deref() {
            let path = stage_blob(ctx, reference, &scratch, "watermark").await?;
            params.watermark_image = Some(path.to_string_lossy().into_owned());
        }
    }

    let filename = format!("{}.{}", job.id, output_extension(&params));
    let output_path = scratch.join(&filename);

    let invocation = ctx
        .builder
        .build(job.operation_type, &staged, &output_path, &params)?;
    ctx.runner.run(&invocation).await?;

    let size_bytes = fs::metadata(&output_path).await.ok().map(|meta| meta.len());
    let reference = ctx
        .blobs
        .save_file(&output_path, OUTPUT_DIRECTORY, &filename)
        .await?;

    Ok(TransformOutcome {
        reference,
        size_bytes,
    })
}

/// Resolve a blob to a local path the transcoder can read: the direct
/// on-disk path for the local backend, a staged download otherwise.
async fn stage_blob(
    ctx: &ProcessContext,
    reference: &str,
    scratch: &Path,
    prefix: &str,
) -> EngineResult<PathBuf> {
    if let Some(path) = ctx.blobs.local_path(reference) {
        return Ok(path);
    }

    let basename = reference.rsplit('/').next().unwrap_or(reference);
    let dest = scratch.join(format!("{prefix}-{basename}"));
    ctx.blobs.download_to(reference, &dest).await?;
    Ok(dest)
}

/// Output container extension: the requested format reduced to something
/// that can only ever be a file suffix, "mp4" otherwise.
fn output_extension(params: &vproc_models::ProcessingParams) -> String {
    let requested: String = params
        .output_format
        .as_deref()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if requested.is_empty() {
        "mp4".to_string()
    } else {
        requested.to_lowercase()
    }
}

fn scratch_dir(ctx: &ProcessContext, id: &JobId) -> PathBuf {
    ctx.work_dir.join(id.as_str())
}

async fn cleanup_scratch(ctx: &ProcessContext, id: &JobId) {
    let scratch = scratch_dir(ctx, id);
    if let Err(e) = fs::remove_dir_all(&scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(job_id = %id, "Failed to clean scratch dir: {}", e);
        }
    }
}

/// The message stored on a failed job: a classification when the stderr
/// matches a known signature, the raw stderr otherwise, and the error's
/// own message when there is no stderr at all.
fn failure_message(error: &EngineError) -> String {
    if let EngineError::Media(media) = error {
        if let Some(stderr) = media.stderr() {
            if let Some(friendly) = classify(stderr) {
                return friendly.to_string();
            }
            let trimmed = stderr.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    error.to_string()
}
