//! End-to-end engine tests.
//!
//! These drive the real dispatcher and pipeline against the in-memory job
//! store, a local blob store, and a shell script standing in for the
//! transcoder (the binary path is configuration, so the engine neither
//! knows nor cares).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;

use vproc_jobstore::JobStore;
use vproc_models::{Job, JobId, JobStatus, OperationType, ProcessingParams};
use vproc_storage::BlobStore;
use vproc_worker::{Dispatcher, EngineConfig, JobService, ProcessContext, RetentionSweeper};

/// Succeeds after a short sleep, writing a marker payload to the output
/// path (always the last argument).
const HAPPY_TOOL: &str = "#!/bin/sh\n\
for arg; do out=\"$arg\"; done\n\
sleep 0.3\n\
printf 'transcoded' > \"$out\"\n";

struct Harness {
    store: JobStore,
    blobs: BlobStore,
    service: JobService,
    ctx: Arc<ProcessContext>,
    config: EngineConfig,
    shutdown_rx: watch::Receiver<bool>,
    _shutdown_tx: watch::Sender<bool>,
    _dirs: Vec<TempDir>,
}

impl Harness {
    fn new(tool_script: &str, max_concurrent_jobs: usize) -> Self {
        let blob_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();

        let tool = write_tool(tool_dir.path(), tool_script);

        let config = EngineConfig {
            max_concurrent_jobs,
            ffmpeg_binary: tool,
            work_dir: work_dir.path().to_path_buf(),
            timeout_minutes: 1,
            store_wait_attempts: 1,
            store_wait_delay: std::time::Duration::from_millis(1),
            ..Default::default()
        };

        let store = JobStore::memory();
        let blobs = BlobStore::local(blob_dir.path());
        let service = JobService::new(store.clone(), blobs.clone());
        let ctx = Arc::new(ProcessContext::new(&config, store.clone(), blobs.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            store,
            blobs,
            service,
            ctx,
            config,
            shutdown_rx,
            _shutdown_tx: shutdown_tx,
            _dirs: vec![blob_dir, work_dir, tool_dir],
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.ctx),
            self.config.clone(),
            self.shutdown_rx.clone(),
        )
    }

    async fn save_input(&self, filename: &str) -> String {
        self.blobs
            .save_bytes(b"source media".to_vec(), "uploads", filename)
            .await
            .unwrap()
    }

    async fn submit(&self, operation: OperationType, params: ProcessingParams) -> JobId {
        let input = self.save_input("in.mp4").await;
        self.service
            .create_job(operation, vec![input], params, "test-key")
            .await
            .unwrap()
    }

    async fn job(&self, id: &JobId) -> Job {
        self.store.get(id).await.unwrap().unwrap()
    }
}

fn write_tool(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("transcoder.sh");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let harness = Harness::new(HAPPY_TOOL, 2);
    let id = harness
        .submit(OperationType::Convert, ProcessingParams::default())
        .await;

    let executed = harness.dispatcher().run_cycle().await.unwrap();
    assert_eq!(executed, 1);

    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_some());
    assert!(job.processing_duration_ms.unwrap() >= 0);
    assert_eq!(job.output_size_bytes, Some(10));
    assert_eq!(job.retry_count, 0);

    // Exactly one successful attempt in the audit log.
    assert_eq!(job.operations.len(), 1);
    assert!(job.operations[0].is_successful);

    // The output blob is readable through the service.
    let output = job.output.clone().unwrap();
    assert!(harness.blobs.exists(&output).await.unwrap());

    let mut reader = harness.service.open_output(&id).await.unwrap().unwrap();
    let mut content = Vec::new();
    reader.read_to_end(&mut content).await.unwrap();
    assert_eq!(content, b"transcoded");
}

#[tokio::test]
async fn test_concurrency_ceiling_is_respected() {
    let harness = Harness::new(HAPPY_TOOL, 2);
    for _ in 0..5 {
        harness
            .submit(OperationType::Convert, ProcessingParams::default())
            .await;
    }

    let dispatcher = Arc::new(harness.dispatcher());
    let cycle = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run_cycle().await })
    };

    // Sample semaphore occupancy while the batch runs.
    let mut max_in_flight = 0usize;
    while !cycle.is_finished() {
        let in_flight = 2 - dispatcher.available_permits();
        max_in_flight = max_in_flight.max(in_flight);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(cycle.await.unwrap().unwrap(), 5);
    assert!(max_in_flight <= 2, "ceiling exceeded: {max_in_flight}");
    assert!(max_in_flight >= 1, "no execution observed");

    let pending = harness.store.query_pending(10).await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_concurrent_cycles_never_double_execute() {
    let harness = Harness::new(HAPPY_TOOL, 4);
    let id = harness
        .submit(OperationType::Convert, ProcessingParams::default())
        .await;

    let first = Arc::new(harness.dispatcher());
    let second = Arc::new(harness.dispatcher());

    let (a, b) = tokio::join!(
        {
            let d = Arc::clone(&first);
            async move { d.run_cycle().await }
        },
        {
            let d = Arc::clone(&second);
            async move { d.run_cycle().await }
        },
    );
    a.unwrap();
    b.unwrap();

    // Both cycles may have seen the job pending, but the claim is atomic:
    // exactly one attempt ran.
    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.operations.len(), 1);
}

#[tokio::test]
async fn test_canceled_job_is_never_executed() {
    let harness = Harness::new(HAPPY_TOOL, 2);
    let id = harness
        .submit(OperationType::Convert, ProcessingParams::default())
        .await;

    assert!(harness.service.cancel(&id).await.unwrap());

    let executed = harness.dispatcher().run_cycle().await.unwrap();
    assert_eq!(executed, 0);

    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Canceled);
    assert!(job.is_canceled);
    assert!(job.operations.is_empty());
    assert!(job.started_at.is_none());

    // Terminal: cancel again reports no mutation.
    assert!(!harness.service.cancel(&id).await.unwrap());
}

#[tokio::test]
async fn test_processing_job_is_not_reclaimed() {
    let harness = Harness::new(HAPPY_TOOL, 2);
    let id = harness
        .submit(OperationType::Convert, ProcessingParams::default())
        .await;

    // Someone already holds the claim.
    harness.store.try_claim(&id, Utc::now()).await.unwrap().unwrap();

    let executed = harness.dispatcher().run_cycle().await.unwrap();
    assert_eq!(executed, 0);

    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.operations.is_empty());
}

#[tokio::test]
async fn test_known_stderr_is_classified() {
    let tool = "#!/bin/sh\n\
echo '[Parsed_concat_0] failed to configure output pad on concat' >&2\n\
exit 1\n";
    let harness = Harness::new(tool, 2);

    let first = harness.save_input("a.mp4").await;
    let second = harness.save_input("b.mp4").await;
    let id = harness
        .service
        .create_job(
            OperationType::Merge,
            vec![first, second],
            ProcessingParams::default(),
            "test-key",
        )
        .await
        .unwrap();

    harness.dispatcher().run_cycle().await.unwrap();

    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error_message.as_deref(),
        Some(vproc_media::VIDEO_SOURCES_INCOMPATIBLE)
    );
    assert_eq!(job.retry_count, 1);
    assert!(job.finished_at.is_some());
    assert!(job.output.is_none());

    assert_eq!(job.operations.len(), 1);
    assert!(!job.operations[0].is_successful);
}

#[tokio::test]
async fn test_unknown_stderr_is_stored_verbatim() {
    let tool = "#!/bin/sh\necho 'Permission denied' >&2\nexit 1\n";
    let harness = Harness::new(tool, 2);
    let id = harness
        .submit(OperationType::Convert, ProcessingParams::default())
        .await;

    harness.dispatcher().run_cycle().await.unwrap();

    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("Permission denied"));
}

#[tokio::test]
async fn test_invalid_parameters_fail_inside_execution() {
    let harness = Harness::new(HAPPY_TOOL, 2);

    // Bypass the service's synchronous validation: a Trim job without a
    // window reaches the pipeline and fails there instead.
    let input = harness.save_input("in.mp4").await;
    let job = Job::new(
        OperationType::Trim,
        vec![input],
        ProcessingParams::default(),
        "test-key",
    );
    let id = job.id.clone();
    harness.store.insert(&job).await.unwrap();

    harness.dispatcher().run_cycle().await.unwrap();

    let job = harness.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .as_deref()
        .unwrap()
        .contains("start_time and end_time"));
    assert_eq!(job.retry_count, 1);
}

#[tokio::test]
async fn test_failed_job_is_not_retried() {
    let tool = "#!/bin/sh\necho 'boom' >&2\nexit 1\n";
    let harness = Harness::new(tool, 2);
    let id = harness
        .submit(OperationType::Convert, ProcessingParams::default())
        .await;

    harness.dispatcher().run_cycle().await.unwrap();
    assert_eq!(harness.job(&id).await.retry_count, 1);

    // The next cycle finds nothing to do.
    let executed = harness.dispatcher().run_cycle().await.unwrap();
    assert_eq!(executed, 0);
    assert_eq!(harness.job(&id).await.retry_count, 1);
}

#[tokio::test]
async fn test_retention_sweep_purges_only_expired_jobs() {
    let harness = Harness::new(HAPPY_TOOL, 2);
    let retention = harness.config.retention_period;

    let old_input = harness.save_input("old.mp4").await;
    let old_output = harness
        .blobs
        .save_bytes(b"old output".to_vec(), "processed", "old-out.mp4")
        .await
        .unwrap();
    let mut old_job = Job::new(
        OperationType::Convert,
        vec![old_input.clone()],
        ProcessingParams::default(),
        "test-key",
    );
    old_job.created_at =
        Utc::now() - ChronoDuration::milliseconds(2 * retention.as_millis() as i64);
    old_job.output = Some(old_output.clone());
    harness.store.insert(&old_job).await.unwrap();

    let fresh_input = harness.save_input("fresh.mp4").await;
    let mut fresh_job = Job::new(
        OperationType::Convert,
        vec![fresh_input.clone()],
        ProcessingParams::default(),
        "test-key",
    );
    fresh_job.created_at =
        Utc::now() - ChronoDuration::milliseconds(retention.as_millis() as i64 / 2);
    harness.store.insert(&fresh_job).await.unwrap();

    let sweeper = RetentionSweeper::new(
        harness.store.clone(),
        harness.blobs.clone(),
        harness.config.clone(),
        harness.shutdown_rx.clone(),
    );

    assert_eq!(sweeper.sweep_once().await.unwrap(), 1);

    // The expired job and every blob it referenced are gone.
    assert!(harness.store.get(&old_job.id).await.unwrap().is_none());
    assert!(!harness.blobs.exists(&old_input).await.unwrap());
    assert!(!harness.blobs.exists(&old_output).await.unwrap());

    // The fresh job and its blob survive.
    assert!(harness.store.get(&fresh_job.id).await.unwrap().is_some());
    assert!(harness.blobs.exists(&fresh_input).await.unwrap());

    // Idempotent: a second pass over the empty set is a no-op.
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oldest_jobs_are_claimed_first() {
    let harness = Harness::new(HAPPY_TOOL, 1);

    let mut ids = Vec::new();
    for offset in [30i64, 10, 20] {
        let input = harness.save_input(&format!("in-{offset}.mp4")).await;
        let mut job = Job::new(
            OperationType::Convert,
            vec![input],
            ProcessingParams::default(),
            "test-key",
        );
        job.created_at = Utc::now() - ChronoDuration::seconds(offset);
        ids.push((offset, job.id.clone()));
        harness.store.insert(&job).await.unwrap();
    }

    // With batch_size 2, only the two oldest are claimed this cycle.
    let config = EngineConfig {
        batch_size: 2,
        ..harness.config.clone()
    };
    let dispatcher = Dispatcher::new(
        Arc::clone(&harness.ctx),
        config,
        harness.shutdown_rx.clone(),
    );
    dispatcher.run_cycle().await.unwrap();

    for (offset, id) in &ids {
        let job = harness.job(id).await;
        let expected = if *offset >= 20 {
            JobStatus::Completed
        } else {
            JobStatus::Pending
        };
        assert_eq!(job.status, expected, "job with offset {offset}");
    }
}
