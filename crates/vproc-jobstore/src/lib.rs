//! Durable job storage.
//!
//! The store is the single source of truth for job status. Besides plain
//! CRUD it provides the two atomic transitions out of Pending, claim
//! (dispatch) and cancel, which arbitrate through the same per-job
//! primitive so a cancellation racing a claim is either honored or cleanly
//! lost, never silently merged.
//!
//! Two backends behind a tagged variant: an in-process map for tests and
//! embedded use, and Redis for durable deployments.

pub mod error;
pub mod memory;
pub mod redis_store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use redis_store::RedisJobStore;

use chrono::{DateTime, Utc};
use vproc_models::{Job, JobId};

/// Durable CRUD plus the status-filtered, time-ordered queries the engine
/// needs. All operations are atomic at single-job granularity.
#[derive(Debug, Clone)]
pub enum JobStore {
    Memory(MemoryJobStore),
    Redis(RedisJobStore),
}

impl JobStore {
    /// In-process backend.
    pub fn memory() -> Self {
        Self::Memory(MemoryJobStore::new())
    }

    /// Redis backend.
    pub fn redis(store: RedisJobStore) -> Self {
        Self::Redis(store)
    }

    /// Build the Redis backend from `REDIS_URL` / `JOB_STORE_KEY_PREFIX`.
    pub fn from_env() -> StoreResult<Self> {
        Ok(Self::Redis(RedisJobStore::from_env()?))
    }

    /// Insert a new job. Fails if the id already exists.
    pub async fn insert(&self, job: &Job) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.insert(job).await,
            Self::Redis(store) => store.insert(job).await,
        }
    }

    /// Fetch a job by id.
    pub async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        match self {
            Self::Memory(store) => store.get(id).await,
            Self::Redis(store) => store.get(id).await,
        }
    }

    /// Persist the full current state of a job.
    pub async fn update(&self, job: &Job) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.update(job).await,
            Self::Redis(store) => store.update(job).await,
        }
    }

    /// Pending, non-canceled jobs ordered by creation time ascending,
    /// capped at `limit`.
    pub async fn query_pending(&self, limit: usize) -> StoreResult<Vec<Job>> {
        match self {
            Self::Memory(store) => store.query_pending(limit).await,
            Self::Redis(store) => store.query_pending(limit).await,
        }
    }

    /// Every job created before `cutoff`, regardless of status.
    pub async fn query_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        match self {
            Self::Memory(store) => store.query_older_than(cutoff).await,
            Self::Redis(store) => store.query_older_than(cutoff).await,
        }
    }

    /// Remove a batch of job records.
    pub async fn delete_batch(&self, ids: &[JobId]) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.delete_batch(ids).await,
            Self::Redis(store) => store.delete_batch(ids).await,
        }
    }

    /// Atomically claim a pending, non-canceled job for execution.
    ///
    /// On success the job is Processing with `started_at = now`, already
    /// persisted, and the claimed snapshot is returned. Returns `None` when
    /// the job is gone, canceled, or was claimed by someone else first.
    pub async fn try_claim(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
        match self {
            Self::Memory(store) => store.try_claim(id, now).await,
            Self::Redis(store) => store.try_claim(id, now).await,
        }
    }

    /// Atomically cancel a job that is still Pending.
    ///
    /// Returns `false` without mutating anything when the job is missing,
    /// already claimed, already canceled, or otherwise past Pending.
    pub async fn try_cancel(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<bool> {
        match self {
            Self::Memory(store) => store.try_cancel(id, now).await,
            Self::Redis(store) => store.try_cancel(id, now).await,
        }
    }

    /// Cheap reachability check used by the startup availability wait.
    pub async fn ping(&self) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.ping().await,
            Self::Redis(store) => store.ping().await,
        }
    }
}
