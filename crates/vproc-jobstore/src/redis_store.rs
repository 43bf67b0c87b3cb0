//! Redis-backed job store.
//!
//! Layout under a configurable key prefix:
//! - `{prefix}:job:{id}`: the job row as JSON
//! - `{prefix}:jobs:created`: zset of ids scored by creation time (ms)
//! - `{prefix}:exit:{id}`: one-shot marker arbitrating the transition out
//!   of Pending: whichever of claim/cancel wins the `SETNX` owns it, the
//!   loser observes a lost race and leaves the row alone.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use vproc_models::{Job, JobId};

use crate::error::{StoreError, StoreResult};

/// How many index entries to scan per round trip.
const SCAN_PAGE: isize = 100;

#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: redis::Client,
    prefix: String,
}

impl RedisJobStore {
    /// Create a store for the given Redis URL and key prefix.
    pub fn new(redis_url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    /// Create from `REDIS_URL` / `JOB_STORE_KEY_PREFIX`.
    pub fn from_env() -> StoreResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let prefix =
            std::env::var("JOB_STORE_KEY_PREFIX").unwrap_or_else(|_| "vproc".to_string());
        Self::new(&redis_url, prefix)
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:jobs:created", self.prefix)
    }

    fn exit_key(&self, id: &JobId) -> String {
        format!("{}:exit:{}", self.prefix, id)
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn insert(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        let created: bool = conn.set_nx(self.job_key(&job.id), &payload).await?;
        if !created {
            return Err(StoreError::already_exists(job.id.as_str()));
        }

        conn.zadd::<_, _, _, ()>(
            self.index_key(),
            job.id.as_str(),
            job.created_at.timestamp_millis(),
        )
        .await?;

        debug!("Inserted job {}", job.id);
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(self.job_key(id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn update(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = self.job_key(&job.id);

        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(StoreError::not_found(job.id.as_str()));
        }

        let payload = serde_json::to_string(job)?;
        conn.set::<_, _, ()>(&key, payload).await?;
        Ok(())
    }

    pub async fn query_pending(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let mut pending = Vec::new();
        let mut offset: isize = 0;

        // Walk the creation-time index in pages; it is already ordered
        // oldest first, so the first `limit` dispatchable rows win.
        loop {
            let ids: Vec<String> = conn
                .zrange(self.index_key(), offset, offset + SCAN_PAGE - 1)
                .await?;
            if ids.is_empty() {
                break;
            }

            for job in self.fetch_many(&mut conn, &ids).await? {
                if job.is_dispatchable() {
                    pending.push(job);
                    if pending.len() == limit {
                        return Ok(pending);
                    }
                }
            }

            offset += SCAN_PAGE;
        }

        Ok(pending)
    }

    pub async fn query_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .zrangebyscore(
                self.index_key(),
                "-inf",
                format!("({}", cutoff.timestamp_millis()),
            )
            .await?;
        self.fetch_many(&mut conn, &ids).await
    }

    pub async fn delete_batch(&self, ids: &[JobId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for id in ids {
            pipe.del(self.job_key(id)).ignore();
            pipe.del(self.exit_key(id)).ignore();
            pipe.zrem(self.index_key(), id.as_str()).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        debug!("Deleted {} job records", ids.len());
        Ok(())
    }

    pub async fn try_claim(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
        let mut conn = self.conn().await?;

        let won: bool = conn.set_nx(self.exit_key(id), "claim").await?;
        if !won {
            return Ok(None);
        }

        let Some(job) = self.get(id).await? else {
            return Ok(None);
        };
        if !job.is_dispatchable() {
            return Ok(None);
        }

        let claimed = job.start(now);
        let payload = serde_json::to_string(&claimed)?;
        conn.set::<_, _, ()>(self.job_key(id), payload).await?;
        Ok(Some(claimed))
    }

    pub async fn try_cancel(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn().await?;

        let won: bool = conn.set_nx(self.exit_key(id), "cancel").await?;
        if !won {
            return Ok(false);
        }

        let Some(job) = self.get(id).await? else {
            return Ok(false);
        };
        if !job.is_dispatchable() {
            return Ok(false);
        }

        let canceled = job.cancel(now);
        let payload = serde_json::to_string(&canceled)?;
        conn.set::<_, _, ()>(self.job_key(id), payload).await?;
        Ok(true)
    }

    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn fetch_many(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        ids: &[String],
    ) -> StoreResult<Vec<Job>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.job_key(&JobId::from_string(id.clone())))
            .collect();
        let payloads: Vec<Option<String>> = conn.mget(keys).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for payload in payloads.into_iter().flatten() {
            jobs.push(serde_json::from_str(&payload)?);
        }
        Ok(jobs)
    }
}
