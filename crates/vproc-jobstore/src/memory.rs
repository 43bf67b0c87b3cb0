//! In-process job store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use vproc_models::{Job, JobId};

use crate::error::{StoreError, StoreResult};

/// Map-backed job store.
///
/// Claim and cancel each run inside one write-lock critical section, which
/// gives them the same single-row atomicity the durable backend provides.
/// State is per-instance, so independent engines (and tests) never
/// interfere.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(StoreError::already_exists(job.id.as_str()));
        }
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id.as_str()).cloned())
    }

    pub async fn update(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(job.id.as_str()) {
            return Err(StoreError::not_found(job.id.as_str()));
        }
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(())
    }

    pub async fn query_pending(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut pending: Vec<Job> = jobs
            .values()
            .filter(|job| job.is_dispatchable())
            .cloned()
            .collect();
        pending.sort_by_key(|job| job.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    pub async fn query_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.created_at < cutoff)
            .cloned()
            .collect())
    }

    pub async fn delete_batch(&self, ids: &[JobId]) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        for id in ids {
            jobs.remove(id.as_str());
        }
        Ok(())
    }

    pub async fn try_claim(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(id.as_str()) {
            Some(job) if job.is_dispatchable() => {
                let claimed = job.clone().start(now);
                jobs.insert(id.as_str().to_string(), claimed.clone());
                Ok(Some(claimed))
            }
            _ => Ok(None),
        }
    }

    pub async fn try_cancel(&self, id: &JobId, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(id.as_str()) {
            Some(job) if job.is_dispatchable() => {
                let canceled = job.clone().cancel(now);
                jobs.insert(id.as_str().to_string(), canceled);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vproc_models::{JobStatus, OperationType, ProcessingParams};

    fn job_created_at(offset_secs: i64) -> Job {
        let mut job = Job::new(
            OperationType::Convert,
            vec!["uploads/in.mp4".to_string()],
            ProcessingParams::default(),
            "key-1",
        );
        job.created_at = Utc::now() + Duration::seconds(offset_secs);
        job
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_ids() {
        let store = MemoryJobStore::new();
        let job = job_created_at(0);
        store.insert(&job).await.unwrap();
        assert!(matches!(
            store.insert(&job).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_query_pending_orders_oldest_first_and_caps() {
        let store = MemoryJobStore::new();
        let newest = job_created_at(30);
        let oldest = job_created_at(-30);
        let middle = job_created_at(0);
        for job in [&newest, &oldest, &middle] {
            store.insert(job).await.unwrap();
        }

        let pending = store.query_pending(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, oldest.id);
        assert_eq!(pending[1].id, middle.id);
    }

    #[tokio::test]
    async fn test_query_pending_excludes_canceled_and_claimed() {
        let store = MemoryJobStore::new();
        let canceled = job_created_at(-20);
        let claimed = job_created_at(-10);
        let eligible = job_created_at(0);
        for job in [&canceled, &claimed, &eligible] {
            store.insert(job).await.unwrap();
        }

        assert!(store.try_cancel(&canceled.id, Utc::now()).await.unwrap());
        assert!(store
            .try_claim(&claimed.id, Utc::now())
            .await
            .unwrap()
            .is_some());

        let pending = store.query_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, eligible.id);
    }

    #[tokio::test]
    async fn test_claim_wins_exactly_once() {
        let store = MemoryJobStore::new();
        let job = job_created_at(0);
        store.insert(&job).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = job.id.clone();
            handles.push(tokio::spawn(
                async move { store.try_claim(&id, Utc::now()).await },
            ));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_cancel_after_claim_is_refused() {
        let store = MemoryJobStore::new();
        let job = job_created_at(0);
        store.insert(&job).await.unwrap();

        assert!(store.try_claim(&job.id, Utc::now()).await.unwrap().is_some());
        assert!(!store.try_cancel(&job.id, Utc::now()).await.unwrap());

        // The job proceeds untouched by the lost cancellation.
        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert!(!stored.is_canceled);
    }

    #[tokio::test]
    async fn test_claim_after_cancel_is_refused() {
        let store = MemoryJobStore::new();
        let job = job_created_at(0);
        store.insert(&job).await.unwrap();

        assert!(store.try_cancel(&job.id, Utc::now()).await.unwrap());
        assert!(store.try_claim(&job.id, Utc::now()).await.unwrap().is_none());

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Canceled);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_query_older_than_and_delete_batch() {
        let store = MemoryJobStore::new();
        let old = job_created_at(-3600);
        let fresh = job_created_at(0);
        store.insert(&old).await.unwrap();
        store.insert(&fresh).await.unwrap();

        let cutoff = Utc::now() - Duration::seconds(1800);
        let expired = store.query_older_than(cutoff).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);

        store.delete_batch(&[old.id.clone()]).await.unwrap();
        assert!(store.get(&old.id).await.unwrap().is_none());
        assert!(store.get(&fresh.id).await.unwrap().is_some());

        // Re-running against an empty eligible set is a no-op.
        let expired = store.query_older_than(cutoff).await.unwrap();
        assert!(expired.is_empty());
        store.delete_batch(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let store = MemoryJobStore::new();
        let job = job_created_at(0);
        assert!(matches!(
            store.update(&job).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
