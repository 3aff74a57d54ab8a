//! Job registry: the single source of truth for what is running.
//!
//! Writers (insert/remove) take the lock exclusively, readers share it. The
//! lock is never held while waiting on a process.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job::{Job, JobSnapshot};

/// Concurrency-safe table of live jobs keyed by source locator.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. Never overwrites a job already registered under its key.
    pub async fn insert(&self, job: Arc<Job>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.entry(job.key().to_string()) {
            Entry::Occupied(entry) => Err(Error::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(job);
                Ok(())
            }
        }
    }

    /// Remove whatever job is registered under `key`.
    pub async fn remove(&self, key: &str) -> Result<Arc<Job>> {
        self.jobs
            .write()
            .await
            .remove(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Remove the job under `key` only if it is the incarnation `id`.
    ///
    /// Stop and the exit monitor both reap through here; whichever comes
    /// second gets `None`.
    pub async fn remove_if(&self, key: &str, id: Uuid) -> Option<Arc<Job>> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(key) {
            Some(job) if job.id() == id => jobs.remove(key),
            _ => None,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Arc<Job>> {
        self.jobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.jobs.read().await.contains_key(key)
    }

    /// Snapshot of every job, taken under a single read lock and sorted by key.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .jobs
            .read()
            .await
            .values()
            .map(|job| job.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.url.cmp(&b.url));
        snapshots
    }

    /// Every registered job record.
    pub async fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{PipelineConfig, ProcessHandle, ProcessWaiter, Signal};

    fn sleeping_job(key: &str) -> (Arc<Job>, ProcessWaiter) {
        let config = PipelineConfig::with_script("sleep 30");
        let (handle, waiter) = ProcessHandle::spawn(&config, key, "dst").unwrap();
        (Arc::new(Job::new(key, "dst", handle)), waiter)
    }

    async fn reap(job: &Job, waiter: ProcessWaiter) {
        let _ = job.handle().signal(Signal::Kill);
        let _ = waiter.wait().await;
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_key() {
        let registry = JobRegistry::new();
        let (first, first_waiter) = sleeping_job("srcA");
        let (second, second_waiter) = sleeping_job("srcA");

        registry.insert(first.clone()).await.unwrap();
        let err = registry.insert(second.clone()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(ref k) if k == "srcA"));

        // The original entry is untouched.
        assert_eq!(registry.get("srcA").await.unwrap().id(), first.id());
        assert_eq!(registry.len().await, 1);

        reap(&first, first_waiter).await;
        reap(&second, second_waiter).await;
    }

    #[tokio::test]
    async fn test_remove_if_only_matches_same_incarnation() {
        let registry = JobRegistry::new();
        let (job, waiter) = sleeping_job("srcA");
        registry.insert(job.clone()).await.unwrap();

        assert!(registry.remove_if("srcA", Uuid::new_v4()).await.is_none());
        assert!(registry.contains("srcA").await);

        let removed = registry.remove_if("srcA", job.id()).await.unwrap();
        assert_eq!(removed.id(), job.id());
        assert!(registry.remove_if("srcA", job.id()).await.is_none());
        assert!(registry.is_empty().await);

        reap(&job, waiter).await;
    }

    #[tokio::test]
    async fn test_remove_and_get_missing_key() {
        let registry = JobRegistry::new();
        assert!(matches!(registry.get("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(registry.remove("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_unique() {
        let registry = JobRegistry::new();
        let mut spawned = Vec::new();
        for key in ["srcC", "srcA", "srcB"] {
            let (job, waiter) = sleeping_job(key);
            registry.insert(job.clone()).await.unwrap();
            spawned.push((job, waiter));
        }

        let urls: Vec<String> = registry.list().await.into_iter().map(|s| s.url).collect();
        assert_eq!(urls, vec!["srcA", "srcB", "srcC"]);

        for (job, waiter) in spawned {
            reap(&job, waiter).await;
        }
    }
}
