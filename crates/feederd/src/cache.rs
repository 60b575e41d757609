//! Controller-local job cache: a non-durable mirror of every currently
//! active job, rebuilt at startup from `list_active()`.

use std::collections::HashMap;
use std::sync::Arc;

use nommer_types::Job;
use nommer_store::{JobStore, StoreError};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct JobCache {
    entries: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Startup: scan `list_active()` into the cache.
    pub async fn load_from_store(&self, store: &dyn JobStore) -> Result<usize, StoreError> {
        let active = store.list_active().await?;
        let mut entries = self.entries.write().await;
        entries.clear();
        for job in active {
            entries.insert(job.id.clone(), job);
        }
        Ok(entries.len())
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn update(&self, job: Job) {
        self.entries.write().await.insert(job.id.clone(), job);
    }

    pub async fn remove(&self, id: &str) -> Option<Job> {
        self.entries.write().await.remove(id)
    }

    pub async fn is_cached(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop any cached job that has reached a terminal state, matching
    /// `uncache_finished_jobs()`'s sweep after each controller loop.
    pub async fn uncache_finished(&self) {
        self.entries.write().await.retain(|_, job| job.state.is_active());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nommer_store::InMemoryJobStore;
    use nommer_types::{JobOptions, JobState};

    fn sample(id: &str) -> Job {
        let mut job = Job::new(
            "mem://in/a".into(),
            "mem://out/a".into(),
            JobOptions {
                nommer: "noop".into(),
                options: serde_json::json!({}),
            },
            None,
        );
        job.id = id.to_string();
        job
    }

    #[tokio::test]
    async fn load_from_store_populates_only_active_jobs() {
        let store = InMemoryJobStore::new();
        store.put(&sample("a")).await.unwrap();
        let mut done = sample("b");
        done.transition_to(JobState::Error, None).unwrap();
        store.put(&done).await.unwrap();

        let cache = JobCache::new();
        let n = cache.load_from_store(&store).await.unwrap();
        assert_eq!(n, 1);
        assert!(cache.is_cached("a").await);
        assert!(!cache.is_cached("b").await);
    }

    #[tokio::test]
    async fn uncache_finished_drops_terminal_entries() {
        let cache = JobCache::new();
        let mut job = sample("a");
        cache.update(job.clone()).await;
        job.transition_to(JobState::Error, None).unwrap();
        cache.update(job).await;

        cache.uncache_finished().await;
        assert!(!cache.is_cached("a").await);
    }
}
