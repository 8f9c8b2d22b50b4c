//! [`InMemoryCheckpointStore`] — a reference [`CheckpointStore`] backed by a
//! `HashMap` of per-thread checkpoint histories.
//!
//! Grounded on the ancestor's `InMemoryCheckpointSaver`: same
//! `Arc<RwLock<HashMap<thread_id, Vec<_>>>>` shape, append-only history per
//! thread, latest-wins `load_latest`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::checkpoint::{Checkpoint, CheckpointId};
use crate::error::Result;
use crate::traits::CheckpointStore;

type Storage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint store, suitable for development and tests. Data is
/// lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Storage,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self { storage: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    pub async fn checkpoint_count(&self) -> usize {
        self.storage.read().await.values().map(Vec::len).sum()
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.entry(checkpoint.thread_id.clone()).or_insert_with(Vec::new).push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).and_then(|entries| entries.last().cloned()))
    }

    async fn list_checkpoints(&self, thread_id: &str, limit: usize) -> Result<Vec<CheckpointId>> {
        let storage = self.storage.read().await;
        let ids = storage
            .get(thread_id)
            .map(|entries| {
                entries.iter().rev().take(limit).map(|c| c.checkpoint_id.clone()).collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn load_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.iter().find(|c| c.checkpoint_id == checkpoint_id))
            .cloned())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(thread_id: &str, checkpoint_id: &str, step: u64) -> Checkpoint {
        Checkpoint::new(thread_id, "run-1", checkpoint_id, step, Vec::new())
    }

    #[tokio::test]
    async fn save_and_load_latest() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample("t1", "c1", 0)).await.unwrap();
        store.save(sample("t1", "c2", 1)).await.unwrap();

        let latest = store.load_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, "c2");
    }

    #[tokio::test]
    async fn load_latest_on_unknown_thread_is_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load_latest("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_checkpoints_most_recent_first() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample("t1", "c1", 0)).await.unwrap();
        store.save(sample("t1", "c2", 1)).await.unwrap();
        store.save(sample("t1", "c3", 2)).await.unwrap();

        let ids = store.list_checkpoints("t1", 2).await.unwrap();
        assert_eq!(ids, vec!["c3".to_string(), "c2".to_string()]);
    }

    #[tokio::test]
    async fn load_checkpoint_by_id() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample("t1", "c1", 0)).await.unwrap();
        store.save(sample("t1", "c2", 1)).await.unwrap();

        let found = store.load_checkpoint("t1", "c1").await.unwrap().unwrap();
        assert_eq!(found.step_index, 0);
        assert!(store.load_checkpoint("t1", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_thread_removes_all_checkpoints() {
        let store = InMemoryCheckpointStore::new();
        store.save(sample("t1", "c1", 0)).await.unwrap();
        assert_eq!(store.thread_count().await, 1);

        store.delete_thread("t1").await.unwrap();
        assert_eq!(store.thread_count().await, 0);
    }
}
