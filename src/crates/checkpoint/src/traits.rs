//! [`CheckpointStore`] — the storage abstraction checkpoint backends implement.
//!
//! Grounded on the ancestor's `CheckpointSaver` trait: same shape (save the
//! latest, optionally query history), narrowed to the operations spec §6.2
//! names. A backend that cannot list or load older checkpoints returns
//! [`CheckpointError::Unsupported`] from those two methods rather than
//! implementing them as no-ops.

use async_trait::async_trait;

use crate::checkpoint::{Checkpoint, CheckpointId};
use crate::error::Result;

/// Persists and retrieves [`Checkpoint`]s for a thread.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists `checkpoint`, making it the latest for its `thread_id`.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Loads the most recently saved checkpoint for `thread_id`, if any.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Lists checkpoint ids for `thread_id`, most recent first, capped at
    /// `limit`. Returns [`CheckpointError::Unsupported`] for backends that
    /// only retain the latest checkpoint.
    async fn list_checkpoints(&self, thread_id: &str, limit: usize) -> Result<Vec<CheckpointId>>;

    /// Loads one specific checkpoint by id. Returns
    /// [`CheckpointError::Unsupported`] for backends that only retain the
    /// latest checkpoint.
    async fn load_checkpoint(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>>;

    /// Deletes every checkpoint stored for `thread_id`.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
