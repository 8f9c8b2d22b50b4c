//! # swarm-checkpoint — channel store and checkpoint persistence
//!
//! This crate holds two closely related layers of the engine's state model:
//!
//! - The **channel store** ([`channel`]): per-run storage for the named,
//!   typed channels a compiled graph reads and writes each superstep. Each
//!   channel declares a scope, an update policy, a reducer, and whether it
//!   is persisted.
//! - **Checkpoint persistence** ([`checkpoint`], [`traits`], [`memory`]): a
//!   binary, deterministic on-disk format (`HCKP1`) for snapshots of a
//!   thread's checkpointed channels, plus the [`CheckpointStore`] trait any
//!   storage backend implements.
//!
//! ## Channels
//!
//! A channel is declared once via [`ChannelSpec`] — giving it a scope
//! ([`ChannelScope::Global`] or [`ChannelScope::TaskLocal`]), an update
//! policy ([`UpdatePolicy::Single`] or [`UpdatePolicy::Multi`]), a reducer,
//! and a [`PersistenceClass`] — and then read and written through a
//! [`ChannelStore`] for the lifetime of a run.
//!
//! ```rust,ignore
//! use swarm_checkpoint::{ChannelStore, ChannelSpec, SendableValue};
//!
//! let spec = ChannelSpec::accumulator("total", |acc, v| match (acc, v) {
//!     (SendableValue::Int(a), SendableValue::Int(b)) => SendableValue::Int(a + b),
//!     (_, v) => v,
//! });
//! let store = ChannelStore::new(vec![spec]);
//! ```
//!
//! ## Checkpoints
//!
//! ```rust,ignore
//! use swarm_checkpoint::{InMemoryCheckpointStore, CheckpointStore, Checkpoint};
//!
//! # async fn example() -> swarm_checkpoint::Result<()> {
//! let store = InMemoryCheckpointStore::new();
//! let checkpoint = Checkpoint::new("thread-1", "run-1", "chk-1", 0, Vec::new());
//! store.save(checkpoint).await?;
//! let latest = store.load_latest("thread-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod traits;
pub mod value;

pub use channel::{
    ChannelScope, ChannelSpec, ChannelStore, ChannelWrite, Codec, JsonCodec, PersistenceClass,
    StoreVersion, UpdatePolicy,
};
pub use checkpoint::{Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use traits::CheckpointStore;
pub use value::SendableValue;
