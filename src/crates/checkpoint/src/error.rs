//! Error types for the channel store and checkpoint layer.
//!
//! Variants map onto the `Channel{...}` and `Checkpoint{...}` groups of the
//! engine's surface error taxonomy.

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

#[derive(Error, Debug)]
pub enum CheckpointError {
    /// `get`/`apply` referenced a channel the store was not built with.
    #[error("unknown channel id: {0}")]
    UnknownChannelId(String),

    /// A restored payload's codec id doesn't match the channel's declared codec.
    #[error("channel type mismatch: {0}")]
    ChannelTypeMismatch(String),

    /// More than one write landed on a `single`-policy channel in one superstep.
    #[error("multiple updates for single-policy channel: {0}")]
    MultipleUpdatesForSingleChannel(String),

    /// Codec encode/decode failed; fatal to the run per spec §4.1.
    #[error("codec failure: {0}")]
    CodecFailure(String),

    /// No checkpoint exists for the requested thread/id.
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    /// The checkpoint store does not support this query (e.g. history on a
    /// backend that only keeps the latest checkpoint).
    #[error("unsupported checkpoint operation: {0}")]
    Unsupported(String),

    /// Binary header/body malformed or failed to (de)serialize.
    #[error("checkpoint serialization failed: {0}")]
    SerializationFailed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::SerializationFailed(e.to_string())
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(e: bincode::Error) -> Self {
        CheckpointError::SerializationFailed(e.to_string())
    }
}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        CheckpointError::SerializationFailed(e.to_string())
    }
}
