//! The `HCKP1` checkpoint binary format (spec §6.4) and the in-memory
//! `Checkpoint` struct it serializes.
//!
//! Grounded in shape on the ancestor's `pregel/checkpoint.rs`, but the wire
//! format itself is new: the ancestor checkpoints via `serde_json`, which
//! does not give the byte-identical round-trips spec property #6 demands
//! across arbitrary map iteration orders. `ChannelStore::encode_checkpointed`
//! already returns channels pre-sorted by id, so the body below is written
//! in a single deterministic pass.

use std::io::{Cursor, Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CheckpointError, Result};

const MAGIC: &[u8; 5] = b"HCKP1";
const FORMAT_VERSION: u16 = 1;

pub type CheckpointId = String;

/// Identifies exactly which checkpoint a request is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub thread_id: String,
    pub checkpoint_id: Option<CheckpointId>,
}

impl CheckpointConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self { thread_id: thread_id.into(), checkpoint_id: None }
    }

    pub fn with_checkpoint_id(mut self, id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(id.into());
        self
    }
}

/// Execution metadata recorded alongside a checkpoint: step number and
/// source, for history inspection (`checkpointHistory`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub step_index: u64,
    pub source: String,
}

impl Default for CheckpointMetadata {
    fn default() -> Self {
        Self { step_index: 0, source: "loop".to_string() }
    }
}

/// One durable snapshot of a thread's `checkpointed` channels.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub graph_version: u32,
    pub thread_id: String,
    pub run_id: String,
    pub checkpoint_id: CheckpointId,
    pub step_index: u64,
    pub created_at: DateTime<Utc>,
    /// (channel id, codec id, encoded payload), pre-sorted by channel id.
    pub channels: Vec<(String, String, Vec<u8>)>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        checkpoint_id: impl Into<String>,
        step_index: u64,
        channels: Vec<(String, String, Vec<u8>)>,
    ) -> Self {
        Self {
            schema_version: 1,
            graph_version: 1,
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            checkpoint_id: checkpoint_id.into(),
            step_index,
            created_at: Utc::now(),
            channels,
        }
    }

    /// Canonical `HCKP1` binary encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_all(MAGIC).map_err(CheckpointError::from)?;
        write_u16(&mut buf, FORMAT_VERSION);
        write_u32(&mut buf, self.schema_version);
        write_u32(&mut buf, self.graph_version);
        write_string(&mut buf, &self.thread_id);
        write_string(&mut buf, &self.run_id);
        write_string(&mut buf, &self.checkpoint_id);
        write_u64(&mut buf, self.step_index);
        write_i64(&mut buf, self.created_at.timestamp_millis());
        write_u32(&mut buf, self.channels.len() as u32);
        for (channel_id, codec_id, payload) in &self.channels {
            write_string(&mut buf, channel_id);
            write_string(&mut buf, codec_id);
            write_bytes(&mut buf, payload);
        }
        Ok(buf)
    }

    /// Decodes a buffer produced by [`Checkpoint::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let mut magic = [0u8; 5];
        cursor.read_exact(&mut magic).map_err(CheckpointError::from)?;
        if &magic != MAGIC {
            return Err(CheckpointError::SerializationFailed("bad magic".to_string()));
        }
        let version = read_u16(&mut cursor)?;
        if version != FORMAT_VERSION {
            return Err(CheckpointError::SerializationFailed(format!(
                "unsupported checkpoint format version {version}"
            )));
        }

        let schema_version = read_u32(&mut cursor)?;
        let graph_version = read_u32(&mut cursor)?;
        let thread_id = read_string(&mut cursor)?;
        let run_id = read_string(&mut cursor)?;
        let checkpoint_id = read_string(&mut cursor)?;
        let step_index = read_u64(&mut cursor)?;
        let created_at_ms = read_i64(&mut cursor)?;
        let created_at = DateTime::from_timestamp_millis(created_at_ms)
            .ok_or_else(|| CheckpointError::SerializationFailed("bad timestamp".to_string()))?;

        let channel_count = read_u32(&mut cursor)?;
        let mut channels = Vec::with_capacity(channel_count as usize);
        for _ in 0..channel_count {
            let channel_id = read_string(&mut cursor)?;
            let codec_id = read_string(&mut cursor)?;
            let payload = read_bytes(&mut cursor)?;
            channels.push((channel_id, codec_id, payload));
        }

        Ok(Self {
            schema_version,
            graph_version,
            thread_id,
            run_id,
            checkpoint_id,
            step_index,
            created_at,
            channels,
        })
    }

    /// SHA-256 over the canonical encoding; used by determinism tests
    /// (spec property #7) and by `StateSnapshot`'s channel-state digest.
    pub fn hash(&self) -> Result<String> {
        let bytes = self.encode()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}
fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_bytes(buf, s.as_bytes());
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    let mut b = [0u8; 2];
    cursor.read_exact(&mut b).map_err(CheckpointError::from)?;
    Ok(u16::from_le_bytes(b))
}
fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut b = [0u8; 4];
    cursor.read_exact(&mut b).map_err(CheckpointError::from)?;
    Ok(u32::from_le_bytes(b))
}
fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    let mut b = [0u8; 8];
    cursor.read_exact(&mut b).map_err(CheckpointError::from)?;
    Ok(u64::from_le_bytes(b))
}
fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64> {
    let mut b = [0u8; 8];
    cursor.read_exact(&mut b).map_err(CheckpointError::from)?;
    Ok(i64::from_le_bytes(b))
}
fn read_bytes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = read_u32(cursor)? as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(CheckpointError::from)?;
    Ok(buf)
}
fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let bytes = read_bytes(cursor)?;
    String::from_utf8(bytes).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Checkpoint {
        Checkpoint::new(
            "thread-1",
            "run-1",
            "chk-1",
            3,
            vec![
                ("a".to_string(), "json/v1".to_string(), b"1".to_vec()),
                ("b".to_string(), "json/v1".to_string(), b"\"hi\"".to_vec()),
            ],
        )
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let checkpoint = sample();
        let encoded = checkpoint.encode().unwrap();
        let decoded = Checkpoint::decode(&encoded).unwrap();
        let re_encoded = decoded.encode().unwrap();
        assert_eq!(encoded, re_encoded);
    }

    #[test]
    fn decode_preserves_fields() {
        let checkpoint = sample();
        let encoded = checkpoint.encode().unwrap();
        let decoded = Checkpoint::decode(&encoded).unwrap();
        assert_eq!(decoded.thread_id, "thread-1");
        assert_eq!(decoded.run_id, "run-1");
        assert_eq!(decoded.checkpoint_id, "chk-1");
        assert_eq!(decoded.step_index, 3);
        assert_eq!(decoded.channels.len(), 2);
        assert_eq!(decoded.channels[0].0, "a");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = sample().encode().unwrap();
        encoded[0] = b'X';
        assert!(Checkpoint::decode(&encoded).is_err());
    }

    #[test]
    fn hash_is_stable_for_identical_checkpoints() {
        let a = sample();
        let mut b = sample();
        b.created_at = a.created_at;
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }
}
