//! Channel store: versioned, typed, per-thread key→value slots governed by
//! a reducer, an update policy, a scope, and a persistence class.
//!
//! Grounded on the ancestor's `Channel` trait (`channels.rs`), generalized
//! from the ancestor's fixed channel-type zoo (`LastValueChannel`,
//! `TopicChannel`, `BinaryOperatorChannel`, ...) to the single reducer-based
//! [`ChannelSpec`] the orchestration compiler declares per channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};
use crate::value::SendableValue;

/// One value per thread, vs. one value per in-flight (sub)task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelScope {
    Global,
    TaskLocal,
}

/// `single`: at most one write per superstep (violation is an error).
/// `multi`: concurrent writes are folded in lexicographic producer-ID order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePolicy {
    Single,
    Multi,
}

/// `ephemeral` channels are recomputed on resume, never restored from a
/// checkpoint; `checkpointed` channels are serialized on every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceClass {
    Ephemeral,
    Checkpointed,
}

/// `(current, update) -> new`. Must be associative under the write order
/// the store applies (see [`UpdatePolicy::Multi`]).
pub type ReducerFn = Arc<dyn Fn(&SendableValue, &SendableValue) -> SendableValue + Send + Sync>;

/// Deterministic binary encoder/decoder. Required for any `checkpointed`
/// channel: `decode(encode(v)) == v` byte-for-byte (spec property #6).
pub trait Codec: Send + Sync {
    fn codec_id(&self) -> &'static str;
    fn encode(&self, value: &SendableValue) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<SendableValue>;
}

/// Canonical JSON codec. `SendableValue::Dict` uses a `BTreeMap` internally
/// so `serde_json` always visits fields in the same order, giving identical
/// bytes for identical logical values.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn codec_id(&self) -> &'static str {
        "json/v1"
    }

    fn encode(&self, value: &SendableValue) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CheckpointError::CodecFailure(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<SendableValue> {
        serde_json::from_slice(bytes).map_err(|e| CheckpointError::CodecFailure(e.to_string()))
    }
}

/// Declares the behavior of one channel; shared by every thread's store.
#[derive(Clone)]
pub struct ChannelSpec {
    pub key: String,
    pub scope: ChannelScope,
    pub update_policy: UpdatePolicy,
    pub persistence: PersistenceClass,
    pub reducer: ReducerFn,
    pub initial: Arc<dyn Fn() -> SendableValue + Send + Sync>,
    pub codec: Arc<dyn Codec>,
}

impl fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("update_policy", &self.update_policy)
            .field("persistence", &self.persistence)
            .finish()
    }
}

impl ChannelSpec {
    /// A `single`-policy, checkpointed "last write wins" channel.
    pub fn last_value(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            scope: ChannelScope::Global,
            update_policy: UpdatePolicy::Single,
            persistence: PersistenceClass::Checkpointed,
            reducer: Arc::new(|_current, update| update.clone()),
            initial: Arc::new(|| SendableValue::Null),
            codec: Arc::new(JsonCodec),
        }
    }

    /// A `multi`-policy accumulator channel driven by `reducer`.
    pub fn accumulator(
        key: impl Into<String>,
        initial: SendableValue,
        reducer: ReducerFn,
    ) -> Self {
        Self {
            key: key.into(),
            scope: ChannelScope::Global,
            update_policy: UpdatePolicy::Multi,
            persistence: PersistenceClass::Checkpointed,
            reducer,
            initial: Arc::new(move || initial.clone()),
            codec: Arc::new(JsonCodec),
        }
    }

    pub fn ephemeral(key: impl Into<String>) -> Self {
        let mut spec = Self::last_value(key);
        spec.persistence = PersistenceClass::Ephemeral;
        spec
    }

    pub fn with_scope(mut self, scope: ChannelScope) -> Self {
        self.scope = scope;
        self
    }
}

/// The current committed value of one channel plus its write-version.
#[derive(Debug, Clone)]
struct ChannelState {
    value: Option<SendableValue>,
    version: u64,
}

/// A single write emitted by a node in one superstep.
#[derive(Debug, Clone)]
pub struct ChannelWrite {
    pub channel: String,
    pub producer_node_id: String,
    pub value: SendableValue,
}

/// Opaque, monotonically increasing per-thread version handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreVersion(pub u64);

/// The versioned, typed, per-thread key→value store.
///
/// Readers within one superstep observe a consistent version (the one
/// committed at the end of the previous superstep); writers within one
/// superstep never observe each other's writes — `apply` takes the whole
/// batch of a superstep's writes at once and commits them atomically.
pub struct ChannelStore {
    specs: HashMap<String, ChannelSpec>,
    state: HashMap<String, ChannelState>,
    version: u64,
}

impl ChannelStore {
    pub fn new(specs: impl IntoIterator<Item = ChannelSpec>) -> Self {
        let specs: HashMap<String, ChannelSpec> =
            specs.into_iter().map(|s| (s.key.clone(), s)).collect();
        let state = specs
            .keys()
            .map(|k| (k.clone(), ChannelState { value: None, version: 0 }))
            .collect();
        Self { specs, state, version: 0 }
    }

    pub fn spec(&self, key: &str) -> Option<&ChannelSpec> {
        self.specs.get(key)
    }

    /// Returns the latest reduced value, lazily evaluating the channel's
    /// initial-value constructor on first read.
    pub fn get(&mut self, key: &str) -> Result<SendableValue> {
        let spec = self
            .specs
            .get(key)
            .ok_or_else(|| CheckpointError::UnknownChannelId(key.to_string()))?
            .clone();
        let entry = self.state.entry(key.to_string()).or_insert(ChannelState {
            value: None,
            version: 0,
        });
        if entry.value.is_none() {
            entry.value = Some((spec.initial)());
        }
        Ok(entry.value.clone().unwrap())
    }

    /// Atomically commits one superstep's writes. For `single`-policy
    /// channels, more than one write is `multipleUpdatesForSingleChannel`.
    /// For `multi`, writes are folded in lexicographic producer-ID order.
    pub fn apply(&mut self, writes: Vec<ChannelWrite>) -> Result<()> {
        let mut by_channel: HashMap<String, Vec<ChannelWrite>> = HashMap::new();
        for write in writes {
            by_channel.entry(write.channel.clone()).or_default().push(write);
        }

        for (channel, mut writes) in by_channel {
            let spec = self
                .specs
                .get(&channel)
                .ok_or_else(|| CheckpointError::UnknownChannelId(channel.clone()))?
                .clone();

            if spec.update_policy == UpdatePolicy::Single && writes.len() > 1 {
                return Err(CheckpointError::MultipleUpdatesForSingleChannel(channel));
            }

            writes.sort_by(|a, b| a.producer_node_id.cmp(&b.producer_node_id));

            let current = self.get(&channel)?;
            let mut reduced = current;
            for write in &writes {
                reduced = (spec.reducer)(&reduced, &write.value);
            }

            let entry = self.state.entry(channel).or_insert(ChannelState {
                value: None,
                version: 0,
            });
            entry.value = Some(reduced);
            entry.version = self.version + 1;
        }

        self.version += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> StoreVersion {
        StoreVersion(self.version)
    }

    /// Encodes every `checkpointed` channel's current value via its codec.
    /// Used by the checkpoint layer; `ephemeral` channels are skipped —
    /// they are recomputed, not restored, on resume.
    pub fn encode_checkpointed(&mut self) -> Result<Vec<(String, String, Vec<u8>)>> {
        let keys: Vec<String> = self.specs.keys().cloned().collect();
        let mut out = Vec::new();
        for key in keys {
            let spec = self.specs.get(&key).unwrap().clone();
            if spec.persistence != PersistenceClass::Checkpointed {
                continue;
            }
            let value = self.get(&key)?;
            let payload = spec.codec.encode(&value)?;
            out.push((key, spec.codec.codec_id().to_string(), payload));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Restores `checkpointed` channels from a prior `encode_checkpointed`
    /// batch. Channels absent from `payloads` keep their lazily-evaluated
    /// initial value.
    pub fn decode_checkpointed(&mut self, payloads: &[(String, String, Vec<u8>)]) -> Result<()> {
        for (key, codec_id, bytes) in payloads {
            let spec = self
                .specs
                .get(key)
                .ok_or_else(|| CheckpointError::UnknownChannelId(key.clone()))?
                .clone();
            if spec.codec.codec_id() != codec_id {
                return Err(CheckpointError::ChannelTypeMismatch(key.clone()));
            }
            let value = spec.codec.decode(bytes)?;
            self.state.insert(key.clone(), ChannelState { value: Some(value), version: self.version });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_reducer() -> ReducerFn {
        Arc::new(|current, update| {
            let c = match current {
                SendableValue::Int(i) => *i,
                _ => 0,
            };
            let u = match update {
                SendableValue::Int(i) => *i,
                _ => 0,
            };
            SendableValue::Int(c + u)
        })
    }

    #[test]
    fn single_policy_rejects_multiple_writes() {
        let mut store = ChannelStore::new(vec![ChannelSpec::last_value("x")]);
        let writes = vec![
            ChannelWrite { channel: "x".into(), producer_node_id: "a".into(), value: 1i64.into() },
            ChannelWrite { channel: "x".into(), producer_node_id: "b".into(), value: 2i64.into() },
        ];
        let err = store.apply(writes).unwrap_err();
        assert!(matches!(err, CheckpointError::MultipleUpdatesForSingleChannel(_)));
    }

    #[test]
    fn multi_policy_folds_in_lexicographic_producer_order() {
        let mut store =
            ChannelStore::new(vec![ChannelSpec::accumulator("sum", 0i64.into(), sum_reducer())]);
        let writes = vec![
            ChannelWrite { channel: "sum".into(), producer_node_id: "zzz".into(), value: 1i64.into() },
            ChannelWrite { channel: "sum".into(), producer_node_id: "aaa".into(), value: 2i64.into() },
        ];
        store.apply(writes).unwrap();
        assert_eq!(store.get("sum").unwrap(), SendableValue::Int(3));
    }

    #[test]
    fn unknown_channel_errors() {
        let mut store = ChannelStore::new(vec![]);
        assert!(matches!(
            store.get("missing").unwrap_err(),
            CheckpointError::UnknownChannelId(_)
        ));
    }

    #[test]
    fn initial_value_is_lazy_and_stable() {
        let mut store = ChannelStore::new(vec![ChannelSpec::last_value("x")]);
        assert_eq!(store.get("x").unwrap(), SendableValue::Null);
        assert_eq!(store.get("x").unwrap(), SendableValue::Null);
    }

    #[test]
    fn checkpointed_round_trips() {
        let mut store = ChannelStore::new(vec![ChannelSpec::last_value("x")]);
        store
            .apply(vec![ChannelWrite {
                channel: "x".into(),
                producer_node_id: "a".into(),
                value: SendableValue::string("hello"),
            }])
            .unwrap();

        let encoded = store.encode_checkpointed().unwrap();
        let mut restored = ChannelStore::new(vec![ChannelSpec::last_value("x")]);
        restored.decode_checkpointed(&encoded).unwrap();
        assert_eq!(restored.get("x").unwrap(), SendableValue::string("hello"));
    }

    #[test]
    fn ephemeral_channels_are_skipped_on_encode() {
        let mut store = ChannelStore::new(vec![ChannelSpec::ephemeral("scratch")]);
        store
            .apply(vec![ChannelWrite {
                channel: "scratch".into(),
                producer_node_id: "a".into(),
                value: SendableValue::Int(7),
            }])
            .unwrap();
        assert!(store.encode_checkpointed().unwrap().is_empty());
    }
}
