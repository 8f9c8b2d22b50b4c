//! `SendableValue` — the JSON-shaped sum type used wherever arbitrary-but-safe
//! data crosses a channel, tool, or interrupt boundary.
//!
//! Dict keys are kept in a `BTreeMap` rather than `HashMap` so that encoding
//! a value always walks its fields in the same order — the channel codec
//! (see [`crate::channel::JsonCodec`]) depends on that for byte-identical
//! output on identical inputs (spec property #6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendableValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<SendableValue>),
    Dict(BTreeMap<String, SendableValue>),
}

impl SendableValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SendableValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, SendableValue>> {
        match self {
            SendableValue::Dict(m) => Some(m),
            _ => None,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        SendableValue::String(s.into())
    }

    pub fn dict() -> Self {
        SendableValue::Dict(BTreeMap::new())
    }
}

impl From<&str> for SendableValue {
    fn from(s: &str) -> Self {
        SendableValue::String(s.to_string())
    }
}

impl From<String> for SendableValue {
    fn from(s: String) -> Self {
        SendableValue::String(s)
    }
}

impl From<i64> for SendableValue {
    fn from(n: i64) -> Self {
        SendableValue::Int(n)
    }
}

impl From<bool> for SendableValue {
    fn from(b: bool) -> Self {
        SendableValue::Bool(b)
    }
}

impl From<JsonValue> for SendableValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => SendableValue::Null,
            JsonValue::Bool(b) => SendableValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SendableValue::Int(i)
                } else {
                    SendableValue::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => SendableValue::String(s),
            JsonValue::Array(items) => {
                SendableValue::Array(items.into_iter().map(SendableValue::from).collect())
            }
            JsonValue::Object(map) => SendableValue::Dict(
                map.into_iter()
                    .map(|(k, v)| (k, SendableValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<SendableValue> for JsonValue {
    fn from(value: SendableValue) -> Self {
        match value {
            SendableValue::Null => JsonValue::Null,
            SendableValue::Bool(b) => JsonValue::Bool(b),
            SendableValue::Int(i) => JsonValue::from(i),
            SendableValue::Double(d) => {
                serde_json::Number::from_f64(d).map(JsonValue::Number).unwrap_or(JsonValue::Null)
            }
            SendableValue::String(s) => JsonValue::String(s),
            SendableValue::Array(items) => {
                JsonValue::Array(items.into_iter().map(JsonValue::from).collect())
            }
            SendableValue::Dict(map) => JsonValue::Object(
                map.into_iter().map(|(k, v)| (k, JsonValue::from(v))).collect(),
            ),
        }
    }
}
