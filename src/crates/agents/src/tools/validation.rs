//! Argument validation against a tool's declared JSON Schema
//! (spec.md §4.6 "validate args against schema" in the `ToolExec`
//! state).
//!
//! A typed per-field constraint list, narrowed to the subset the spec
//! actually calls for (required fields, primitive type checks) and
//! expressed over `SendableValue` rather than `serde_json::Value` so it
//! composes with the rest of the agent loop without a conversion at every
//! call site. Execution constraints, rate limiting, and a security/
//! redaction policy are out of scope here; nothing in the agent loop
//! enforces them.

use std::collections::BTreeMap;

use swarm_checkpoint::SendableValue;

use crate::error::{Result, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParameterType {
    fn matches(&self, value: &SendableValue) -> bool {
        match (self, value) {
            (ParameterType::Any, _) => true,
            (ParameterType::String, SendableValue::String(_)) => true,
            (ParameterType::Number, SendableValue::Int(_) | SendableValue::Double(_)) => true,
            (ParameterType::Boolean, SendableValue::Bool(_)) => true,
            (ParameterType::Object, SendableValue::Dict(_)) => true,
            (ParameterType::Array, SendableValue::Array(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParameterType,
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self { name: name.into(), param_type, required: true }
    }

    pub fn optional(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self { name: name.into(), param_type, required: false }
    }
}

/// Validates `args` (expected to be a `SendableValue::Dict`) against a
/// tool's declared parameters, surfacing the first violation as
/// `ToolError::InvalidArgumentsJson` with the tool name attached.
pub fn validate_arguments(tool_name: &str, params: &[ParameterSpec], args: &SendableValue) -> Result<()> {
    let empty: BTreeMap<String, SendableValue> = BTreeMap::new();
    let fields = args.as_dict().unwrap_or(&empty);

    for param in params {
        match fields.get(&param.name) {
            None if param.required => {
                return Err(ToolError::InvalidArgumentsJson {
                    tool: tool_name.to_string(),
                    error: format!("missing required parameter '{}'", param.name),
                }
                .into());
            }
            None => continue,
            Some(value) if !param.param_type.matches(value) => {
                return Err(ToolError::InvalidArgumentsJson {
                    tool: tool_name.to_string(),
                    error: format!("parameter '{}' has the wrong type", param.name),
                }
                .into());
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn dict(pairs: &[(&str, SendableValue)]) -> SendableValue {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.clone());
        }
        SendableValue::Dict(map)
    }

    #[test]
    fn accepts_well_formed_arguments() {
        let params = vec![ParameterSpec::required("a", ParameterType::Number), ParameterSpec::required("b", ParameterType::Number)];
        let args = dict(&[("a", SendableValue::Int(1)), ("b", SendableValue::Int(2))]);
        assert!(validate_arguments("calc", &params, &args).is_ok());
    }

    #[test]
    fn rejects_missing_required_parameter() {
        let params = vec![ParameterSpec::required("a", ParameterType::Number)];
        let args = dict(&[]);
        let err = validate_arguments("calc", &params, &args).unwrap_err();
        assert!(matches!(err, crate::error::AgentError::Tool(ToolError::InvalidArgumentsJson { .. })));
    }

    #[test]
    fn rejects_wrong_type() {
        let params = vec![ParameterSpec::required("a", ParameterType::Number)];
        let args = dict(&[("a", SendableValue::string("not a number"))]);
        assert!(validate_arguments("calc", &params, &args).is_err());
    }

    #[test]
    fn optional_parameter_may_be_absent() {
        let params = vec![ParameterSpec::optional("verbose", ParameterType::Boolean)];
        let args = dict(&[]);
        assert!(validate_arguments("calc", &params, &args).is_ok());
    }
}
