//! Flow context: the conversation's position inside a multi-step rule flow.
//!
//! The persisted form is a JSON object `{"flow_id", "current_step", ...}` or
//! `null`. Inside the engine it is a typed sum; the JSON boundary is
//! [`FlowContext::from_value`] / [`FlowContext::to_value`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a conversation currently is within a flow, if anywhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FlowContext {
    #[default]
    Inactive,
    Active(ActiveFlow),
}

/// An active flow position. Both identifiers are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFlow {
    pub flow_id: String,
    pub current_step: String,

    /// step_key → the reply the user gave when leaving that step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selections: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl ActiveFlow {
    pub fn new(flow_id: impl Into<String>, current_step: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            current_step: current_step.into(),
            selections: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    /// Moves to `next_step`, remembering `reply` as the answer to the step
    /// being left.
    pub fn advance(&self, next_step: impl Into<String>, reply: &str) -> ActiveFlow {
        let mut selections = self.selections.clone();
        selections.insert(self.current_step.clone(), reply.trim().to_string());
        let mut data = self.data.clone();
        data.insert("last_query".to_string(), Value::String(reply.trim().to_string()));

        ActiveFlow {
            flow_id: self.flow_id.clone(),
            current_step: next_step.into(),
            selections,
            data,
        }
    }
}

impl FlowContext {
    /// Builds an active context at `current_step` of `flow_id`.
    pub fn active(flow_id: impl Into<String>, current_step: impl Into<String>) -> Self {
        FlowContext::Active(ActiveFlow::new(flow_id, current_step))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FlowContext::Active(_))
    }

    pub fn flow_id(&self) -> Option<&str> {
        match self {
            FlowContext::Active(flow) => Some(&flow.flow_id),
            FlowContext::Inactive => None,
        }
    }

    pub fn current_step(&self) -> Option<&str> {
        match self {
            FlowContext::Active(flow) => Some(&flow.current_step),
            FlowContext::Inactive => None,
        }
    }

    pub fn as_active(&self) -> Option<&ActiveFlow> {
        match self {
            FlowContext::Active(flow) => Some(flow),
            FlowContext::Inactive => None,
        }
    }

    /// Reads a persisted flow state blob.
    ///
    /// `null`, non-objects, and objects missing a non-empty `flow_id` or
    /// `current_step` all yield [`FlowContext::Inactive`].
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return FlowContext::Inactive;
        };

        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let (Some(flow_id), Some(current_step)) = (text("flow_id"), text("current_step")) else {
            return FlowContext::Inactive;
        };

        let selections = map
            .get("selections")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let data = map
            .get("data")
            .and_then(Value::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        FlowContext::Active(ActiveFlow {
            flow_id,
            current_step,
            selections,
            data,
        })
    }

    /// Reads an optional blob; `None` is the same as `null`.
    pub fn from_optional(value: Option<&Value>) -> Self {
        value.map(Self::from_value).unwrap_or_default()
    }

    /// Serializes for persistence. Inactive contexts become `null`.
    pub fn to_value(&self) -> Value {
        match self {
            FlowContext::Active(flow) => serde_json::to_value(flow).unwrap_or(Value::Null),
            FlowContext::Inactive => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn null_is_inactive() {
        let ctx = FlowContext::from_value(&Value::Null);
        assert_eq!(ctx, FlowContext::Inactive);
        assert!(!ctx.is_active());
        assert!(ctx.flow_id().is_none());
    }

    #[test]
    fn inactive_serializes_to_null() {
        assert_eq!(FlowContext::Inactive.to_value(), Value::Null);
    }

    #[test]
    fn minimal_blob_is_active() {
        let ctx = FlowContext::from_value(&json!({"flow_id": "f", "current_step": "start"}));
        assert_eq!(ctx, FlowContext::active("f", "start"));
        assert_eq!(ctx.current_step(), Some("start"));
    }

    #[test]
    fn partial_blob_is_inactive() {
        assert!(!FlowContext::from_value(&json!({"flow_id": "f"})).is_active());
        assert!(!FlowContext::from_value(&json!({"flow_id": "f", "current_step": null})).is_active());
        assert!(!FlowContext::from_value(&json!({"flow_id": "", "current_step": "x"})).is_active());
        assert!(!FlowContext::from_value(&json!("f")).is_active());
    }

    #[test]
    fn active_serializes_minimal_shape() {
        let value = FlowContext::active("f", "start").to_value();
        assert_eq!(value, json!({"flow_id": "f", "current_step": "start"}));
    }

    #[test]
    fn advance_records_selection() {
        let flow = ActiveFlow::new("f", "start").advance("price", " 1 ");
        assert_eq!(flow.current_step, "price");
        assert_eq!(flow.selections.get("start").map(String::as_str), Some("1"));
        assert_eq!(flow.data.get("last_query"), Some(&json!("1")));
    }

    #[test]
    fn selections_survive_round_trip() {
        let ctx = FlowContext::Active(ActiveFlow::new("f", "start").advance("price", "1"));
        assert_eq!(FlowContext::from_value(&ctx.to_value()), ctx);
    }

    proptest! {
        #[test]
        fn round_trip_preserves_any_active_context(
            flow_id in "[a-z_]{1,12}",
            step in "[a-z0-9_]{1,12}",
            picks in proptest::collection::btree_map("[a-z]{1,6}", "[A-Za-z0-9 ]{0,10}", 0..4),
        ) {
            let mut flow = ActiveFlow::new(flow_id, step);
            flow.selections = picks;
            let ctx = FlowContext::Active(flow);
            prop_assert_eq!(FlowContext::from_value(&ctx.to_value()), ctx);
        }
    }
}
