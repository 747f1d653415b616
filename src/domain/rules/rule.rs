//! Rule definition: a declarative trigger → response unit.
//!
//! Rules are authored through the admin surface and are read-only to the
//! engine. A rule is either standalone (`flow_id` is `None`) or one step of a
//! multi-turn flow.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use super::conditions::RuleConditions;
use crate::domain::foundation::RuleId;

/// Prefix marking a trigger pattern as a regular expression.
pub const REGEX_PREFIX: &str = "r:";

/// Catch-all trigger pattern and `next_steps` key.
pub const WILDCARD: &str = "*";

/// A deterministic rule that can answer a message without any model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,

    /// Human-readable description, also shown to the LLM classifier.
    #[serde(default)]
    pub description: String,

    /// Plain substrings, `r:`-prefixed regexes, or `*`.
    #[serde(default)]
    pub trigger_patterns: Vec<String>,

    /// Answer text with `{variable}` placeholders.
    pub response_template: String,

    #[serde(default)]
    pub variables: BTreeMap<String, Value>,

    /// Higher priority rules are checked first.
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default)]
    pub conditions: Option<RuleConditions>,

    #[serde(default)]
    pub flow_id: Option<String>,

    #[serde(default)]
    pub step_key: Option<String>,

    /// Step the conversation must be at. `None` marks a flow entry point.
    #[serde(default)]
    pub required_step: Option<String>,

    /// Reply token → next step. `None` ends the flow after this rule.
    #[serde(default)]
    pub next_steps: Option<NextSteps>,
}

fn default_active() -> bool {
    true
}

impl Rule {
    /// Creates an active standalone rule with no triggers.
    pub fn new(name: impl Into<String>, response_template: impl Into<String>) -> Self {
        Self {
            id: RuleId::new(),
            name: name.into(),
            description: String::new(),
            trigger_patterns: Vec::new(),
            response_template: response_template.into(),
            variables: BTreeMap::new(),
            priority: 0,
            is_active: true,
            conditions: None,
            flow_id: None,
            step_key: None,
            required_step: None,
            next_steps: None,
        }
    }

    pub fn with_id(mut self, id: RuleId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_triggers<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_conditions(mut self, conditions: RuleConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Places the rule in a flow at the given step.
    pub fn in_flow(mut self, flow_id: impl Into<String>, step_key: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self.step_key = Some(step_key.into());
        self
    }

    pub fn requires_step(mut self, step: impl Into<String>) -> Self {
        self.required_step = Some(step.into());
        self
    }

    pub fn with_next_steps<I, K, V>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.next_steps = Some(steps.into_iter().collect());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// True when the rule belongs to a flow.
    pub fn is_flow_rule(&self) -> bool {
        self.flow_id.is_some()
    }

    /// True for a flow rule without a prerequisite step.
    pub fn is_flow_entry(&self) -> bool {
        self.is_flow_rule() && self.required_step.is_none()
    }

    /// True when matching this rule keeps the flow going.
    pub fn continues_flow(&self) -> bool {
        self.next_steps.as_ref().is_some_and(|n| !n.is_empty())
    }
}

/// Ordered mapping from a normalized reply token to the next step key.
///
/// Serialized as a JSON object; key order is kept because the first matching
/// key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextSteps(Vec<(String, String)>);

impl NextSteps {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds or replaces a transition.
    pub fn insert(&mut self, key: impl Into<String>, target: impl Into<String>) {
        let key = key.into();
        let target = target.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = target,
            None => self.0.push((key, target)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Target of the `*` catch-all transition.
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD)
    }

    /// Non-wildcard transitions in definition order.
    pub fn choices(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(k, _)| k != WILDCARD)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All target step keys, wildcard included.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NextSteps {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut steps = NextSteps::new();
        for (k, v) in iter {
            steps.insert(k, v);
        }
        steps
    }
}

impl Serialize for NextSteps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NextSteps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NextStepsVisitor;

        impl<'de> Visitor<'de> for NextStepsVisitor {
            type Value = NextSteps;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping reply tokens to step keys")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<NextSteps, A::Error> {
                let mut steps = NextSteps::new();
                while let Some((key, target)) = access.next_entry::<String, Value>()? {
                    match target {
                        Value::String(target) => steps.insert(key, target),
                        other => {
                            return Err(de::Error::custom(format!(
                                "next_steps target for '{}' must be a string, got {}",
                                key, other
                            )))
                        }
                    }
                }
                Ok(steps)
            }
        }

        deserializer.deserialize_map(NextStepsVisitor)
    }
}

/// A structural problem in a rule set's flow definitions.
///
/// These never stop the engine; a broken flow just stops matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowIssue {
    DuplicateStep { flow_id: String, step_key: String },
    UnknownRequiredStep { flow_id: String, rule: String, required_step: String },
    DanglingTarget { flow_id: String, rule: String, target: String },
    MissingStepKey { flow_id: String, rule: String },
}

impl fmt::Display for FlowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowIssue::DuplicateStep { flow_id, step_key } => {
                write!(f, "flow '{}' defines step '{}' more than once", flow_id, step_key)
            }
            FlowIssue::UnknownRequiredStep { flow_id, rule, required_step } => write!(
                f,
                "rule '{}' in flow '{}' requires unknown step '{}'",
                rule, flow_id, required_step
            ),
            FlowIssue::DanglingTarget { flow_id, rule, target } => write!(
                f,
                "rule '{}' in flow '{}' transitions to unknown step '{}'",
                rule, flow_id, target
            ),
            FlowIssue::MissingStepKey { flow_id, rule } => {
                write!(f, "rule '{}' in flow '{}' has no step_key", rule, flow_id)
            }
        }
    }
}

/// Checks step uniqueness and step references across every flow in `rules`.
pub fn check_flows(rules: &[Rule]) -> Vec<FlowIssue> {
    let mut issues = Vec::new();
    let mut steps: HashMap<&str, HashSet<&str>> = HashMap::new();

    for rule in rules.iter().filter(|r| r.is_active) {
        let Some(flow_id) = rule.flow_id.as_deref() else {
            continue;
        };
        match rule.step_key.as_deref() {
            Some(step) => {
                if !steps.entry(flow_id).or_default().insert(step) {
                    issues.push(FlowIssue::DuplicateStep {
                        flow_id: flow_id.to_string(),
                        step_key: step.to_string(),
                    });
                }
            }
            None => issues.push(FlowIssue::MissingStepKey {
                flow_id: flow_id.to_string(),
                rule: rule.name.clone(),
            }),
        }
    }

    for rule in rules.iter().filter(|r| r.is_active) {
        let Some(flow_id) = rule.flow_id.as_deref() else {
            continue;
        };
        let known = steps.get(flow_id);
        let exists = |step: &str| known.is_some_and(|s| s.contains(step));

        if let Some(required) = rule.required_step.as_deref() {
            if !exists(required) {
                issues.push(FlowIssue::UnknownRequiredStep {
                    flow_id: flow_id.to_string(),
                    rule: rule.name.clone(),
                    required_step: required.to_string(),
                });
            }
        }
        if let Some(next) = &rule.next_steps {
            for target in next.targets() {
                if !exists(target) {
                    issues.push(FlowIssue::DanglingTarget {
                        flow_id: flow_id.to_string(),
                        rule: rule.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_deserializes_with_defaults() {
        let json = serde_json::json!({
            "id": RuleId::new(),
            "name": "hours",
            "response_template": "We are open 9-18",
        });
        let rule: Rule = serde_json::from_value(json).unwrap();

        assert!(rule.is_active);
        assert_eq!(rule.priority, 0);
        assert!(rule.trigger_patterns.is_empty());
        assert!(!rule.is_flow_rule());
        assert!(rule.next_steps.is_none());
    }

    #[test]
    fn next_steps_keep_definition_order() {
        let json = r#"{"B": "beta", "A": "alpha", "*": "other"}"#;
        let steps: NextSteps = serde_json::from_str(json).unwrap();

        let keys: Vec<_> = steps.choices().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["B", "A"]);
        assert_eq!(steps.wildcard(), Some("other"));
        assert_eq!(serde_json::to_string(&steps).unwrap(), json.replace(' ', ""));
    }

    #[test]
    fn next_steps_reject_non_string_targets() {
        let result: Result<NextSteps, _> = serde_json::from_str(r#"{"1": 5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn null_next_steps_means_flow_end() {
        let json = serde_json::json!({
            "id": RuleId::new(),
            "name": "price",
            "response_template": "100 TL",
            "flow_id": "f",
            "step_key": "price",
            "required_step": "start",
            "next_steps": null,
        });
        let rule: Rule = serde_json::from_value(json).unwrap();

        assert!(rule.is_flow_rule());
        assert!(!rule.is_flow_entry());
        assert!(!rule.continues_flow());
    }

    #[test]
    fn check_flows_accepts_consistent_flow() {
        let rules = vec![
            Rule::new("A", "a").in_flow("f", "start").with_next_steps([("1", "price")]),
            Rule::new("B", "b").in_flow("f", "price").requires_step("start"),
        ];
        assert!(check_flows(&rules).is_empty());
    }

    #[test]
    fn check_flows_reports_broken_references() {
        let rules = vec![
            Rule::new("A", "a").in_flow("f", "start").with_next_steps([("1", "missing")]),
            Rule::new("B", "b").in_flow("f", "start").requires_step("nowhere"),
        ];
        let issues = check_flows(&rules);

        assert!(issues.contains(&FlowIssue::DuplicateStep {
            flow_id: "f".into(),
            step_key: "start".into()
        }));
        assert!(issues
            .iter()
            .any(|i| matches!(i, FlowIssue::UnknownRequiredStep { required_step, .. } if required_step == "nowhere")));
        assert!(issues
            .iter()
            .any(|i| matches!(i, FlowIssue::DanglingTarget { target, .. } if target == "missing")));
    }

    #[test]
    fn inactive_rules_are_ignored_by_flow_check() {
        let rules = vec![Rule::new("A", "a")
            .in_flow("f", "start")
            .requires_step("ghost")
            .inactive()];
        assert!(check_flows(&rules).is_empty());
    }
}
