//! Rules domain: declarative rules, flows and deterministic matching.

mod conditions;
mod flow;
mod matcher;
mod rule;
mod template;

pub use conditions::{parse_timezone, RuleConditions, TimeWindow, WindowZone};
pub use flow::{ActiveFlow, FlowContext};
pub use matcher::{ChoiceMatching, MatchStage, RuleMatch, RuleMatcher};
pub use rule::{check_flows, FlowIssue, NextSteps, Rule, REGEX_PREFIX, WILDCARD};
pub use template::render;
