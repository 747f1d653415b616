//! `{variable}` substitution for rule response templates.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("Invalid placeholder regex"));

/// Replaces `{name}` placeholders with values from `variables`.
///
/// Strings are inserted as-is, other JSON values in their compact JSON form.
/// Placeholders without a matching variable are left untouched.
pub fn render(template: &str, variables: &BTreeMap<String, Value>) -> String {
    if variables.is_empty() {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match variables.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
