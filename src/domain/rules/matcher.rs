//! Deterministic rule matching with multi-step flow support.
//!
//! The matcher is built once from a rule snapshot and is then read-only;
//! every call is a pure function of (query, flow context, platform, clock).

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::flow::{ActiveFlow, FlowContext};
use super::rule::{check_flows, Rule, REGEX_PREFIX, WILDCARD};
use super::template::render;
use crate::domain::foundation::RuleId;

/// How a reply is compared against the keys of a `next_steps` mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceMatching {
    /// Keys of one or two characters must appear as a whole word (or be the
    /// whole reply); longer keys match as substrings.
    #[default]
    ShortKeysWholeWord,
    /// Every key must appear as a whole word sequence.
    WholeWord,
    /// Every key matches as a case-insensitive substring.
    Substring,
}

impl ChoiceMatching {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceMatching::ShortKeysWholeWord => "short_keys_whole_word",
            ChoiceMatching::WholeWord => "whole_word",
            ChoiceMatching::Substring => "substring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "short_keys_whole_word" => Some(ChoiceMatching::ShortKeysWholeWord),
            "whole_word" => Some(ChoiceMatching::WholeWord),
            "substring" => Some(ChoiceMatching::Substring),
            _ => None,
        }
    }

    fn matches(&self, key: &str, reply: &Reply) -> bool {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return false;
        }
        match self {
            ChoiceMatching::Substring => reply.lower.contains(&key),
            ChoiceMatching::WholeWord => reply.has_phrase(&key),
            ChoiceMatching::ShortKeysWholeWord => {
                if key.chars().count() <= 2 {
                    reply.has_phrase(&key)
                } else {
                    reply.lower.contains(&key)
                }
            }
        }
    }
}

impl fmt::Display for ChoiceMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user reply prepared for choice comparison.
struct Reply {
    lower: String,
    words: Vec<String>,
}

impl Reply {
    fn new(query: &str) -> Self {
        let lower = query.trim().to_lowercase();
        let words = split_words(&lower);
        Self { lower, words }
    }

    /// True when `key` equals the whole reply or its words appear
    /// contiguously in the reply.
    fn has_phrase(&self, key: &str) -> bool {
        if key == self.lower {
            return true;
        }
        let key_words = split_words(key);
        if key_words.is_empty() || key_words.len() > self.words.len() {
            return false;
        }
        self.words
            .windows(key_words.len())
            .any(|window| window == key_words.as_slice())
    }
}

fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which matching path produced a [`RuleMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    /// A `next_steps` choice moved the flow to a new step.
    Transition,
    /// A flow rule gated on the current step matched by trigger.
    FlowStep,
    Standalone,
    /// A flow entry rule started a new flow.
    FlowEntry,
    /// The rule was picked outside of trigger matching (e.g. by a model).
    Selected,
}

impl MatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStage::Transition => "transition",
            MatchStage::FlowStep => "flow_step",
            MatchStage::Standalone => "standalone",
            MatchStage::FlowEntry => "flow_entry",
            MatchStage::Selected => "selected",
        }
    }
}

/// The outcome of a successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule_id: RuleId,
    pub rule_name: String,
    /// The rule's template with variables substituted.
    pub answer: String,
    pub stage: MatchStage,
    /// Flow state to persist after this turn.
    ///
    /// `None` for standalone rules (leave the stored state alone);
    /// `Some(FlowContext::Inactive)` when a flow rule ended the flow.
    pub next_flow: Option<FlowContext>,
}

impl RuleMatch {
    pub fn is_flow_match(&self) -> bool {
        self.next_flow.is_some()
    }
}

#[derive(Debug)]
enum Pattern {
    Wildcard,
    Substring(String),
    Regex(Regex),
    /// An `r:` pattern that failed to compile; never matches.
    Invalid,
}

impl Pattern {
    fn compile(raw: &str, rule_name: &str) -> Self {
        if raw == WILDCARD {
            return Pattern::Wildcard;
        }
        if let Some(expr) = raw.strip_prefix(REGEX_PREFIX) {
            return match RegexBuilder::new(expr).case_insensitive(true).build() {
                Ok(re) => Pattern::Regex(re),
                Err(e) => {
                    tracing::warn!(rule = %rule_name, pattern = %raw, "Invalid regex in rule: {}", e);
                    Pattern::Invalid
                }
            };
        }
        Pattern::Substring(raw.to_lowercase())
    }

    fn hits(&self, query: &str, lower: &str) -> bool {
        match self {
            Pattern::Wildcard => true,
            Pattern::Substring(s) => !s.is_empty() && lower.contains(s.as_str()),
            Pattern::Regex(re) => re.is_match(query),
            Pattern::Invalid => false,
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    rule: Rule,
    patterns: Vec<Pattern>,
}

impl CompiledRule {
    fn triggered_by(&self, query: &str, lower: &str) -> bool {
        self.patterns.iter().any(|p| p.hits(query, lower))
    }

    fn allowed(&self, now: DateTime<Utc>, platform: Option<&str>) -> bool {
        self.rule
            .conditions
            .as_ref()
            .map_or(true, |c| c.allows(now, platform))
    }

    fn in_flow(&self, flow_id: &str) -> bool {
        self.rule.flow_id.as_deref() == Some(flow_id)
    }

    fn answer(&self) -> String {
        render(&self.rule.response_template, &self.rule.variables)
    }
}

/// Matches queries against an immutable, priority-ordered rule set.
#[derive(Debug)]
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
    choice_matching: ChoiceMatching,
}

impl RuleMatcher {
    /// Compiles the active rules, highest priority first.
    ///
    /// Ties keep their input order. Structural flow problems are logged
    /// but never rejected.
    pub fn new(rules: Vec<Rule>, choice_matching: ChoiceMatching) -> Self {
        for issue in check_flows(&rules) {
            tracing::warn!("Rule flow issue: {}", issue);
        }

        let mut active: Vec<Rule> = rules.into_iter().filter(|r| r.is_active).collect();
        active.sort_by(|a, b| b.priority.cmp(&a.priority));

        let rules = active
            .into_iter()
            .map(|rule| {
                let patterns = rule
                    .trigger_patterns
                    .iter()
                    .map(|p| Pattern::compile(p, &rule.name))
                    .collect();
                CompiledRule { rule, patterns }
            })
            .collect();

        Self {
            rules,
            choice_matching,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn choice_matching(&self) -> ChoiceMatching {
        self.choice_matching
    }

    /// Active rules in match order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Active rules that belong to no flow.
    pub fn standalone_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules().filter(|r| !r.is_flow_rule())
    }

    /// Lower-cased plain trigger keywords of all active rules.
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .rules()
            .flat_map(|r| r.trigger_patterns.iter())
            .filter(|p| p.as_str() != WILDCARD && !p.starts_with(REGEX_PREFIX))
            .map(|p| p.to_lowercase())
            .filter(|p| !p.trim().is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        keywords
    }

    /// Matches `query` against the rules eligible for `flow` at the current time.
    pub fn match_query(
        &self,
        query: &str,
        flow: &FlowContext,
        platform: Option<&str>,
    ) -> Option<RuleMatch> {
        self.match_query_at(query, flow, platform, Utc::now())
    }

    /// Like [`match_query`](Self::match_query) with an explicit clock.
    ///
    /// With an active flow only that flow's rules are considered: a
    /// `next_steps` transition first, then rules whose `required_step` is
    /// the current step. Without one, standalone rules are tried before
    /// flow entry rules.
    pub fn match_query_at(
        &self,
        query: &str,
        flow: &FlowContext,
        platform: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<RuleMatch> {
        match flow {
            FlowContext::Active(active) => self
                .match_transition(query, active, platform, now)
                .or_else(|| self.match_flow_step(query, active, platform, now)),
            FlowContext::Inactive => self
                .match_standalone(query, platform, now)
                .or_else(|| self.match_flow_entry(query, platform, now)),
        }
    }

    /// Matches `query` against standalone rules only, ignoring flows.
    ///
    /// Used when a flow is active but none of its rules matched, so an
    /// off-script reply can still hit a standalone rule without restarting
    /// or switching flows.
    pub fn match_standalone_query(&self, query: &str, platform: Option<&str>) -> Option<RuleMatch> {
        self.match_standalone(query, platform, Utc::now())
    }

    /// Builds a match for a standalone rule chosen by id.
    pub fn select(&self, rule_id: RuleId) -> Option<RuleMatch> {
        let compiled = self
            .rules
            .iter()
            .find(|c| c.rule.id == rule_id && !c.rule.is_flow_rule())?;
        Some(RuleMatch {
            rule_id: compiled.rule.id,
            rule_name: compiled.rule.name.clone(),
            answer: compiled.answer(),
            stage: MatchStage::Selected,
            next_flow: None,
        })
    }

    fn match_standalone(
        &self,
        query: &str,
        platform: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<RuleMatch> {
        let lower = query.to_lowercase();
        let hit = self.first_hit(query, &lower, platform, now, |r| !r.is_flow_rule())?;
        Some(RuleMatch {
            rule_id: hit.rule.id,
            rule_name: hit.rule.name.clone(),
            answer: hit.answer(),
            stage: MatchStage::Standalone,
            next_flow: None,
        })
    }

    fn match_flow_entry(
        &self,
        query: &str,
        platform: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<RuleMatch> {
        let lower = query.to_lowercase();
        let hit = self.first_hit(query, &lower, platform, now, Rule::is_flow_entry)?;

        let next_flow = match (&hit.rule.flow_id, &hit.rule.step_key) {
            (Some(flow_id), Some(step)) if hit.rule.continues_flow() => {
                let mut started = ActiveFlow::new(flow_id.clone(), step.clone());
                started.data.insert(
                    "last_query".to_string(),
                    serde_json::Value::String(query.trim().to_string()),
                );
                FlowContext::Active(started)
            }
            _ => FlowContext::Inactive,
        };

        tracing::debug!(rule = %hit.rule.name, "Flow entry rule matched");
        Some(RuleMatch {
            rule_id: hit.rule.id,
            rule_name: hit.rule.name.clone(),
            answer: hit.answer(),
            stage: MatchStage::FlowEntry,
            next_flow: Some(next_flow),
        })
    }

    fn match_flow_step(
        &self,
        query: &str,
        flow: &ActiveFlow,
        platform: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<RuleMatch> {
        let lower = query.to_lowercase();
        let hit = self.first_hit(query, &lower, platform, now, |r| {
            r.flow_id.as_deref() == Some(flow.flow_id.as_str())
                && r.required_step.as_deref() == Some(flow.current_step.as_str())
        })?;
        Some(self.flow_match(hit, flow, query, MatchStage::FlowStep))
    }

    fn match_transition(
        &self,
        query: &str,
        flow: &ActiveFlow,
        platform: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<RuleMatch> {
        let reply = Reply::new(query);
        let parents = self.rules.iter().filter(|c| {
            c.in_flow(&flow.flow_id)
                && c.rule.step_key.as_deref() == Some(flow.current_step.as_str())
                && c.rule.continues_flow()
        });

        for parent in parents {
            let Some(steps) = parent.rule.next_steps.as_ref() else {
                continue;
            };
            let target = steps
                .choices()
                .find(|(key, _)| self.choice_matching.matches(key, &reply))
                .map(|(_, target)| target)
                .or_else(|| steps.wildcard());

            if let Some(target) = target {
                return match self.step_rule(flow, target) {
                    Some(next) if next.allowed(now, platform) => {
                        Some(self.flow_match(next, flow, query, MatchStage::Transition))
                    }
                    Some(next) => {
                        tracing::debug!(rule = %next.rule.name, "Transition target blocked by conditions");
                        None
                    }
                    None => {
                        tracing::warn!(
                            flow_id = %flow.flow_id,
                            step = %target,
                            "Flow transition points to a step with no rule"
                        );
                        None
                    }
                };
            }
        }
        None
    }

    /// The rule serving `step` in the active flow, preferring one that
    /// declares the current step as its prerequisite.
    fn step_rule(&self, flow: &ActiveFlow, step: &str) -> Option<&CompiledRule> {
        let mut at_step = self
            .rules
            .iter()
            .filter(|c| c.in_flow(&flow.flow_id) && c.rule.step_key.as_deref() == Some(step));
        let first = at_step.next()?;
        if first.rule.required_step.as_deref() == Some(flow.current_step.as_str()) {
            return Some(first);
        }
        at_step
            .find(|c| c.rule.required_step.as_deref() == Some(flow.current_step.as_str()))
            .or(Some(first))
    }

    fn flow_match(
        &self,
        hit: &CompiledRule,
        flow: &ActiveFlow,
        query: &str,
        stage: MatchStage,
    ) -> RuleMatch {
        let next_flow = match &hit.rule.step_key {
            Some(step) if hit.rule.continues_flow() => FlowContext::Active(flow.advance(step.clone(), query)),
            _ => FlowContext::Inactive,
        };
        tracing::debug!(
            rule = %hit.rule.name,
            flow_id = %flow.flow_id,
            from = %flow.current_step,
            stage = stage.as_str(),
            "Flow rule matched"
        );
        RuleMatch {
            rule_id: hit.rule.id,
            rule_name: hit.rule.name.clone(),
            answer: hit.answer(),
            stage,
            next_flow: Some(next_flow),
        }
    }

    fn first_hit(
        &self,
        query: &str,
        lower: &str,
        platform: Option<&str>,
        now: DateTime<Utc>,
        eligible: impl Fn(&Rule) -> bool,
    ) -> Option<&CompiledRule> {
        self.rules.iter().find(|c| {
            eligible(&c.rule) && c.allowed(now, platform) && c.triggered_by(query, lower)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::conditions::{RuleConditions, TimeWindow};
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    fn matcher(rules: Vec<Rule>) -> RuleMatcher {
        RuleMatcher::new(rules, ChoiceMatching::default())
    }

    fn two_step_flow() -> Vec<Rule> {
        vec![
            Rule::new("welcome", "Hoş geldiniz! 1) Fiyat 2) Adres")
                .with_triggers(["merhaba"])
                .in_flow("f", "start")
                .with_next_steps([("1", "price"), ("2", "address")]),
            Rule::new("price", "Fiyatlarımız 100 TL'den başlar.")
                .in_flow("f", "price")
                .requires_step("start"),
            Rule::new("address", "Adresimiz Kadıköy.")
                .in_flow("f", "address")
                .requires_step("start"),
        ]
    }

    #[test]
    fn higher_priority_wins() {
        let m = matcher(vec![
            Rule::new("low", "low answer").with_triggers(["fiyat"]).with_priority(50),
            Rule::new("high", "high answer").with_triggers(["fiyat"]).with_priority(90),
        ]);

        let hit = m.match_query_at("fiyat ne kadar", &FlowContext::Inactive, None, noon()).unwrap();
        assert_eq!(hit.answer, "high answer");
        assert_eq!(hit.stage, MatchStage::Standalone);
        assert!(hit.next_flow.is_none());
    }

    #[test]
    fn equal_priority_keeps_definition_order() {
        let m = matcher(vec![
            Rule::new("first", "1").with_triggers(["x"]),
            Rule::new("second", "2").with_triggers(["x"]),
        ]);
        let hit = m.match_query_at("x", &FlowContext::Inactive, None, noon()).unwrap();
        assert_eq!(hit.rule_name, "first");
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let m = matcher(vec![Rule::new("off", "nope").with_triggers(["*"]).inactive()]);
        assert!(m.is_empty());
        assert!(m.match_query_at("anything", &FlowContext::Inactive, None, noon()).is_none());
    }

    #[test]
    fn substring_and_regex_are_case_insensitive() {
        let m = matcher(vec![
            Rule::new("hours", "9-18").with_triggers(["Çalışma Saat"]),
            Rule::new("order", "tracking").with_triggers([r"r:ORDER\s*#?\d+"]),
        ]);
        let ctx = FlowContext::Inactive;

        assert_eq!(m.match_query_at("çalışma saatleri?", &ctx, None, noon()).unwrap().rule_name, "hours");
        assert_eq!(m.match_query_at("where is order #123", &ctx, None, noon()).unwrap().rule_name, "order");
    }

    #[test]
    fn invalid_regex_never_matches() {
        let m = matcher(vec![Rule::new("broken", "x").with_triggers(["r:(unclosed"])]);
        assert!(m.match_query_at("(unclosed", &FlowContext::Inactive, None, noon()).is_none());
    }

    #[test]
    fn failed_condition_skips_to_next_candidate() {
        let m = matcher(vec![
            Rule::new("whatsapp only", "wa")
                .with_triggers(["kampanya"])
                .with_priority(10)
                .with_conditions(RuleConditions::default().with_platforms(["whatsapp"])),
            Rule::new("generic", "all").with_triggers(["kampanya"]),
        ]);
        let ctx = FlowContext::Inactive;

        assert_eq!(m.match_query_at("kampanya", &ctx, Some("web"), noon()).unwrap().rule_name, "generic");
        assert_eq!(m.match_query_at("kampanya", &ctx, Some("WhatsApp"), noon()).unwrap().rule_name, "whatsapp only");
        assert_eq!(m.match_query_at("kampanya", &ctx, None, noon()).unwrap().rule_name, "whatsapp only");
    }

    #[test]
    fn malformed_time_window_fails_open() {
        let m = matcher(vec![Rule::new("odd", "ok")
            .with_triggers(["x"])
            .with_conditions(RuleConditions::default().with_time_window(TimeWindow::new("25:99", "nope")))]);
        assert!(m.match_query_at("x", &FlowContext::Inactive, None, noon()).is_some());
    }

    #[test]
    fn variables_are_rendered() {
        let m = matcher(vec![Rule::new("price", "Fiyat: {price} TL")
            .with_triggers(["fiyat"])
            .with_variable("price", 250)]);
        let hit = m.match_query_at("fiyat", &FlowContext::Inactive, None, noon()).unwrap();
        assert_eq!(hit.answer, "Fiyat: 250 TL");
    }

    #[test]
    fn flow_entry_starts_flow() {
        let m = matcher(two_step_flow());
        let hit = m.match_query_at("merhaba", &FlowContext::Inactive, None, noon()).unwrap();

        assert_eq!(hit.stage, MatchStage::FlowEntry);
        let next = hit.next_flow.unwrap();
        assert_eq!(next.flow_id(), Some("f"));
        assert_eq!(next.current_step(), Some("start"));
    }

    #[test]
    fn standalone_query_skips_flow_entries() {
        let mut rules = two_step_flow();
        rules.push(Rule::new("hours", "09:00-18:00").with_triggers(["saat"]));
        let m = matcher(rules);

        assert!(m.match_standalone_query("merhaba", None).is_none());
        let hit = m.match_standalone_query("saat kaçta açılıyor", None).unwrap();
        assert_eq!(hit.rule_name, "hours");
        assert_eq!(hit.stage, MatchStage::Standalone);
        assert!(hit.next_flow.is_none());
    }

    #[test]
    fn choice_moves_to_target_step_and_ends_flow() {
        let m = matcher(two_step_flow());
        let ctx = FlowContext::active("f", "start");

        let hit = m.match_query_at("1", &ctx, None, noon()).unwrap();
        assert_eq!(hit.rule_name, "price");
        assert_eq!(hit.stage, MatchStage::Transition);
        assert_eq!(hit.next_flow, Some(FlowContext::Inactive));

        let hit = m.match_query_at("2", &ctx, None, noon()).unwrap();
        assert_eq!(hit.rule_name, "address");
    }

    #[test]
    fn short_key_needs_whole_word() {
        let m = matcher(vec![
            Rule::new("menu", "A) Evet B) Hayır")
                .in_flow("f", "menu")
                .with_next_steps([("a", "yes")]),
            Rule::new("yes", "Tamam").in_flow("f", "yes").requires_step("menu"),
        ]);
        let ctx = FlowContext::active("f", "menu");

        assert!(m.match_query_at("merhaba", &ctx, None, noon()).is_none());
        assert_eq!(m.match_query_at("A", &ctx, None, noon()).unwrap().rule_name, "yes");
        assert_eq!(m.match_query_at("a şıkkı lütfen", &ctx, None, noon()).unwrap().rule_name, "yes");
    }

    #[test]
    fn long_key_strictness_is_configurable() {
        let rules = vec![
            Rule::new("confirm", "Onaylıyor musunuz?")
                .in_flow("f", "confirm")
                .with_next_steps([("evet", "done")]),
            Rule::new("done", "Kaydedildi").in_flow("f", "done").requires_step("confirm"),
        ];
        let ctx = FlowContext::active("f", "confirm");

        let lenient = RuleMatcher::new(rules.clone(), ChoiceMatching::ShortKeysWholeWord);
        assert!(lenient.match_query_at("evetttt", &ctx, None, noon()).is_some());
        assert!(lenient.match_query_at("Evet, onaylıyorum", &ctx, None, noon()).is_some());

        let strict = RuleMatcher::new(rules.clone(), ChoiceMatching::WholeWord);
        assert!(strict.match_query_at("evetttt", &ctx, None, noon()).is_none());
        assert!(strict.match_query_at("Evet, onaylıyorum", &ctx, None, noon()).is_some());

        let loose = RuleMatcher::new(rules, ChoiceMatching::Substring);
        assert!(loose.match_query_at("yes evet", &ctx, None, noon()).is_some());
    }

    #[test]
    fn wildcard_catches_unmatched_reply() {
        let m = matcher(vec![
            Rule::new("ask name", "Adınız?")
                .in_flow("f", "ask")
                .with_next_steps([("iptal", "cancel"), ("*", "thanks")]),
            Rule::new("cancel", "İptal edildi").in_flow("f", "cancel").requires_step("ask"),
            Rule::new("thanks", "Teşekkürler").in_flow("f", "thanks").requires_step("ask"),
        ]);
        let ctx = FlowContext::active("f", "ask");

        assert_eq!(m.match_query_at("Ayşe", &ctx, None, noon()).unwrap().rule_name, "thanks");
        assert_eq!(m.match_query_at("iptal", &ctx, None, noon()).unwrap().rule_name, "cancel");
    }

    #[test]
    fn continuing_step_records_selection() {
        let m = matcher(vec![
            Rule::new("size", "Boy?").in_flow("f", "size").with_next_steps([("*", "color")]),
            Rule::new("color", "Renk?")
                .in_flow("f", "color")
                .requires_step("size")
                .with_next_steps([("*", "done")]),
            Rule::new("done", "Tamam").in_flow("f", "done").requires_step("color"),
        ]);

        let hit = m.match_query_at(" L ", &FlowContext::active("f", "size"), None, noon()).unwrap();
        let FlowContext::Active(next) = hit.next_flow.unwrap() else {
            panic!("flow should continue");
        };
        assert_eq!(next.current_step, "color");
        assert_eq!(next.selections.get("size").map(String::as_str), Some("L"));
    }

    #[test]
    fn dangling_target_yields_no_match() {
        let m = matcher(vec![Rule::new("menu", "?")
            .in_flow("f", "menu")
            .with_next_steps([("1", "missing")])]);
        assert!(m.match_query_at("1", &FlowContext::active("f", "menu"), None, noon()).is_none());
    }

    #[test]
    fn step_rule_matches_by_trigger() {
        let m = matcher(vec![
            Rule::new("start", "?").in_flow("f", "start"),
            Rule::new("help", "Yardım").with_triggers(["yardım"]).in_flow("f", "help").requires_step("start"),
        ]);
        let hit = m.match_query_at("yardım lütfen", &FlowContext::active("f", "start"), None, noon()).unwrap();
        assert_eq!(hit.stage, MatchStage::FlowStep);
        assert_eq!(hit.next_flow, Some(FlowContext::Inactive));
    }

    #[test]
    fn active_flow_never_matches_standalone_rules() {
        let m = matcher(vec![
            Rule::new("global", "hi").with_triggers(["*"]),
            Rule::new("other flow", "x").with_triggers(["*"]).in_flow("g", "start"),
        ]);
        assert!(m.match_query_at("anything", &FlowContext::active("f", "start"), None, noon()).is_none());
    }

    #[test]
    fn keywords_exclude_regex_and_wildcard() {
        let m = matcher(vec![
            Rule::new("a", "").with_triggers(["Fiyat", "r:\\d+", "*"]),
            Rule::new("b", "").with_triggers(["fiyat", "adres"]),
        ]);
        assert_eq!(m.keywords(), vec!["adres".to_string(), "fiyat".to_string()]);
    }

    #[test]
    fn select_only_returns_standalone_rules() {
        let standalone = Rule::new("s", "yes");
        let flow = Rule::new("f", "no").in_flow("f", "start");
        let (sid, fid) = (standalone.id, flow.id);
        let m = matcher(vec![standalone, flow]);

        assert_eq!(m.select(sid).unwrap().stage, MatchStage::Selected);
        assert!(m.select(fid).is_none());
    }
}
