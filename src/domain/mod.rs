//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, validation errors)
//! - `rules` - Declarative rules, multi-step flows and the rule matcher
//! - `orchestrator` - Intents, classifications, fallbacks and decision results
//! - `conversation` - Tracked conversations, messages and message events

pub mod conversation;
pub mod foundation;
pub mod orchestrator;
pub mod rules;
