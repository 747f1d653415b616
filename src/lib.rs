//! Queryon - decision engine for a customer-support chatbot.
//!
//! Each incoming message is routed to one of four answer strategies: a
//! deterministic rule (optionally a step of a multi-turn flow), a
//! retrieval-augmented answer from the knowledge base, a direct model answer,
//! or a model-selected tool call. Routing runs a cheap-to-expensive
//! classifier cascade and records every fallback it takes.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
