//! Rule repository port.
//!
//! Rules are authored elsewhere; the engine only needs an active snapshot
//! when it is built or reloaded.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::foundation::RuleId;
use crate::domain::rules::Rule;

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Snapshot of active rules, highest priority first.
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError>;

    /// Insert or replace a rule.
    async fn save(&self, rule: &Rule) -> Result<(), RepositoryError>;

    /// Delete a rule. Returns false if it did not exist.
    async fn delete(&self, id: RuleId) -> Result<bool, RepositoryError>;
}
