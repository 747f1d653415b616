//! In-memory rule repository.
//!
//! Can be seeded from a JSON file holding an array of rules.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::RuleId;
use crate::domain::rules::Rule;
use crate::ports::{RepositoryError, RuleRepository};

#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleRepository {
    rules: Arc<RwLock<Vec<Rule>>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Reads a JSON array of rules.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RepositoryError::database(format!("cannot read {}: {}", path.display(), e))
        })?;
        let rules: Vec<Rule> = serde_json::from_str(&raw)
            .map_err(|e| RepositoryError::serialization(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_rules(rules))
    }

    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError> {
        let mut active: Vec<Rule> = self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        // Stable: equal priorities keep insertion order.
        active.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(active)
    }

    async fn save(&self, rule: &Rule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule.clone(),
            None => rules.push(rule.clone()),
        }
        Ok(())
    }

    async fn delete(&self, id: RuleId) -> Result<bool, RepositoryError> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        Ok(rules.len() < before)
    }
}
