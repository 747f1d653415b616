//! PostgreSQL implementation of RuleRepository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

use crate::domain::foundation::RuleId;
use crate::domain::rules::{NextSteps, Rule, RuleConditions};
use crate::ports::{RepositoryError, RuleRepository};

#[derive(Clone)]
pub struct PostgresRuleRepository {
    pool: PgPool,
}

impl PostgresRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for PostgresRuleRepository {
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, trigger_patterns, response_template, variables,
                   priority, is_active, conditions, flow_id, step_key, required_step, next_steps
            FROM orchestrator_rules
            WHERE is_active = TRUE
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to fetch rules: {}", e)))?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn save(&self, rule: &Rule) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO orchestrator_rules (
                id, name, description, trigger_patterns, response_template, variables,
                priority, is_active, conditions, flow_id, step_key, required_step, next_steps
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                trigger_patterns = EXCLUDED.trigger_patterns,
                response_template = EXCLUDED.response_template,
                variables = EXCLUDED.variables,
                priority = EXCLUDED.priority,
                is_active = EXCLUDED.is_active,
                conditions = EXCLUDED.conditions,
                flow_id = EXCLUDED.flow_id,
                step_key = EXCLUDED.step_key,
                required_step = EXCLUDED.required_step,
                next_steps = EXCLUDED.next_steps,
                updated_at = NOW()
            "#,
        )
        .bind(rule.id.as_uuid())
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(Json(&rule.trigger_patterns))
        .bind(&rule.response_template)
        .bind(Json(&rule.variables))
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.conditions.as_ref().map(Json))
        .bind(&rule.flow_id)
        .bind(&rule.step_key)
        .bind(&rule.required_step)
        .bind(rule.next_steps.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to save rule: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, id: RuleId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM orchestrator_rules WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(format!("Failed to delete rule: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_rule(row: &PgRow) -> Result<Rule, RepositoryError> {
    let field = |e: sqlx::Error| RepositoryError::serialization(format!("Invalid rule row: {}", e));

    let trigger_patterns: Json<Vec<String>> = row.try_get("trigger_patterns").map_err(field)?;
    let variables: Json<BTreeMap<String, serde_json::Value>> =
        row.try_get("variables").map_err(field)?;
    let conditions: Option<Json<RuleConditions>> = row.try_get("conditions").map_err(field)?;
    let next_steps: Option<Json<NextSteps>> = row.try_get("next_steps").map_err(field)?;

    Ok(Rule {
        id: RuleId::from_uuid(row.try_get("id").map_err(field)?),
        name: row.try_get("name").map_err(field)?,
        description: row.try_get("description").map_err(field)?,
        trigger_patterns: trigger_patterns.0,
        response_template: row.try_get("response_template").map_err(field)?,
        variables: variables.0,
        priority: row.try_get("priority").map_err(field)?,
        is_active: row.try_get("is_active").map_err(field)?,
        conditions: conditions.map(|c| c.0),
        flow_id: row.try_get("flow_id").map_err(field)?,
        step_key: row.try_get("step_key").map_err(field)?,
        required_step: row.try_get("required_step").map_err(field)?,
        next_steps: next_steps.map(|n| n.0),
    })
}
