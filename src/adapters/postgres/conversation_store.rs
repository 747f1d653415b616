//! PostgreSQL conversation store.
//!
//! Implements the conversation, message and turn-recording ports. Each
//! recorded turn runs in its own transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::conversation::{
    AssistantDetails, ContactInfo, Conversation, ConversationStatus, Message, MessageEvent,
    MessageEventType, MessageRole,
};
use crate::domain::foundation::{ConversationId, EventId, MessageId, Timestamp};
use crate::ports::{
    ConversationRepository, FlowStateUpdate, MessageRepository, RepositoryError, TurnRecorder,
};

#[derive(Clone)]
pub struct PostgresConversationStore {
    pool: PgPool,
}

impl PostgresConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, RepositoryError> {
        self.pool
            .begin()
            .await
            .map_err(|e| RepositoryError::database(format!("Failed to start transaction: {}", e)))
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), RepositoryError> {
    tx.commit()
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to commit transaction: {}", e)))
}

async fn insert_message(
    tx: &mut Transaction<'_, Postgres>,
    message: &Message,
) -> Result<(), RepositoryError> {
    let details = message
        .details()
        .map(|d| serde_json::to_value(d).map_err(|e| RepositoryError::serialization(e.to_string())))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, role, content, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id().as_uuid())
    .bind(message.conversation_id().as_uuid())
    .bind(message.role().as_str())
    .bind(message.content())
    .bind(details)
    .bind(message.created_at().as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| RepositoryError::database(format!("Failed to insert message: {}", e)))?;

    Ok(())
}

async fn insert_events(
    tx: &mut Transaction<'_, Postgres>,
    events: &[MessageEvent],
) -> Result<(), RepositoryError> {
    for event in events {
        sqlx::query(
            r#"
            INSERT INTO message_events (id, message_id, event_type, data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.message_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(&event.data)
        .bind(event.created_at.as_datetime())
        .execute(&mut **tx)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to insert message event: {}", e)))?;
    }
    Ok(())
}

/// Counts one message. Fails if the conversation does not exist.
async fn bump_message_count(
    tx: &mut Transaction<'_, Postgres>,
    id: ConversationId,
    at: Timestamp,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET message_count = message_count + 1, last_message_at = $2, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(id.as_uuid())
    .bind(at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| RepositoryError::database(format!("Failed to update message count: {}", e)))?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::ConversationNotFound(id));
    }
    Ok(())
}

#[async_trait]
impl ConversationRepository for PostgresConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, platform, channel_id, contact, status, message_count,
                last_message_at, flow_state, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(conversation.id().as_uuid())
        .bind(conversation.platform())
        .bind(conversation.channel_id())
        .bind(Json(conversation.contact()))
        .bind(conversation.status().as_str())
        .bind(conversation.message_count() as i32)
        .bind(conversation.last_message_at().map(|t| *t.as_datetime()))
        .bind(conversation.flow_state())
        .bind(conversation.created_at().as_datetime())
        .bind(conversation.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to insert conversation: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, platform, channel_id, contact, status, message_count,
                   last_message_at, flow_state, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to fetch conversation: {}", e)))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn list_active(
        &self,
        platform: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform, channel_id, contact, status, message_count,
                   last_message_at, flow_state, created_at, updated_at
            FROM conversations
            WHERE status = 'active' AND ($1::TEXT IS NULL OR platform = $1)
            ORDER BY updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(platform)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to list conversations: {}", e)))?;

        rows.iter().map(row_to_conversation).collect()
    }

    async fn close(&self, id: ConversationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET status = 'closed', updated_at = NOW() WHERE id = $1 AND status = 'active'",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to close conversation: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_flow_state(&self, id: ConversationId) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query("SELECT flow_state FROM conversations WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(format!("Failed to fetch flow state: {}", e)))?
            .ok_or(RepositoryError::ConversationNotFound(id))?;

        let state: Option<Value> = row
            .try_get("flow_state")
            .map_err(|e| RepositoryError::serialization(e.to_string()))?;
        Ok(state.filter(|v| !v.is_null()))
    }

    async fn update_flow_state(
        &self,
        id: ConversationId,
        state: Option<Value>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE conversations SET flow_state = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(state.filter(|v| !v.is_null()))
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::database(format!("Failed to update flow state: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConversationNotFound(id));
        }
        Ok(())
    }

    async fn increment_message_count(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        bump_message_count(&mut tx, id, Timestamp::now()).await?;
        commit(tx).await
    }
}

#[async_trait]
impl MessageRepository for PostgresConversationStore {
    async fn add_user_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        insert_message(&mut tx, message).await?;
        commit(tx).await
    }

    async fn add_assistant_message(
        &self,
        message: &Message,
        events: &[MessageEvent],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        insert_message(&mut tx, message).await?;
        insert_events(&mut tx, events).await?;
        commit(tx).await
    }

    async fn get_recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, details, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to fetch messages: {}", e)))?;

        let mut messages = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn events_for(&self, message_id: MessageId) -> Result<Vec<MessageEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_id, event_type, data, created_at
            FROM message_events
            WHERE message_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(message_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::database(format!("Failed to fetch message events: {}", e)))?;

        rows.iter().map(row_to_event).collect()
    }
}

#[async_trait]
impl TurnRecorder for PostgresConversationStore {
    async fn record_user_turn(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        bump_message_count(&mut tx, message.conversation_id(), message.created_at()).await?;
        insert_message(&mut tx, message).await?;
        commit(tx).await
    }

    async fn record_assistant_turn(
        &self,
        message: &Message,
        events: &[MessageEvent],
        flow_state: FlowStateUpdate,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;
        bump_message_count(&mut tx, message.conversation_id(), message.created_at()).await?;
        insert_message(&mut tx, message).await?;
        insert_events(&mut tx, events).await?;

        if let FlowStateUpdate::Set(state) = flow_state {
            sqlx::query("UPDATE conversations SET flow_state = $2 WHERE id = $1")
                .bind(message.conversation_id().as_uuid())
                .bind(state.filter(|v| !v.is_null()))
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryError::database(format!("Failed to update flow state: {}", e)))?;
        }

        commit(tx).await
    }
}

// ----- Row mapping -----

fn invalid(what: &str) -> impl Fn(sqlx::Error) -> RepositoryError + '_ {
    move |e| RepositoryError::serialization(format!("Invalid {} row: {}", what, e))
}

fn row_to_conversation(row: &PgRow) -> Result<Conversation, RepositoryError> {
    let field = invalid("conversation");

    let status: String = row.try_get("status").map_err(&field)?;
    let status = ConversationStatus::parse(&status)
        .ok_or_else(|| RepositoryError::serialization(format!("Unknown conversation status: {}", status)))?;
    let contact: Json<ContactInfo> = row.try_get("contact").map_err(&field)?;
    let message_count: i32 = row.try_get("message_count").map_err(&field)?;
    let last_message_at: Option<DateTime<Utc>> = row.try_get("last_message_at").map_err(&field)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(&field)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(&field)?;
    let flow_state: Option<Value> = row.try_get("flow_state").map_err(&field)?;

    Ok(Conversation::reconstitute(
        ConversationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(&field)?),
        row.try_get("platform").map_err(&field)?,
        row.try_get("channel_id").map_err(&field)?,
        contact.0,
        status,
        u32::try_from(message_count).unwrap_or(0),
        last_message_at.map(Timestamp::from_datetime),
        flow_state.filter(|v| !v.is_null()),
        Timestamp::from_datetime(created_at),
        Timestamp::from_datetime(updated_at),
    ))
}

fn row_to_message(row: &PgRow) -> Result<Message, RepositoryError> {
    let field = invalid("message");

    let role: String = row.try_get("role").map_err(&field)?;
    let role = MessageRole::parse(&role)
        .ok_or_else(|| RepositoryError::serialization(format!("Unknown message role: {}", role)))?;
    let details: Option<Json<AssistantDetails>> = row.try_get("details").map_err(&field)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(&field)?;

    Ok(Message::reconstitute(
        MessageId::from_uuid(row.try_get::<Uuid, _>("id").map_err(&field)?),
        ConversationId::from_uuid(row.try_get::<Uuid, _>("conversation_id").map_err(&field)?),
        role,
        row.try_get("content").map_err(&field)?,
        details.map(|d| d.0),
        Timestamp::from_datetime(created_at),
    ))
}

fn row_to_event(row: &PgRow) -> Result<MessageEvent, RepositoryError> {
    let field = invalid("message event");

    let event_type: String = row.try_get("event_type").map_err(&field)?;
    let event_type = MessageEventType::parse(&event_type)
        .ok_or_else(|| RepositoryError::serialization(format!("Unknown event type: {}", event_type)))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(&field)?;

    Ok(MessageEvent {
        id: EventId::from_uuid(row.try_get::<Uuid, _>("id").map_err(&field)?),
        message_id: MessageId::from_uuid(row.try_get::<Uuid, _>("message_id").map_err(&field)?),
        event_type,
        data: row.try_get("data").map_err(&field)?,
        created_at: Timestamp::from_datetime(created_at),
    })
}
