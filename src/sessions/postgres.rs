//! Postgres session store
//!
//! The durable backend. The append path is a single transaction around an
//! INSERT .. ON CONFLICT upsert plus two message rows, so concurrent turns
//! for the same (user, session) both land and creation-only fields survive
//! repeated calls.

use super::{HistoryOptions, HistoryPage, SessionSnapshot, SessionStore};
use crate::error::AssistantError;
use crate::models::{
    ChatSession, ClientMeta, Message, MessageKind, MessageSender, SessionMetadata, VoiceMetadata,
};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

pub struct PgSessionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| AssistantError::DatabaseError(format!("Failed to create pool: {}", e)))?;
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_sessions (
                      user_id UUID NOT NULL,
                      session_id UUID NOT NULL,
                      user_email TEXT NOT NULL DEFAULT '',
                      started_at TIMESTAMPTZ NOT NULL,
                      last_active_at TIMESTAMPTZ NOT NULL,
                      total_messages INTEGER NOT NULL DEFAULT 0,
                      is_active BOOLEAN NOT NULL DEFAULT TRUE,
                      ended_at TIMESTAMPTZ,
                      platform TEXT,
                      user_agent TEXT,
                      PRIMARY KEY (user_id, session_id)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_messages (
                      message_id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      session_id UUID NOT NULL,
                      sender TEXT NOT NULL,
                      kind TEXT NOT NULL,
                      content TEXT NOT NULL,
                      stock_data JSONB,
                      additional_data JSONB,
                      voice_metadata JSONB,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_chat_messages_scope_time
                    ON chat_messages (user_id, session_id, created_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!("Failed to initialize session schema: {}", e))
            })?;

        Ok(())
    }

    fn sender_to_db(sender: MessageSender) -> &'static str {
        match sender {
            MessageSender::User => "user",
            MessageSender::Assistant => "assistant",
        }
    }

    fn sender_from_db(sender: &str) -> MessageSender {
        match sender {
            "assistant" => MessageSender::Assistant,
            _ => MessageSender::User,
        }
    }

    fn kind_to_db(kind: MessageKind) -> &'static str {
        match kind {
            MessageKind::Text => "text",
            MessageKind::VoiceInput => "voice_input",
            MessageKind::VoiceResponse => "voice_response",
        }
    }

    fn kind_from_db(kind: &str) -> MessageKind {
        match kind {
            "voice_input" => MessageKind::VoiceInput,
            "voice_response" => MessageKind::VoiceResponse,
            _ => MessageKind::Text,
        }
    }

    async fn insert_message(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: Uuid,
        session_id: Uuid,
        msg: &Message,
    ) -> std::result::Result<(), sqlx::Error> {
        let message_id = Uuid::parse_str(&msg.id).unwrap_or_else(|_| Uuid::new_v4());
        let stock_data = msg
            .stock_data
            .as_ref()
            .and_then(|q| serde_json::to_value(q).ok());
        let voice_metadata = msg
            .voice_metadata
            .as_ref()
            .and_then(|v| serde_json::to_value(v).ok());

        sqlx::query(
            r#"
            INSERT INTO chat_messages
              (message_id, user_id, session_id, sender, kind, content,
               stock_data, additional_data, voice_metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(session_id)
        .bind(Self::sender_to_db(msg.sender))
        .bind(Self::kind_to_db(msg.kind))
        .bind(&msg.text)
        .bind(stock_data)
        .bind(&msg.additional_data)
        .bind(voice_metadata)
        .bind(msg.timestamp)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> Message {
        let sender: String = row.try_get("sender").unwrap_or_else(|_| "user".to_string());
        let kind: String = row.try_get("kind").unwrap_or_else(|_| "text".to_string());

        let stock_data = row
            .try_get::<Option<serde_json::Value>, _>("stock_data")
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value(v).ok());
        let voice_metadata = row
            .try_get::<Option<serde_json::Value>, _>("voice_metadata")
            .ok()
            .flatten()
            .and_then(|v| serde_json::from_value::<VoiceMetadata>(v).ok());

        Message {
            id: row
                .try_get::<Uuid, _>("message_id")
                .map(|u| u.to_string())
                .unwrap_or_else(|_| Uuid::new_v4().to_string()),
            text: row.try_get("content").unwrap_or_default(),
            sender: Self::sender_from_db(&sender),
            kind: Self::kind_from_db(&kind),
            timestamp: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
            stock_data,
            additional_data: row
                .try_get::<Option<serde_json::Value>, _>("additional_data")
                .ok()
                .flatten(),
            voice_metadata,
        }
    }

    async fn load_messages(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        message_limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let rows = match message_limit {
            Some(limit) => {
                sqlx::query(
                    r#"
                    SELECT * FROM (
                      SELECT message_id, sender, kind, content, stock_data,
                             additional_data, voice_metadata, created_at
                      FROM chat_messages
                      WHERE user_id = $1 AND session_id = $2
                      ORDER BY created_at DESC
                      LIMIT $3
                    ) recent
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(user_id)
                .bind(session_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT message_id, sender, kind, content, stock_data,
                           additional_data, voice_metadata, created_at
                    FROM chat_messages
                    WHERE user_id = $1 AND session_id = $2
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(user_id)
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AssistantError::DatabaseError(format!("Failed to load messages: {}", e)))?;

        Ok(rows.iter().map(Self::message_from_row).collect())
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn append_turn(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        user_email: &str,
        user_msg: Message,
        assistant_msg: Message,
        meta: &ClientMeta,
    ) -> Result<SessionSnapshot> {
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AssistantError::DatabaseError(format!("Failed to begin append transaction: {}", e))
        })?;

        // started_at and platform are set only by the INSERT arm; the
        // conflict arm never touches them
        let row = sqlx::query(
            r#"
            INSERT INTO chat_sessions
              (user_id, session_id, user_email, started_at, last_active_at,
               total_messages, is_active, platform, user_agent)
            VALUES ($1, $2, $3, NOW(), NOW(), 2, TRUE, $4, $5)
            ON CONFLICT (user_id, session_id) DO UPDATE
            SET last_active_at = NOW(),
                total_messages = chat_sessions.total_messages + 2,
                user_agent = COALESCE(EXCLUDED.user_agent, chat_sessions.user_agent)
            RETURNING total_messages, last_active_at, is_active
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(user_email)
        .bind(&meta.platform)
        .bind(&meta.user_agent)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AssistantError::DatabaseError(format!("Failed to upsert session: {}", e)))?;

        self.insert_message(&mut tx, user_id, session_id, &user_msg)
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!("Failed to insert user message: {}", e))
            })?;
        self.insert_message(&mut tx, user_id, session_id, &assistant_msg)
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!("Failed to insert assistant message: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AssistantError::DatabaseError(format!("Failed to commit append transaction: {}", e))
        })?;

        let total_messages: i32 = row.try_get("total_messages").unwrap_or(0);
        Ok(SessionSnapshot {
            session_id,
            total_messages: total_messages.max(0) as u32,
            last_active_at: row.try_get("last_active_at").unwrap_or_else(|_| Utc::now()),
            is_active: row.try_get("is_active").unwrap_or(true),
        })
    }

    async fn get_history(&self, user_id: Uuid, opts: &HistoryOptions) -> Result<HistoryPage> {
        self.ensure_schema().await?;

        let page = opts.page.max(1);
        let offset = ((page - 1) * opts.limit) as i64;

        let total: i64 = match opts.session_id {
            Some(session_id) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM chat_sessions WHERE user_id = $1 AND session_id = $2",
                )
                .bind(user_id)
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM chat_sessions WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| AssistantError::DatabaseError(format!("Failed to count sessions: {}", e)))?;

        let rows = match opts.session_id {
            Some(session_id) => {
                sqlx::query(
                    r#"
                    SELECT user_id, session_id, user_email, started_at, last_active_at,
                           total_messages, is_active, ended_at, platform, user_agent
                    FROM chat_sessions
                    WHERE user_id = $1 AND session_id = $2
                    ORDER BY last_active_at DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(user_id)
                .bind(session_id)
                .bind(opts.limit as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT user_id, session_id, user_email, started_at, last_active_at,
                           total_messages, is_active, ended_at, platform, user_agent
                    FROM chat_sessions
                    WHERE user_id = $1
                    ORDER BY last_active_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(user_id)
                .bind(opts.limit as i64)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| AssistantError::DatabaseError(format!("Failed to load sessions: {}", e)))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_id: Uuid = row
                .try_get("session_id")
                .map_err(|e| AssistantError::DatabaseError(format!("Bad session row: {}", e)))?;
            let total_messages: i32 = row.try_get("total_messages").unwrap_or(0);

            let messages = if opts.include_messages {
                self.load_messages(user_id, session_id, opts.message_limit)
                    .await?
            } else {
                Vec::new()
            };

            sessions.push(ChatSession {
                user_id,
                session_id,
                user_email: row.try_get("user_email").unwrap_or_default(),
                messages,
                metadata: SessionMetadata {
                    started_at: row.try_get("started_at").unwrap_or_else(|_| Utc::now()),
                    last_active_at: row.try_get("last_active_at").unwrap_or_else(|_| Utc::now()),
                    total_messages: total_messages.max(0) as u32,
                    is_active: row.try_get("is_active").unwrap_or(true),
                    ended_at: row.try_get::<Option<DateTime<Utc>>, _>("ended_at").ok().flatten(),
                    platform: row.try_get::<Option<String>, _>("platform").ok().flatten(),
                    user_agent: row.try_get::<Option<String>, _>("user_agent").ok().flatten(),
                },
            });
        }

        Ok(HistoryPage {
            sessions,
            page,
            limit: opts.limit,
            total: total.max(0) as u64,
        })
    }

    async fn end_session(&self, user_id: Uuid, session_id: Uuid) -> Result<()> {
        self.ensure_schema().await?;

        // Idempotent: a second call matches zero active rows and still succeeds
        sqlx::query(
            r#"
            UPDATE chat_sessions
            SET is_active = FALSE,
                ended_at = COALESCE(chat_sessions.ended_at, NOW())
            WHERE user_id = $1 AND session_id = $2
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AssistantError::DatabaseError(format!("Failed to end session: {}", e)))?;

        Ok(())
    }
}
