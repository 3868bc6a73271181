//! Conversation session storage
//!
//! One persistence interface with two interchangeable backends: an in-memory
//! map for tests and ephemeral demos, and Postgres for production. Both
//! implement the same atomic append-turn semantics; the backend is selected
//! from the environment at startup.

pub mod memory;
pub mod postgres;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

use crate::models::{ChatSession, ClientMeta, Message};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What a caller gets back from an append: enough to confirm the turn landed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub total_messages: u32,
    pub last_active_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct HistoryOptions {
    pub session_id: Option<Uuid>,
    pub page: u32,
    pub limit: u32,
    pub include_messages: bool,
    /// Truncate each session's messages to the most recent N
    pub message_limit: Option<usize>,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            session_id: None,
            page: 1,
            limit: 10,
            include_messages: true,
            message_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub sessions: Vec<ChatSession>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Durable append-only log of turns per (user, session)
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Atomic upsert: create the session on first touch, append the user and
    /// assistant messages as one logical operation, bump activity metadata.
    /// Creation-only fields (started_at, platform) are never reset by later
    /// calls. Concurrent calls for the same key must both land.
    async fn append_turn(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        user_email: &str,
        user_msg: Message,
        assistant_msg: Message,
        meta: &ClientMeta,
    ) -> Result<SessionSnapshot>;

    /// Paginated sessions sorted by last_active_at descending
    async fn get_history(&self, user_id: Uuid, opts: &HistoryOptions) -> Result<HistoryPage>;

    /// Flip is_active off and stamp ended_at. Idempotent: repeated calls,
    /// and calls for unknown sessions, still succeed.
    async fn end_session(&self, user_id: Uuid, session_id: Uuid) -> Result<()>;
}

/// Pick the backend from the environment, preferring Postgres when a
/// database URL is configured and falling back to in-memory otherwise.
pub fn build_store() -> Arc<dyn SessionStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match PgSessionStore::connect_lazy(&url) {
            Ok(store) => {
                info!("Session store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres session store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Session store backend: in-memory");
    Arc::new(InMemorySessionStore::new())
}
