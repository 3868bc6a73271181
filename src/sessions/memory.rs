//! In-memory session store
//!
//! Backs tests and keyless demo runs. The single write lock around the map
//! makes each append-turn atomic, which is the same guarantee the durable
//! backend gets from its upsert.

use super::{HistoryOptions, HistoryPage, SessionSnapshot, SessionStore};
use crate::models::{ChatSession, ClientMeta, Message};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<(Uuid, Uuid), ChatSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append_turn(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        user_email: &str,
        user_msg: Message,
        assistant_msg: Message,
        meta: &ClientMeta,
    ) -> Result<SessionSnapshot> {
        let mut sessions = self.sessions.write().await;

        let session = sessions
            .entry((user_id, session_id))
            .or_insert_with(|| ChatSession::new(user_id, session_id, user_email, meta));

        session.append(user_msg);
        session.append(assistant_msg);
        if let Some(user_agent) = &meta.user_agent {
            session.metadata.user_agent = Some(user_agent.clone());
        }

        Ok(SessionSnapshot {
            session_id,
            total_messages: session.metadata.total_messages,
            last_active_at: session.metadata.last_active_at,
            is_active: session.metadata.is_active,
        })
    }

    async fn get_history(&self, user_id: Uuid, opts: &HistoryOptions) -> Result<HistoryPage> {
        let sessions = self.sessions.read().await;

        let mut matching: Vec<&ChatSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| opts.session_id.map_or(true, |id| s.session_id == id))
            .collect();

        matching.sort_by(|a, b| b.metadata.last_active_at.cmp(&a.metadata.last_active_at));

        let total = matching.len() as u64;
        let page = opts.page.max(1);
        let offset = ((page - 1) * opts.limit) as usize;

        let page_sessions: Vec<ChatSession> = matching
            .into_iter()
            .skip(offset)
            .take(opts.limit as usize)
            .map(|s| {
                let mut session = s.clone();
                if !opts.include_messages {
                    session.messages.clear();
                } else if let Some(limit) = opts.message_limit {
                    let len = session.messages.len();
                    if len > limit {
                        session.messages.drain(..len - limit);
                    }
                }
                session
            })
            .collect();

        Ok(HistoryPage {
            sessions: page_sessions,
            page,
            limit: opts.limit,
            total,
        })
    }

    async fn end_session(&self, user_id: Uuid, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get_mut(&(user_id, session_id)) {
            session.metadata.is_active = false;
            if session.metadata.ended_at.is_none() {
                session.metadata.ended_at = Some(Utc::now());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;

    fn turn(n: usize) -> (Message, Message) {
        (
            Message::user(format!("question {}", n), MessageKind::Text),
            Message::assistant(format!("answer {}", n), MessageKind::Text),
        )
    }

    #[tokio::test]
    async fn test_append_creates_session_on_first_turn() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let (u, a) = turn(0);

        let snapshot = store
            .append_turn(user, session, "trader@example.com", u, a, &ClientMeta::default())
            .await
            .unwrap();

        assert_eq!(snapshot.total_messages, 2);
        assert!(snapshot.is_active);
    }

    #[tokio::test]
    async fn test_concurrent_appends_both_land() {
        let store = Arc::new(InMemorySessionStore::new());
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        let (u1, a1) = turn(1);
        let (u2, a2) = turn(2);
        let meta = ClientMeta::default();

        let (r1, r2) = tokio::join!(
            store.append_turn(user, session, "t@example.com", u1, a1, &meta),
            store.append_turn(user, session, "t@example.com", u2, a2, &meta),
        );
        r1.unwrap();
        r2.unwrap();

        let history = store
            .get_history(user, &HistoryOptions::default())
            .await
            .unwrap();
        assert_eq!(history.sessions.len(), 1);
        assert_eq!(history.sessions[0].messages.len(), 4);
        assert_eq!(history.sessions[0].metadata.total_messages, 4);
    }

    #[tokio::test]
    async fn test_round_trip_is_chronological() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let meta = ClientMeta::default();

        for n in 0..5 {
            let (u, a) = turn(n);
            store
                .append_turn(user, session, "t@example.com", u, a, &meta)
                .await
                .unwrap();
        }

        let opts = HistoryOptions {
            session_id: Some(session),
            ..Default::default()
        };
        let history = store.get_history(user, &opts).await.unwrap();

        let messages = &history.sessions[0].messages;
        assert_eq!(messages.len(), 10);
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(messages[0].text.contains("question 0"));
        assert!(messages[9].text.contains("answer 4"));
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let (u, a) = turn(0);

        store
            .append_turn(user, session, "t@example.com", u, a, &ClientMeta::default())
            .await
            .unwrap();

        store.end_session(user, session).await.unwrap();
        store.end_session(user, session).await.unwrap();

        let history = store
            .get_history(user, &HistoryOptions::default())
            .await
            .unwrap();
        assert!(!history.sessions[0].metadata.is_active);
        assert!(history.sessions[0].metadata.ended_at.is_some());

        // Unknown session is also a successful no-op
        store.end_session(user, Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn test_history_sorted_and_paginated() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let meta = ClientMeta::default();

        let mut session_ids = Vec::new();
        for n in 0..3 {
            let session = Uuid::new_v4();
            session_ids.push(session);
            let (u, a) = turn(n);
            store
                .append_turn(user, session, "t@example.com", u, a, &meta)
                .await
                .unwrap();
        }

        let opts = HistoryOptions {
            limit: 2,
            ..Default::default()
        };
        let first_page = store.get_history(user, &opts).await.unwrap();
        assert_eq!(first_page.total, 3);
        assert_eq!(first_page.sessions.len(), 2);
        // Most recently active first
        assert_eq!(first_page.sessions[0].session_id, session_ids[2]);

        let second_page = store
            .get_history(
                user,
                &HistoryOptions {
                    page: 2,
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second_page.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_message_truncation_options() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let meta = ClientMeta::default();

        for n in 0..4 {
            let (u, a) = turn(n);
            store
                .append_turn(user, session, "t@example.com", u, a, &meta)
                .await
                .unwrap();
        }

        let truncated = store
            .get_history(
                user,
                &HistoryOptions {
                    message_limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let messages = &truncated.sessions[0].messages;
        assert_eq!(messages.len(), 2);
        // The most recent two survive
        assert!(messages[1].text.contains("answer 3"));
        // Count metadata still reflects the full log
        assert_eq!(truncated.sessions[0].metadata.total_messages, 8);

        let headers_only = store
            .get_history(
                user,
                &HistoryOptions {
                    include_messages: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(headers_only.sessions[0].messages.is_empty());
    }
}
