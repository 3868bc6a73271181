//! REST API server for the trading assistant core
//!
//! Exposes chat, voice, and history endpoints to the UI layer.
//! Degraded outcomes (no data found, LLM unavailable) are 200s whose body
//! explains the situation; only invalid input and programming errors map to
//! error statuses.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::chat::{ChatService, VoiceInputMeta};
use crate::error::AssistantError;
use crate::models::ClientMeta;
use crate::sessions::HistoryOptions;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub user_email: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    pub transcript: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub user_email: Option<String>,
    pub confidence: Option<f32>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: String,
    pub session_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub include_messages: Option<bool>,
    pub message_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub user_id: String,
    pub session_id: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ChatService>,
}

/// =============================
/// Helpers — String → UUID
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Accept proper UUIDs, map any other non-empty string to a stable UUID,
/// and fall back to a seed for absent values
fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// A missing session id starts a fresh session under the canonical scheme
fn session_uuid(value: Option<&str>) -> Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => Uuid::new_v4(),
    }
}

fn error_response(e: AssistantError) -> (StatusCode, Json<ApiResponse>) {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

/// =============================
/// Handlers
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let session_id = session_uuid(req.session_id.as_deref());
    let meta = ClientMeta {
        platform: req.platform,
        user_agent: req.user_agent,
    };

    info!(%user_id, %session_id, "chat request");

    match state
        .service
        .chat(
            &req.message,
            user_id,
            session_id,
            req.user_email.as_deref().unwrap_or(""),
            &meta,
        )
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(ApiResponse::success(reply))),
        Err(e) => error_response(e),
    }
}

async fn voice_handler(
    State(state): State<ApiState>,
    Json(req): Json<VoiceRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let session_id = session_uuid(req.session_id.as_deref());
    let voice_meta = VoiceInputMeta {
        confidence: req.confidence,
        language: req.language,
    };
    let meta = ClientMeta {
        platform: req.platform,
        user_agent: req.user_agent,
    };

    info!(%user_id, %session_id, "voice request");

    match state
        .service
        .voice(
            &req.transcript,
            user_id,
            session_id,
            req.user_email.as_deref().unwrap_or(""),
            &voice_meta,
            &meta,
        )
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(ApiResponse::success(reply))),
        Err(e) => error_response(e),
    }
}

async fn history_handler(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = parse_or_stable_uuid(Some(&query.user_id), "anonymous-user");
    let opts = HistoryOptions {
        session_id: query
            .session_id
            .as_deref()
            .map(|s| parse_or_stable_uuid(Some(s), "session")),
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(10),
        include_messages: query.include_messages.unwrap_or(true),
        message_limit: query.message_limit,
    };

    match state.service.history(user_id, &opts).await {
        Ok(page) => (StatusCode::OK, Json(ApiResponse::success(page))),
        Err(e) => error_response(e),
    }
}

async fn end_session_handler(
    State(state): State<ApiState>,
    Json(req): Json<EndSessionRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = parse_or_stable_uuid(Some(&req.user_id), "anonymous-user");
    let session_id = parse_or_stable_uuid(Some(&req.session_id), "session");

    match state.service.end_session(user_id, session_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "session_id": session_id.to_string(),
                "is_active": false,
            }))),
        ),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(service: Arc<ChatService>) -> Router {
    let state = ApiState { service };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/voice", post(voice_handler))
        .route("/api/sessions", get(history_handler))
        .route("/api/sessions/end", post(end_session_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    service: Arc<ChatService>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(service);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("user-42");
        let b = stable_uuid_from_string("user-42");
        let c = stable_uuid_from_string("user-43");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn test_parse_or_stable_uuid_accepts_real_uuids() {
        let real = Uuid::new_v4();
        assert_eq!(
            parse_or_stable_uuid(Some(&real.to_string()), "seed"),
            real
        );
        // Absent and blank values both map to the seed
        assert_eq!(
            parse_or_stable_uuid(None, "seed"),
            parse_or_stable_uuid(Some("  "), "seed")
        );
    }

    #[test]
    fn test_missing_session_id_starts_fresh() {
        let a = session_uuid(None);
        let b = session_uuid(None);
        assert_ne!(a, b);

        let pinned = Uuid::new_v4();
        assert_eq!(session_uuid(Some(&pinned.to_string())), pinned);
    }
}
