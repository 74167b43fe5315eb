//! REST API server for the intent router
//!
//! Exposes the dispatcher over HTTP for chat frontends

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::dispatcher::Dispatcher;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageRequest {
    pub message: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub messages: Vec<ChatMessage>,
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
    pub dispatcher: Arc<Dispatcher>,
}

/// =============================
/// Helpers
/// =============================

/// Deterministic UUID for non-UUID user handles (e.g. "priya@upi")
pub fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Missing or blank ids map to the default (nil) user
pub fn resolve_user_id(value: Option<&str>) -> Uuid {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v)),
        _ => Uuid::nil(),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Message Endpoint
/// =============================

async fn message_handler(
    State(state): State<ApiState>,
    Json(req): Json<MessageRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = resolve_user_id(req.user_id.as_deref());
    info!(user_id = %user_id, len = req.message.len(), "Received chat message");

    let final_state = state.dispatcher.run(user_id, &req.message).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "response": final_state,
        }))),
    )
}

/// =============================
/// Chat Transcript Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    // Only the latest user turn is classified.
    let Some(user_msg) = req.messages.iter().rev().find(|m| m.role == "user") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        );
    };

    let forwarded = MessageRequest {
        message: user_msg.content.clone(),
        user_id: req.user_id,
    };

    message_handler(State(state), Json(forwarded)).await
}

/// =============================
/// Router
/// =============================

pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = ApiState { dispatcher };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/chat", post(message_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    dispatcher: Arc<Dispatcher>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(dispatcher);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
