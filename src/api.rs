//! REST API Server for the RAG assistant
//!
//! Exposes chat sessions over HTTP for a frontend UI.
//! Named conversations live in memory only, up to a fixed count, and are
//! lost on restart. Requests without a conversation id are answered in a
//! one-shot conversation that is not kept.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::conversation::ChatSession;
use crate::error::RagError;
use crate::generation::BoundedGenerator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub conversation_id: Option<String>,
    pub question: String,
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

/// Named conversations kept in memory before the least recently used is evicted
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

struct SessionEntry {
    session: Arc<ChatSession>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct ApiState {
    pub generator: Arc<BoundedGenerator>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    max_sessions: usize,
}

impl ApiState {
    pub fn new(generator: Arc<BoundedGenerator>) -> Self {
        Self::with_max_sessions(generator, DEFAULT_MAX_SESSIONS)
    }

    pub fn with_max_sessions(generator: Arc<BoundedGenerator>, max_sessions: usize) -> Self {
        Self {
            generator,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn lookup(&self, conversation_id: Uuid) -> Option<Arc<ChatSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(&conversation_id).map(|e| Arc::clone(&e.session))
    }

    /// Fetch or register a named conversation, evicting the least recently
    /// used one when the map is full.
    async fn session(&self, conversation_id: Uuid) -> Arc<ChatSession> {
        let mut sessions = self.sessions.write().await;

        if !sessions.contains_key(&conversation_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            if let Some(evicted) = oldest {
                sessions.remove(&evicted);
                info!(conversation_id = %evicted, "Evicted idle conversation");
            }
        }

        let entry = sessions.entry(conversation_id).or_insert_with(|| SessionEntry {
            session: Arc::new(ChatSession::without_events(
                Arc::clone(&self.generator),
                conversation_id,
            )),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        Arc::clone(&entry.session)
    }
}

/// =============================
/// Conversation IDs
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

/// Client-chosen ids need not be UUIDs; anything else hashes to a stable one.
fn parse_conversation_id(value: &str) -> Option<Uuid> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(Uuid::parse_str(value).unwrap_or_else(|_| stable_uuid_from_string(value)))
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
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let question = req.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Question must not be empty".into())),
        );
    }

    // Requests without an id get a one-shot conversation that is not kept.
    let named = req.conversation_id.as_deref().and_then(parse_conversation_id);
    let session = match named {
        Some(id) => state.session(id).await,
        None => Arc::new(ChatSession::without_events(
            Arc::clone(&state.generator),
            Uuid::new_v4(),
        )),
    };
    let conversation_id = session.id().await;
    info!(
        conversation_id = %conversation_id,
        persistent = named.is_some(),
        "Received chat question"
    );

    match session.ask(question).await {
        Ok(turn) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "conversation_id": named.map(|id| id.to_string()),
                "answer": turn.answer,
                "confidence": turn.confidence,
                "status": turn.status,
                "turns": session.turns().await,
            }))),
        ),
        Err(RagError::ConversationBusy) => {
            warn!(conversation_id = %conversation_id, "Question rejected, answer still pending");
            (
                StatusCode::CONFLICT,
                Json(ApiResponse::error(
                    "Previous question is still being answered".into(),
                )),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Chat failed: {}", e))),
        ),
    }
}

/// =============================
/// Conversation Endpoint
/// =============================

async fn conversation_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let session = match parse_conversation_id(&id) {
        Some(conversation_id) => state.lookup(conversation_id).await,
        None => None,
    };

    match session {
        Some(session) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "conversation_id": session.id().await.to_string(),
                "state": session.state().await,
                "turns": session.turns().await,
            }))),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Unknown conversation: {}", id))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(generator: Arc<BoundedGenerator>) -> Router {
    create_router_with_state(ApiState::new(generator))
}

pub fn create_router_with_state(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/conversations/:id", get(conversation_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    generator: Arc<BoundedGenerator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(generator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::generation::Generator;
    use crate::index::FactIndex;
    use crate::models::Fact;
    use crate::retriever::Retriever;
    use crate::testing::{MockGenerator, SlowGenerator};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn generator_with(generator: Arc<dyn Generator>) -> Arc<BoundedGenerator> {
        let facts = vec![
            Fact { id: 0, text: "Revenue - year 2020 is: 100".to_string() },
            Fact { id: 1, text: "Revenue - year 2021 is: 120".to_string() },
        ];
        let embedder = Arc::new(HashingEmbedder::new(16));
        let index = FactIndex::build(&facts, embedder.as_ref()).await.unwrap();
        Arc::new(BoundedGenerator::new(
            Retriever::new(Arc::new(index), embedder),
            generator,
        ))
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_conversation_ids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_conversation_id(&id.to_string()), Some(id));
        assert_eq!(parse_conversation_id("chat-42"), parse_conversation_id("chat-42"));
        assert!(parse_conversation_id("chat-42").is_some());
        assert_eq!(parse_conversation_id("   "), None);
    }

    #[tokio::test]
    async fn test_anonymous_questions_are_not_kept() {
        let state = ApiState::new(generator_with(Arc::new(MockGenerator::echoing("ok"))).await);
        let router = create_router_with_state(state.clone());

        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(chat_request(serde_json::json!({ "question": "revenue?" })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = read_json(response).await;
            assert!(body["data"]["conversation_id"].is_null());
            assert_eq!(body["data"]["answer"], "Answer: ok");
        }

        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_least_recently_used_conversation_is_evicted() {
        let state = ApiState::with_max_sessions(
            generator_with(Arc::new(MockGenerator::echoing("ok"))).await,
            2,
        );
        let router = create_router_with_state(state.clone());

        for id in ["first", "second", "first", "third"] {
            let response = router
                .clone()
                .oneshot(chat_request(serde_json::json!({
                    "conversation_id": id,
                    "question": "revenue?"
                })))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(state.session_count().await, 2);

        let status_of = |id: &'static str| {
            let router = router.clone();
            async move {
                router
                    .oneshot(
                        Request::builder()
                            .uri(format!("/api/conversations/{}", id))
                            .body(Body::empty())
                            .unwrap(),
                    )
                    .await
                    .unwrap()
                    .status()
            }
        };

        assert_eq!(status_of("first").await, StatusCode::OK);
        assert_eq!(status_of("second").await, StatusCode::NOT_FOUND);
        assert_eq!(status_of("third").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router(generator_with(Arc::new(MockGenerator::echoing("x"))).await);
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_then_fetch_conversation() {
        let router = create_router(
            generator_with(Arc::new(MockGenerator::echoing("Revenue grew 20%."))).await,
        );

        let response = router
            .clone()
            .oneshot(chat_request(serde_json::json!({
                "conversation_id": "demo",
                "question": "How did revenue change?"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["data"]["answer"], "Answer: Revenue grew 20%.");
        assert_eq!(body["data"]["status"], "answered");
        assert_eq!(body["data"]["turns"].as_array().unwrap().len(), 1);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/conversations/demo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["data"]["state"], "idle");
        assert_eq!(body["data"]["turns"][0]["question"], "How did revenue change?");
    }

    #[tokio::test]
    async fn test_moderated_question_is_answered_with_rejection() {
        let router = create_router(generator_with(Arc::new(MockGenerator::echoing("x"))).await);
        let response = router
            .oneshot(chat_request(serde_json::json!({
                "question": "how do I hack the ledger"
            })))
            .await
            .unwrap();

        let body = read_json(response).await;
        assert_eq!(
            body["data"]["answer"],
            "I'm unable to process your request due to inappropriate language."
        );
        assert_eq!(body["data"]["confidence"], 0.0);
    }

    #[tokio::test]
    async fn test_empty_question_and_unknown_conversation() {
        let router = create_router(generator_with(Arc::new(MockGenerator::echoing("x"))).await);

        let response = router
            .clone()
            .oneshot(chat_request(serde_json::json!({ "question": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/conversations/nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_concurrent_question_conflicts() {
        let slow = Arc::new(SlowGenerator::new(Duration::from_millis(300), "ok"));
        let state = ApiState::new(generator_with(slow.clone()).await);
        let router = create_router_with_state(state.clone());

        let first = {
            let router = router.clone();
            tokio::spawn(async move {
                router
                    .oneshot(chat_request(serde_json::json!({
                        "conversation_id": "busy",
                        "question": "revenue?"
                    })))
                    .await
                    .unwrap()
            })
        };

        while slow.started() == 0 {
            tokio::task::yield_now().await;
        }

        let second = router
            .oneshot(chat_request(serde_json::json!({
                "conversation_id": "busy",
                "question": "profit?"
            })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        assert_eq!(first.await.unwrap().status(), StatusCode::OK);
        assert_eq!(slow.started(), 1);
    }
}
