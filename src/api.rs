use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    Chapter, ChapterSummary, ChatMessage, ChatSession, CreateChatSessionRequest, InvalidateRequest,
    InvalidateResponse, RagQueryRequest, RagQueryResponse, TranslateRequest, TranslateResponse,
    TranslationSession,
};
use crate::rag::orchestrator::GeneratorState;
use crate::rag::RagOrchestrator;
use crate::store::{ChapterStore, ChatStore, TranslationSessionStore};
use crate::translation::orchestrator::TranslationOrchestrator;

pub const RAG_UNAVAILABLE_MESSAGE: &str =
    "The textbook search service is currently unavailable. Please try again later.";

type ApiError = (StatusCode, String);

pub struct AppState {
    /// `None` when the vector index could not be reached at startup.
    pub rag: Option<Arc<RagOrchestrator>>,
    pub translation: Arc<TranslationOrchestrator>,
    pub chapters: Arc<dyn ChapterStore>,
    pub chats: Arc<dyn ChatStore>,
    pub sessions: Arc<dyn TranslationSessionStore>,
}

pub fn router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/rag/query", post(rag_query_handler))
        .route("/api/v1/translation/translate", post(translate_handler))
        .route("/api/v1/translation/invalidate", post(invalidate_handler))
        .route("/api/v1/translation/sessions", get(translation_sessions_handler))
        .route("/api/v1/chapters", get(list_chapters_handler))
        .route("/api/v1/chapters/:id", get(get_chapter_handler))
        .route("/api/v1/chat/sessions", post(create_chat_session_handler))
        .route("/api/v1/chat/sessions/:id/messages", get(chat_messages_handler))
        .route("/api/health", get(health_check))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Caller identity forwarded by the upstream auth gateway.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "Authentication required".to_string()))?;

        let unverified = parts
            .headers
            .get("x-user-status")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|status| status.trim().eq_ignore_ascii_case("unverified"));
        if unverified {
            return Err((StatusCode::FORBIDDEN, "Account is not verified".to_string()));
        }

        Ok(Self { user_id: user_id.to_string() })
    }
}

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::EmptyInput | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn store_error(err: anyhow::Error) -> ApiError {
    tracing::error!("Store error: {}", err);
    api_error(Error::store(err))
}

async fn rag_query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RagQueryRequest>,
) -> Result<Json<RagQueryResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(api_error(Error::InvalidInput("query cannot be empty".to_string())));
    }

    let Some(rag) = state.rag.as_ref() else {
        return Ok(Json(RagQueryResponse {
            response: RAG_UNAVAILABLE_MESSAGE.to_string(),
            sources: Vec::new(),
            session_id: request.session_id,
        }));
    };

    let answer = rag.process_query(&request.query, request.session_id.clone()).await;
    tracing::info!("RAG query finished: {:?}", answer.outcome);

    if let Some(session_id) = request.session_id.as_deref() {
        record_chat_turn(state.chats.as_ref(), session_id, &request.query, &answer.response.response).await;
    }

    Ok(Json(answer.response))
}

/// Appends the exchange to an existing chat session. Unknown or malformed
/// session ids are ignored.
async fn record_chat_turn(chats: &dyn ChatStore, session_id: &str, query: &str, response: &str) {
    let Ok(id) = Uuid::parse_str(session_id) else {
        return;
    };

    match chats.get_chat_session(id).await {
        Ok(Some(_)) => {
            for (role, content) in [("user", query), ("assistant", response)] {
                if let Err(e) = chats.add_chat_message(id, role, content).await {
                    tracing::warn!("Failed to record {} message in chat {}: {}", role, id, e);
                }
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Chat session lookup failed for {}: {}", id, e),
    }
}

async fn translate_handler(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let response = state
        .translation
        .translate(
            &caller.user_id,
            &request.content,
            &request.chapter_id,
            &request.target_language,
        )
        .await
        .map_err(api_error)?;

    Ok(Json(response))
}

async fn invalidate_handler(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Json(request): Json<InvalidateRequest>,
) -> Json<InvalidateResponse> {
    let removed = state
        .translation
        .invalidate(&caller.user_id, &request.chapter_id, &request.content)
        .await;
    Json(InvalidateResponse { removed })
}

async fn translation_sessions_handler(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
) -> Result<Json<Vec<TranslationSession>>, ApiError> {
    let sessions = state
        .sessions
        .translation_sessions_for_user(&caller.user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(sessions))
}

async fn list_chapters_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChapterSummary>>, ApiError> {
    let chapters = state.chapters.list_chapters().await.map_err(store_error)?;
    Ok(Json(chapters.iter().map(ChapterSummary::from).collect()))
}

async fn get_chapter_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Chapter>, ApiError> {
    state
        .chapters
        .get_chapter(&id)
        .await
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| api_error(Error::NotFound(format!("chapter {}", id))))
}

async fn create_chat_session_handler(
    State(state): State<Arc<AppState>>,
    request: Option<Json<CreateChatSessionRequest>>,
) -> Result<Json<ChatSession>, ApiError> {
    let Json(request) = request.unwrap_or_default();
    let session = state
        .chats
        .create_chat_session(request.user_id)
        .await
        .map_err(store_error)?;
    Ok(Json(session))
}

async fn chat_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    if state.chats.get_chat_session(id).await.map_err(store_error)?.is_none() {
        return Err(api_error(Error::NotFound(format!("chat session {}", id))));
    }
    let messages = state.chats.chat_messages(id).await.map_err(store_error)?;
    Ok(Json(messages))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let generator = match state.rag.as_ref().map(|rag| rag.generator_state()) {
        None => "disabled".to_string(),
        Some(GeneratorState::Uninitialized) => "uninitialized".to_string(),
        Some(GeneratorState::Ready) => "ready".to_string(),
        Some(GeneratorState::Failed(message)) => format!("failed: {}", message),
    };

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "rag": state.rag.is_some(),
            "generator": generator,
            "cached_translations": state.translation.cache().len().await,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::models::NewChapter;
    use crate::rag::generation::GenerationProvider;
    use crate::rag::memory::MemoryIndex;
    use crate::rag::orchestrator::{LazyGenerator, RagOptions, NO_CONTEXT_MESSAGE};
    use crate::store::memory::MemoryStore;
    use crate::testing::{CountingTranslator, HashEmbedder, StaticGenerator, TEST_DIMENSION};
    use crate::translation::cache::TranslationCache;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
    }

    fn app_with_rag(with_rag: bool) -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let rag = with_rag.then(|| {
            Arc::new(RagOrchestrator::new(
                Arc::new(HashEmbedder),
                Arc::new(MemoryIndex::new(TEST_DIMENSION)),
                store.clone(),
                LazyGenerator::with_factory("openai", || {
                    Ok(Arc::new(StaticGenerator::new("generated answer")) as Arc<dyn GenerationProvider>)
                }),
                RagOptions::default(),
            ))
        });
        let translation = Arc::new(TranslationOrchestrator::new(
            Arc::new(TranslationCache::new(24)),
            Arc::new(CountingTranslator::default()),
            store.clone(),
        ));
        let state = Arc::new(AppState {
            rag,
            translation,
            chapters: store.clone(),
            chats: store.clone(),
            sessions: store.clone(),
        });
        TestApp {
            router: router(state, Duration::from_secs(5)),
            store,
        }
    }

    fn app() -> TestApp {
        app_with_rag(true)
    }

    fn post_json(uri: &str, body: Value, user: Option<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some((user_id, status)) = user {
            builder = builder.header("x-user-id", user_id).header("x-user-status", status);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user_id) = user {
            builder = builder.header("x-user-id", user_id);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app.router, get_request("/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["rag"], true);
        assert_eq!(body["services"]["generator"], "uninitialized");
    }

    #[tokio::test]
    async fn test_rag_query_with_empty_index() {
        let app = app();
        let (status, body) = send(
            &app.router,
            post_json("/api/v1/rag/query", json!({ "query": "What is ROS 2?", "session_id": "abc" }), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], NO_CONTEXT_MESSAGE);
        assert_eq!(body["sources"], json!([]));
        assert_eq!(body["session_id"], "abc");
    }

    #[tokio::test]
    async fn test_rag_query_without_index_is_still_ok() {
        let app = app_with_rag(false);
        let (status, body) = send(
            &app.router,
            post_json("/api/v1/rag/query", json!({ "query": "What is ROS 2?" }), None),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], RAG_UNAVAILABLE_MESSAGE);
        assert_eq!(body["session_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_blank_rag_query_rejected() {
        let app = app();
        let (status, _) = send(&app.router, post_json("/api/v1/rag/query", json!({ "query": "  " }), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rag_query_records_chat_turn() {
        let app = app();
        let session = app.store.create_chat_session(Some("u1".to_string())).await.unwrap();

        let (status, _) = send(
            &app.router,
            post_json(
                "/api/v1/rag/query",
                json!({ "query": "What is ZMP?", "session_id": session.id.to_string() }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app.router,
            get_request(&format!("/api/v1/chat/sessions/{}/messages", session.id), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let messages = body.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "What is ZMP?");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_translate_requires_identity() {
        let app = app();
        let payload = json!({ "content": "Hello world.", "chapter_id": "c1" });

        let (status, _) = send(&app.router, post_json("/api/v1/translation/translate", payload.clone(), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app.router,
            post_json("/api/v1/translation/translate", payload, Some(("u1", "unverified"))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_translate_round_trip() {
        let app = app();
        let payload = json!({ "content": "Hello world.", "chapter_id": "c1" });

        let (status, first) = send(
            &app.router,
            post_json("/api/v1/translation/translate", payload.clone(), Some(("u1", "verified"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["is_cached"], false);
        assert_eq!(first["translated_content"], "[ur] Hello world.");

        let (_, second) = send(
            &app.router,
            post_json("/api/v1/translation/translate", payload, Some(("u1", "verified"))),
        )
        .await;
        assert_eq!(second["is_cached"], true);
        assert_eq!(second["translated_content"], first["translated_content"]);

        let (status, sessions) = send(&app.router, get_request("/api/v1/translation/sessions", Some("u1"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sessions.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_translate_blank_content_is_bad_request() {
        let app = app();
        let (status, _) = send(
            &app.router,
            post_json(
                "/api/v1/translation/translate",
                json!({ "content": " ", "chapter_id": "c1" }),
                Some(("u1", "verified")),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.translation_session_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let app = app();
        let payload = json!({ "content": "Hello world.", "chapter_id": "c1" });
        send(
            &app.router,
            post_json("/api/v1/translation/translate", payload.clone(), Some(("u1", "verified"))),
        )
        .await;

        let (status, body) = send(
            &app.router,
            post_json("/api/v1/translation/invalidate", payload.clone(), Some(("u1", "verified"))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], true);

        let (_, body) = send(
            &app.router,
            post_json("/api/v1/translation/invalidate", payload, Some(("u1", "verified"))),
        )
        .await;
        assert_eq!(body["removed"], false);
    }

    #[tokio::test]
    async fn test_chapters() {
        let app = app();
        let chapter = app
            .store
            .upsert_chapter(NewChapter {
                title: "Introduction to Physical AI".to_string(),
                content: "Physical AI couples perception with action.".to_string(),
                order: 1,
            })
            .await
            .unwrap();

        let (status, body) = send(&app.router, get_request("/api/v1/chapters", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "Introduction to Physical AI");
        assert_eq!(body[0]["word_count"], 6);

        let (status, body) = send(&app.router, get_request(&format!("/api/v1/chapters/{}", chapter.id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "Physical AI couples perception with action.");

        let (status, _) = send(&app.router, get_request(&format!("/api/v1/chapters/{}", Uuid::new_v4()), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chat_sessions() {
        let app = app();
        let (status, session) = send(&app.router, post_json("/api/v1/chat/sessions", json!({}), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["user_id"], Value::Null);

        let id = session["id"].as_str().unwrap();
        let (status, messages) = send(&app.router, get_request(&format!("/api/v1/chat/sessions/{}/messages", id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages, json!([]));

        let (status, _) = send(
            &app.router,
            get_request(&format!("/api/v1/chat/sessions/{}/messages", Uuid::new_v4()), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
