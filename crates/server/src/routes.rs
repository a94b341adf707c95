//! HTTP boundary: chat, health and session reset.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use supporter_core::memory::SessionCache;
use supporter_core::runtime::{PipelineError, TurnPipeline};
use supporter_core::types::{SessionKey, StructuredReply, TurnMetadata, TurnOutcome, TurnRequest};
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;

/// Everything the handlers need once startup has finished.
pub struct Services {
    /// `None` when no completion service is configured.
    pub pipeline: Option<Arc<TurnPipeline>>,
    pub cache: Arc<dyn SessionCache>,
}

/// Shared handler state. Empty until initialisation installs the services.
#[derive(Clone, Default)]
pub struct AppState {
    services: Arc<OnceCell<Services>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install services. Later calls are ignored.
    pub fn install(&self, services: Services) {
        if self.services.set(services).is_err() {
            tracing::warn!("services already installed");
        }
    }

    fn pipeline(&self) -> Option<Arc<TurnPipeline>> {
        self.services.get().and_then(|s| s.pipeline.clone())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/api/v1/chat", post(chat))
        .route("/health", get(health))
        .route("/sessions/{user_id}/{session_id}", delete(reset_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    status: &'static str,
    response: StructuredReply,
    metadata: TurnMetadata,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    detail: String,
}

fn error(code: StatusCode, detail: impl Into<String>) -> Response {
    (code, Json(ErrorBody { status: "error", detail: detail.into() })).into_response()
}

async fn chat(State(state): State<AppState>, Json(req): Json<TurnRequest>) -> Response {
    let Some(pipeline) = state.pipeline() else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "engine not ready");
    };

    let user = req.user_id.clone();
    let session = req.session_id.clone();

    // own task: a dropped connection must not cancel the turn
    let turn = tokio::spawn(async move { pipeline.run(req).await });
    match turn.await {
        Ok(Ok(outcome)) => {
            spawn_post_turn_log(user, session, &outcome);
            (
                StatusCode::OK,
                Json(ChatResponse {
                    status: "success",
                    response: outcome.reply,
                    metadata: outcome.metadata,
                }),
            )
                .into_response()
        }
        Ok(Err(e @ PipelineError::InvalidRequest(_))) => error(StatusCode::BAD_REQUEST, e.to_string()),
        Ok(Err(e)) => {
            tracing::error!(error = %e, user = %user, session = %session, "turn failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, user = %user, session = %session, "turn task aborted");
            error(StatusCode::INTERNAL_SERVER_ERROR, "turn aborted")
        }
    }
}

/// Post-turn bookkeeping off the response path.
fn spawn_post_turn_log(user: String, session: String, outcome: &TurnOutcome) {
    let summary_preview: String = outcome.metadata.summary.chars().take(80).collect();
    let used_tools = outcome.metadata.search_results.is_some();
    let emotion = outcome.reply.emotion;
    let ai_pad = outcome.metadata.ai_pad;
    tokio::spawn(async move {
        tracing::info!(
            user = %user,
            session = %session,
            emotion = emotion.as_str(),
            pleasure = ai_pad.p,
            arousal = ai_pad.a,
            dominance = ai_pad.d,
            used_tools,
            summary = %summary_preview,
            "turn delivered"
        );
    });
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    engine_ready: bool,
    cache_connected: bool,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let engine_ready = state.pipeline().is_some();
    let cache_connected = match state.services.get() {
        Some(s) => s.cache.ping().await.is_ok(),
        None => false,
    };
    Json(Health {
        status: "ok",
        engine_ready,
        cache_connected,
    })
}

async fn reset_session(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Response {
    let Some(services) = state.services.get() else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "engine not ready");
    };
    let key = SessionKey::new(user_id, session_id);
    match services.cache.delete(&key.cache_key()).await {
        Ok(()) => {
            tracing::info!(user = %key.user_id, session = %key.session_id, "session reset");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, session = %key.session_id, "session reset failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use supporter_core::config::SupporterCfg;
    use supporter_core::memory::MemoryStores;
    use supporter_llm::provider::ScriptedProvider;
    use tower::ServiceExt;

    /// One canned answer that every stage can read.
    const ANSWER: &str = r#"{"text": "hey, good to see you", "emotion": "happy", "action": "nod", "valid": true}"#;

    fn ready_state() -> (AppState, Arc<dyn SessionCache>) {
        let cfg = SupporterCfg::default();
        let stores = MemoryStores::in_memory(cfg.embedding_dim);
        let cache = stores.cache.clone();
        let pipeline = TurnPipeline::from_provider(Arc::new(ScriptedProvider::replies([ANSWER])), stores, cfg);
        let state = AppState::new();
        state.install(Services {
            pipeline: Some(Arc::new(pipeline)),
            cache: cache.clone(),
        });
        (state, cache)
    }

    fn chat_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_is_unavailable_before_init() {
        let app = router(AppState::new());
        let resp = app
            .oneshot(chat_request("/chat", json!({"user_id": "u", "session_id": "s", "message": "hi"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(resp).await["status"], "error");
    }

    #[tokio::test]
    async fn chat_returns_reply_envelope() {
        let (state, _) = ready_state();
        let resp = router(state)
            .oneshot(chat_request(
                "/chat",
                json!({"user_id": "u", "session_id": "s", "message": "hello", "persona": "O"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["response"]["text"], "hey, good to see you");
        assert_eq!(body["response"]["emotion"], "happy");
        assert_eq!(body["response"]["action"], "nod");
        assert_eq!(body["metadata"]["persona"], "bright");
        assert!(body["metadata"]["ai_pad"]["p"].is_number());
        assert!(body["metadata"]["search_results"].is_null());
    }

    #[tokio::test]
    async fn versioned_alias_is_served() {
        let (state, _) = ready_state();
        let resp = router(state)
            .oneshot(chat_request(
                "/api/v1/chat",
                json!({"user_id": "u", "session_id": "s", "message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected() {
        let (state, _) = ready_state();
        let resp = router(state)
            .oneshot(chat_request("/chat", json!({"user_id": "", "session_id": "s", "message": "hello"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["detail"].as_str().unwrap().contains("user_id"));
    }

    #[tokio::test]
    async fn health_reports_readiness() {
        let resp = router(AppState::new())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["engine_ready"], false);
        assert_eq!(body["cache_connected"], false);

        let (state, _) = ready_state();
        let resp = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["engine_ready"], true);
        assert_eq!(body["cache_connected"], true);
    }

    #[tokio::test]
    async fn reset_deletes_the_session() {
        let (state, cache) = ready_state();
        let app = router(state);
        let resp = app
            .clone()
            .oneshot(chat_request("/chat", json!({"user_id": "u", "session_id": "s", "message": "hello"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let key = SessionKey::new("u", "s").cache_key();
        assert!(cache.get(&key).await.unwrap().is_some());

        let resp = app
            .oneshot(Request::delete("/sessions/u/s").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
