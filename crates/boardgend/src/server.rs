//! HTTP surface: one POST endpoint streaming run evidence over SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use boardgen_agent::collaborators::{AdaptiveGuardrails, CompileValidate};
use boardgen_agent::{
    AnthropicModel, DesignRequest, EventEmitter, HttpAdaptiveGuardrails, HttpCompileValidate,
    MemorySessionStore, NoAdaptiveGuardrails, OfflineCompileValidate, Orchestrator, RunRegistry,
    UnavailableEditEngine, API_KEY_VAR,
};
use boardgen_core::RuntimeConfig;

/// Shared daemon state.
pub struct AppState {
    orchestrator: Option<Arc<Orchestrator>>,
}

impl AppState {
    /// Wire the orchestrator from the environment. Without an API key
    /// the endpoint answers 500 until one is provided.
    pub fn from_env() -> Self {
        let Some(model) = AnthropicModel::from_env() else {
            tracing::warn!(var = API_KEY_VAR, "api key absent, requests will be rejected");
            return Self { orchestrator: None };
        };
        let model = Arc::new(model);
        let validator: Arc<dyn CompileValidate> = match HttpCompileValidate::from_env() {
            Some(validator) => Arc::new(validator),
            None => Arc::new(OfflineCompileValidate),
        };
        let guardrails: Arc<dyn AdaptiveGuardrails> = match HttpAdaptiveGuardrails::from_env() {
            Some(guardrails) => Arc::new(guardrails),
            None => Arc::new(NoAdaptiveGuardrails),
        };
        let orchestrator = Orchestrator::new(
            RuntimeConfig::global().clone(),
            Arc::new(MemorySessionStore::new()),
            Arc::new(RunRegistry::new()),
            model.clone(),
            validator,
            Arc::new(UnavailableEditEngine),
            model,
            guardrails,
        );
        Self {
            orchestrator: Some(Arc::new(orchestrator)),
        }
    }

    /// Test/bench constructor with a prebuilt orchestrator.
    pub fn with_orchestrator(orchestrator: Option<Arc<Orchestrator>>) -> Self {
        Self { orchestrator }
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/design", post(design))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn design(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };
    if !payload.get("prompt").map(|p| p.is_string()).unwrap_or(false) {
        return (
            StatusCode::BAD_REQUEST,
            "request must carry a string \"prompt\"",
        )
            .into_response();
    }
    let request: DesignRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", err)).into_response();
        }
    };

    let Some(orchestrator) = state.orchestrator.clone() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{} is not set", API_KEY_VAR),
        )
            .into_response();
    };

    let (emitter, rx) = EventEmitter::channel();
    tokio::spawn(async move {
        orchestrator.run(request, emitter).await;
    });

    let mut response = Sse::new(event_stream(rx)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}

fn event_stream(
    rx: tokio::sync::mpsc::Receiver<boardgen_core::AgentEvent>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.to_string());
        Ok(Event::default().data(data))
    })
}
