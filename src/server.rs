//! Thin HTTP layer: `POST /chat` (SSE) and `GET /health`.
//!
//! Peripheral by design; all agent behavior lives in the orchestrator. The
//! handler spawns the orchestration task, bridges its [`ChannelSink`] into
//! the SSE response body, and gets out of the way. A dropped response body
//! (client disconnect) closes the sink and the task's remaining writes
//! become no-ops.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AgentConfig;
use crate::handlers;
use crate::llm::ChatModel;
use crate::orchestrator::Orchestrator;
use crate::sink::{ChannelSink, EventSink};
use crate::types::{ChatRequest, StreamEvent};

/// Scripted reply used when the mock bypass is enabled.
const MOCK_REPLY: &str =
    "This is the scripted demo agent. Connect a language model to get real answers.";

/// Shared server state.
pub struct AppState {
    /// The configured orchestrator
    pub orchestrator: Arc<Orchestrator>,

    /// The model handle, probed by /health
    pub model: Arc<dyn ChatModel>,

    /// Agent configuration
    pub config: AgentConfig,
}

/// Builds the router with both endpoints and permissive CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(cors)
        .with_state(Arc::new(state))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, rx) = ChannelSink::new(64);

    if state.config.use_mock_agent() {
        tokio::spawn(async move {
            mock_turn(&sink).await;
        });
    } else {
        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.process(request, &sink).await;
        });
    }

    let stream = ReceiverStream::new(rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Scripted turn for demos: status, word-streamed text, done.
async fn mock_turn(sink: &ChannelSink) {
    sink.emit(StreamEvent::Status {
        status: "Thinking...".to_string(),
    })
    .await;
    for word in MOCK_REPLY.split_inclusive(' ') {
        sink.emit(StreamEvent::TextDelta {
            content: word.to_string(),
        })
        .await;
    }
    sink.emit(StreamEvent::Done).await;
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let llm_available = state.model.is_available().await;
    let tools = handlers::build_registry(&state.config, None).all_names();

    Json(json!({
        "status": "ok",
        "llmAvailable": llm_available,
        "tools": tools,
    }))
}
