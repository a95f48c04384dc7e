//! # Inbox Agent
//!
//! A streaming agent orchestration backend for an email and calendar
//! assistant. The crate receives chat requests, routes user intent to the
//! relevant prompt fragments and tools, drives a bounded LLM reason-and-act
//! loop, and streams interleaved text, status, and widget events back to
//! the caller.
//!
//! ## Architecture
//!
//! Data flows one way through the core:
//!
//! ```text
//! request -> orchestrator -> (context + router) -> prompt
//!         -> LLM stream -> parser -> tool executor -> next iteration
//!                                 -> final text / widgets -> event sink
//! ```
//!
//! - **sink**: ordered, back-pressured event delivery; abstracts the wire
//! - **store**: per-conversation history with FIFO pruning
//! - **registry / executor**: name-keyed tools with concurrent dispatch
//! - **router**: keyword intent detection and deterministic prompt assembly
//! - **parser**: forgiving extraction of structured output from LLM text
//! - **orchestrator**: the reason-and-act loop itself
//! - **widgets**: typed UI descriptors, predefined and vdom-backed
//! - **llm**: the streaming chat seam and its OpenAI-compatible client
//! - **email / calendar / handlers**: session-scoped API providers and the
//!   per-request tool binding over them
//! - **server**: thin axum layer exposing `/chat` (SSE) and `/health`
//!
//! ## Example
//!
//! ```rust,no_run
//! use inbox_agent::{
//!     AgentConfig, ChannelSink, ChatRequest, ConversationStore, LlmClient, Orchestrator,
//!     PromptRouter, Turn,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::builder()
//!         .model("qwen2.5-32b-instruct")
//!         .llm_base_url("http://localhost:1234/v1")
//!         .build()?;
//!
//!     let model = Arc::new(LlmClient::from_config(&config)?);
//!     let store = Arc::new(ConversationStore::new(config.max_history_entries()));
//!     let router = Arc::new(PromptRouter::with_defaults());
//!     let orchestrator = Orchestrator::new(config, store, router, model);
//!
//!     let request = ChatRequest {
//!         messages: vec![Turn::user("any unread messages?")],
//!         conversation_id: None,
//!         session_info: None,
//!     };
//!
//!     let (sink, mut rx) = ChannelSink::new(64);
//!     tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!     orchestrator.process(request, &sink).await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Session-scoped calendar API client and its bitset decoders.
mod calendar;

/// Agent configuration with builder validation and env overrides.
mod config;

/// User-context prompt block (time, timezone, identity, activity).
mod context;

/// Session-scoped mail API client and message-state decoding.
mod email;

/// Error types and the stream-surfaced error codes.
mod error;

/// Tool executor: validation, concurrent dispatch, result aggregation.
mod executor;

/// Per-request tool registry binding over fresh provider objects.
mod handlers;

/// LLM provider seam: streaming chat primitive plus availability probe.
mod llm;

/// The agent orchestrator: the bounded reason-and-act loop.
mod orchestrator;

/// Forgiving parser for structured LLM output.
mod parser;

/// Tool registry: descriptors, domains, usage hints, handlers.
mod registry;

/// Prompt router: intent detection and deterministic prompt assembly.
mod router;

/// Thin HTTP layer: `/chat` SSE endpoint and `/health`.
mod server;

/// Ordered, back-pressured event sink.
mod sink;

/// In-memory conversation store with FIFO pruning.
mod store;

/// Core data model: requests, tool calls, stream events.
mod types;

/// Widget model and generation.
mod widgets;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

/// Retry utilities with exponential backoff and jitter, public so embedders
/// can reuse them for their own outbound calls.
pub mod retry;

// --- Configuration ---

pub use config::{AgentConfig, AgentConfigBuilder, CalendarEnvironment};

// --- Errors ---

pub use error::{Error, ErrorCode, Result};

// --- Core data model ---

pub use types::{
    ChatRequest, ParsedResponse, Role, SessionInfo, StreamEvent, ToolCall, ToolResult, Turn,
    WidgetAction,
};

// --- Event sink ---

pub use sink::{sse_encode, ChannelSink, EventSink};

// --- Conversation store ---

pub use store::{ConversationStore, Entry};

// --- Tool system ---

pub use executor::ToolExecutor;
pub use registry::{
    tool, ActionKind, Domain, OutputShape, ParamSpec, Tool, ToolBuilder, ToolDescriptor,
    ToolHandler, ToolRegistry, UsageHints,
};

// --- Prompt routing and context ---

pub use context::{ContextBuilder, UserIdentity};
pub use router::{CapabilityBlock, DomainBlock, PromptRouter};

// --- Parsing ---

pub use parser::{parse_response, FALLBACK_RESPONSE};

// --- LLM seam ---

pub use llm::{ChatChunk, ChatMessage, ChatModel, ChunkStream, LlmClient};

// --- Orchestration ---

pub use orchestrator::{
    is_summary_request, should_include_history, Orchestrator, RegistryFactory,
    EMPTY_RESULT_FALLBACK, ITERATION_CAP_APOLOGY,
};

// --- Widgets ---

pub use widgets::{
    from_llm, from_tool_results, next_widget_id, VdomChild, VdomNode, WidgetBlock,
    WidgetDescriptor, CUSTOM_WIDGET_TYPE, KNOWN_WIDGET_TYPES,
};

// --- Providers and handler binding ---

pub use calendar::{
    event_widget, Attendee, AttendeeAttr, Calendar, CalendarApi, CalendarAttr, CalendarEvent,
    CalendarListAttr, EventAttr, EventDraft, FreeSlot,
};
pub use email::{message_widget, EmailApi, EmailMessage, MessageState};
pub use handlers::build_registry;

// --- Server ---

pub use server::{app, AppState};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types, importable in one line with
/// `use inbox_agent::prelude::*;`.
pub mod prelude {
    pub use crate::{
        AgentConfig, ChannelSink, ChatModel, ChatRequest, ConversationStore, Domain, Error,
        EventSink, LlmClient, Orchestrator, PromptRouter, Result, StreamEvent, Tool, ToolCall,
        ToolRegistry, ToolResult, Turn, tool,
    };
}
