//! Core data model for requests, tool calls, and stream events.
//!
//! The type system separates three surfaces:
//!
//! 1. **Inbound**: [`ChatRequest`] with its ordered [`Turn`]s, optional
//!    conversation id, and an opaque [`SessionInfo`] handle lent to tool
//!    handlers for one request.
//! 2. **LLM-facing**: [`ToolCall`] / [`ToolResult`] exchanged through the
//!    reason-and-act loop, plus [`ParsedResponse`] as the normalized shape
//!    the forgiving parser produces.
//! 3. **Outbound**: the [`StreamEvent`] tagged union every client-visible
//!    artifact funnels through.
//!
//! # Wire Format
//!
//! [`StreamEvent`] serializes with an internal `type` tag:
//!
//! ```json
//! {"type": "text_delta", "content": "Hello"}
//! {"type": "widget", "widget": {"id": "widget-1", "type": "email_preview", ...}}
//! {"type": "status", "status": "Thinking..."}
//! {"type": "done"}
//! {"type": "error", "message": "...", "code": "LLM_ERROR"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorCode;
use crate::widgets::{WidgetBlock, WidgetDescriptor};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input from the human
    User,
    /// Response from the model
    Assistant,
}

/// A client-side widget interaction attached to a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetAction {
    /// Id of the widget the user interacted with
    #[serde(rename = "widgetId")]
    pub widget_id: String,

    /// Action name (e.g. "reply", "join")
    pub action: String,

    /// Action-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// A single message in the inbound conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who authored this turn
    pub role: Role,

    /// Textual content
    pub content: String,

    /// Optional widget interaction that triggered this turn
    #[serde(
        rename = "widgetAction",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub widget_action: Option<WidgetAction>,
}

impl Turn {
    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            widget_action: None,
        }
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            widget_action: None,
        }
    }
}

/// Opaque per-request session handle for downstream APIs.
///
/// Owned by the request; the orchestrator lends it to tool handlers for the
/// duration of one call and never retains it afterwards.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session token included on downstream API calls
    pub session: String,

    /// Per-cluster base URL for the email API
    #[serde(rename = "baseUrl", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Cluster the session was issued against
    #[serde(rename = "clusterId", default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

/// Masked Debug so session tokens never land in logs.
impl std::fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInfo")
            .field("session", &"***")
            .field("base_url", &self.base_url)
            .field("cluster_id", &self.cluster_id)
            .finish()
    }
}

/// An inbound chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Ordered conversation turns; the last must be a user turn
    pub messages: Vec<Turn>,

    /// Conversation to append to; a fresh one is created when absent
    #[serde(
        rename = "conversationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_id: Option<String>,

    /// Credentials and routing for downstream APIs
    #[serde(
        rename = "sessionInfo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session_info: Option<SessionInfo>,
}

impl ChatRequest {
    /// Returns the final turn if it is a user turn.
    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.messages.last().filter(|t| t.role == Role::User)
    }
}

/// A structured request from the LLM to invoke a named tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique id per emitted call; minted by the parser when missing
    pub id: String,

    /// Registered tool name
    pub name: String,

    /// Arguments object passed to the handler
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Creates a tool call with explicit arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool invocation.
///
/// `success = false` implies `error` is set and `data` absent. Widgets only
/// travel on successful results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the handler completed
    pub success: bool,

    /// Raw payload for the LLM to reason over on the next iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Failure description when `success = false`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Renderable blocks for the client
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets: Vec<WidgetBlock>,
}

impl ToolResult {
    /// Creates a successful result carrying data only.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            widgets: Vec::new(),
        }
    }

    /// Creates a successful result carrying data and widgets.
    pub fn ok_with_widgets(data: Value, widgets: Vec<WidgetBlock>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            widgets,
        }
    }

    /// Creates a failed result.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            widgets: Vec::new(),
        }
    }
}

/// The normalized record the forgiving parser extracts from raw LLM text.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    /// Model's private reasoning, when it chose to surface it
    pub thinking: Option<String>,

    /// Tool invocations requested this iteration
    pub tool_calls: Vec<ToolCall>,

    /// User-facing reply text, normalized to a plain string
    pub response: String,

    /// Widget descriptors the model emitted directly
    pub widgets: Vec<WidgetDescriptor>,
}

/// An outbound event on the client stream.
///
/// Ordering within a turn is strictly as emitted by the orchestrator; the
/// sink guarantees in-order delivery and exactly one terminal event
/// (`done` or `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of the user-facing reply
    TextDelta {
        /// Text fragment, whitespace preserved
        content: String,
    },

    /// A renderable widget block
    Widget {
        /// The block to render
        widget: WidgetBlock,
    },

    /// Progress indication while the loop works
    Status {
        /// Human-readable status line
        status: String,
    },

    /// Terminal: the turn completed normally
    Done,

    /// Terminal: the turn failed
    Error {
        /// Human-readable failure description
        message: String,
        /// Machine-readable failure class
        code: ErrorCode,
    },
}

impl StreamEvent {
    /// Whether this event terminates the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}
