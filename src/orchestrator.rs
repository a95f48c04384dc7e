//! The agent orchestrator: the reason-and-act loop.
//!
//! One entry point, [`Orchestrator::process`], drives a whole turn:
//!
//! 1. Validate the request and record the user turn.
//! 2. Probe the LLM; bail early with `LLM_UNAVAILABLE` when unreachable.
//! 3. Bind a per-request tool registry over the request's session handle.
//! 4. Decide whether prior history travels to the LLM (context gating)
//!    and whether tool widgets are suppressed (summary detection).
//! 5. Assemble the routed system prompt and enter the bounded loop:
//!    stream a completion, parse it, and either dispatch tool calls and
//!    feed the results back, or stream the final text and finish.
//!
//! Every turn emits exactly one terminal event (`done` or `error`), and the
//! number of LLM invocations never exceeds the configured iteration cap.
//! Reaching the cap is not an error: the user gets a plain apology and a
//! normal `done`.
//!
//! # State Machine
//!
//! ```text
//! Idle -> Streaming -> Dispatching -> Streaming -> ... -> Finalized
//!                 \___________________________________________/
//!                    (no tool calls, cap reached, or error)
//! ```

use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::context::{ContextBuilder, UserIdentity};
use crate::email::EmailApi;
use crate::error::ErrorCode;
use crate::executor::ToolExecutor;
use crate::handlers;
use crate::llm::{ChatChunk, ChatMessage, ChatModel};
use crate::parser::parse_response;
use crate::registry::ToolRegistry;
use crate::router::PromptRouter;
use crate::sink::EventSink;
use crate::store::{ConversationStore, Entry};
use crate::types::{ChatRequest, Role, SessionInfo, StreamEvent, ToolCall, ToolResult};
use crate::widgets;

/// Streamed when a post-tool iteration produced no usable text.
pub const EMPTY_RESULT_FALLBACK: &str = "I've completed the search but couldn't find any \
matching results. Try different keywords or a broader date range.";

/// Streamed when the loop hits its iteration cap.
pub const ITERATION_CAP_APOLOGY: &str = "I'm sorry, I couldn't finish working through that \
request. Could you try asking for it in a smaller step?";

static NEXT_CONVERSATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_conversation_id() -> String {
    format!("conv-{}", NEXT_CONVERSATION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Builds the per-request tool registry. Injectable so tests can substitute
/// stub tools for the API-backed handlers.
pub type RegistryFactory =
    Arc<dyn Fn(&AgentConfig, Option<&SessionInfo>) -> ToolRegistry + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Streaming,
    Dispatching,
    Finalized,
}

fn advance(state: &mut LoopState, next: LoopState) {
    log::debug!("agent state {:?} -> {:?}", state, next);
    *state = next;
}

/// Drives the LLM-tool dialogue for one request at a time.
///
/// Shared, read-only collaborators (store, router, model) live behind
/// `Arc`s; everything request-scoped is created inside [`process`].
///
/// [`process`]: Orchestrator::process
pub struct Orchestrator {
    config: AgentConfig,
    store: Arc<ConversationStore>,
    router: Arc<PromptRouter>,
    model: Arc<dyn ChatModel>,
    registry_factory: RegistryFactory,
}

impl Orchestrator {
    /// Creates an orchestrator with the production registry binding.
    pub fn new(
        config: AgentConfig,
        store: Arc<ConversationStore>,
        router: Arc<PromptRouter>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            config,
            store,
            router,
            model,
            registry_factory: Arc::new(|config, session| handlers::build_registry(config, session)),
        }
    }

    /// Replaces the registry binding; used by tests and embedders that
    /// bring their own tools.
    pub fn with_registry_factory(mut self, factory: RegistryFactory) -> Self {
        self.registry_factory = factory;
        self
    }

    /// Processes one chat request, emitting all output through the sink.
    ///
    /// Always emits exactly one terminal event; never returns an error to
    /// the caller because the stream is the only channel the client sees.
    pub async fn process(&self, request: ChatRequest, sink: &dyn EventSink) {
        let mut state = LoopState::Idle;

        let Some(user_turn) = request.last_user_turn() else {
            sink.emit(StreamEvent::Error {
                message: "The last message must be a user message.".to_string(),
                code: ErrorCode::ValidationError,
            })
            .await;
            return;
        };
        let query = user_turn.content.clone();

        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(next_conversation_id);
        self.store
            .append(&conversation_id, Entry::new(Role::User, query.clone()));

        if !self.model.is_available().await {
            sink.emit(StreamEvent::Error {
                message: "The language model is currently unreachable.".to_string(),
                code: ErrorCode::LlmUnavailable,
            })
            .await;
            return;
        }

        // Session lending: fresh provider objects per request, dropped with
        // the registry when this call returns. A missing handle is not
        // fatal; API-backed tools self-report it.
        let session = request.session_info.as_ref();
        if session.is_none() {
            log::warn!("Request carries no session handle; API-backed tools will self-report");
        }
        let registry = Arc::new((self.registry_factory)(&self.config, session));
        let executor = ToolExecutor::new(registry.clone());

        let user_context = self.build_user_context(session).await;

        let domains = self.router.detect_domains(&query);
        log::debug!("Detected domains for query: {:?}", domains);
        let all_descriptors = registry.all_descriptors();
        let tools = self.router.relevant_tools(&all_descriptors, &domains);
        let prompt = self.router.assemble(&query, &tools, Some(&user_context));

        let include_history = should_include_history(&query);
        let summary_request = is_summary_request(&query);

        let mut messages = vec![ChatMessage::system(prompt)];
        if include_history {
            // The current user turn was appended above, so the window's
            // last entry is always the live query.
            for entry in self
                .store
                .recent(&conversation_id, self.config.context_window_entries())
            {
                let message = match entry.role {
                    Role::User => ChatMessage::user(entry.content),
                    Role::Assistant => ChatMessage::assistant(entry.content),
                };
                messages.push(message);
            }
        } else {
            log::debug!("Standalone query; omitting conversation history");
            messages.push(ChatMessage::user(query.clone()));
        }

        let mut executed_call_ids: Vec<String> = Vec::new();

        for iteration in 0..self.config.max_iterations() {
            advance(&mut state, LoopState::Streaming);

            let status = if iteration == 0 {
                "Thinking..."
            } else {
                "Processing tool results..."
            };
            sink.emit(StreamEvent::Status {
                status: status.to_string(),
            })
            .await;

            let raw = match self.collect_completion(&messages).await {
                Ok(raw) => raw,
                Err(message) => {
                    advance(&mut state, LoopState::Finalized);
                    sink.emit(StreamEvent::Error {
                        message,
                        code: ErrorCode::LlmError,
                    })
                    .await;
                    return;
                }
            };

            let parsed = parse_response(&raw);

            if !parsed.tool_calls.is_empty() {
                advance(&mut state, LoopState::Dispatching);
                log::info!(
                    "Iteration {}: dispatching tool calls {:?}",
                    iteration,
                    parsed
                        .tool_calls
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                );

                let results = executor.execute_many(&parsed.tool_calls).await;
                executed_call_ids.extend(results.iter().map(|(id, _)| id.clone()));

                let collected = widgets::from_tool_results(&results);
                if summary_request {
                    if !collected.is_empty() {
                        log::debug!(
                            "Summary request: suppressing {} tool widget(s)",
                            collected.len()
                        );
                    }
                } else {
                    for widget in collected {
                        sink.emit(StreamEvent::Widget { widget }).await;
                    }
                }

                messages.push(ChatMessage::assistant(raw));
                messages.push(ChatMessage::user(render_tool_feedback(
                    &parsed.tool_calls,
                    &results,
                )));
                continue;
            }

            // No tool calls: this iteration's text is the reply.
            let mut response_text = parsed.response;
            if response_text.trim().is_empty() && iteration > 0 {
                response_text = EMPTY_RESULT_FALLBACK.to_string();
            }

            self.stream_text(&response_text, sink).await;

            for widget in widgets::from_llm(&parsed.widgets) {
                sink.emit(StreamEvent::Widget { widget }).await;
            }

            self.store.append(
                &conversation_id,
                Entry::new(Role::Assistant, response_text.clone())
                    .with_tool_calls(executed_call_ids),
            );
            sink.emit(StreamEvent::Done).await;
            advance(&mut state, LoopState::Finalized);
            return;
        }

        // Cap reached: end the turn politely, never with an error event.
        log::warn!(
            "Iteration cap ({}) reached for conversation {}",
            self.config.max_iterations(),
            conversation_id
        );
        self.stream_text(ITERATION_CAP_APOLOGY, sink).await;
        self.store.append(
            &conversation_id,
            Entry::new(Role::Assistant, ITERATION_CAP_APOLOGY).with_tool_calls(executed_call_ids),
        );
        sink.emit(StreamEvent::Done).await;
        advance(&mut state, LoopState::Finalized);
    }

    /// Runs one LLM stream to completion, accumulating content deltas.
    ///
    /// Returns the raw text, or a human-readable error message when the
    /// provider failed at any point.
    async fn collect_completion(
        &self,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, String> {
        let mut stream = self
            .model
            .stream_chat(messages)
            .await
            .map_err(|e| e.to_string())?;

        let mut raw = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(ChatChunk::Content(delta)) => raw.push_str(&delta),
                Ok(ChatChunk::Done) => break,
                Err(e) => return Err(e.to_string()),
            }
        }
        Ok(raw)
    }

    /// Streams reply text word by word, preserving whitespace exactly.
    async fn stream_text(&self, text: &str, sink: &dyn EventSink) {
        let delay = self.config.stream_word_delay();
        for token in split_preserving_whitespace(text) {
            sink.emit(StreamEvent::TextDelta {
                content: token.to_string(),
            })
            .await;
            if !delay.is_zero() && !token.trim().is_empty() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Builds the user-context prompt block, with an activity snapshot when
    /// the session allows one.
    async fn build_user_context(&self, session: Option<&SessionInfo>) -> String {
        let identity = self.config.user_email().map(|email| UserIdentity {
            email: email.to_string(),
            name: self.config.user_name().map(str::to_string),
        });
        let builder = ContextBuilder::new(self.config.timezone(), identity);
        let email_api = session.and_then(|s| EmailApi::new(s).ok());
        builder.build(email_api.as_ref()).await
    }
}

// ============================================================================
// CONTEXT-INCLUSION GATING
// ============================================================================

/// Whole-query phrases that never need prior context.
const STANDALONE_PHRASES: &[&str] = &[
    "find invoice",
    "show emails",
    "show my emails",
    "check mail",
    "check my email",
    "any unread messages",
    "show calendar",
    "show my calendar",
    "what time is it",
];

/// Words that refer back to earlier turns: pronouns, demonstratives, and
/// short acknowledgements.
const CONTEXT_WORDS: &[&str] = &[
    "it", "that", "this", "them", "those", "these", "he", "she", "they", "him", "her", "its",
    "their", "yes", "ok", "okay", "sure", "thanks", "no", "yep", "nope",
];

/// Multi-word phrasings that signal a follow-up.
const CONTEXT_PHRASES: &[&str] = &[
    "what about",
    "how about",
    "instead",
    "as well",
    "also",
    "again",
    "the same",
    "the other",
    "earlier",
    "previous",
    "thank you",
];

/// Verbs that open a self-contained command.
const ACTION_VERBS: &[&str] = &[
    "find", "search", "show", "get", "list", "fetch", "check", "open", "display", "give",
];

fn strip_punctuation(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
}

/// Decides whether prior conversation history travels to the LLM.
///
/// A hand-rolled rule set, frozen by its tests rather than claimed correct
/// on all inputs:
///
/// 1. Known standalone phrases omit history.
/// 2. Context indicators (pronouns, demonstratives, acknowledgements,
///    follow-up phrasings) include it.
/// 3. Queries opening with an action verb and carrying no indicator omit it.
/// 4. Everything else includes it.
pub fn should_include_history(query: &str) -> bool {
    let lowered = query.trim().to_lowercase();
    if STANDALONE_PHRASES.contains(&lowered.as_str()) {
        return false;
    }

    let words: Vec<&str> = lowered.split_whitespace().collect();
    let has_indicator = words
        .iter()
        .any(|w| CONTEXT_WORDS.contains(&strip_punctuation(w)))
        || CONTEXT_PHRASES.iter().any(|p| lowered.contains(p));
    if has_indicator {
        return true;
    }

    if let Some(first) = words.first() {
        if ACTION_VERBS.contains(&strip_punctuation(first)) {
            return false;
        }
    }

    true
}

/// Keywords whose presence marks a summary request (case-insensitive
/// substring match).
const SUMMARY_KEYWORDS: &[&str] = &[
    "summary",
    "summarize",
    "summarise",
    "sum up",
    "brief",
    "briefly",
    "overview",
    "recap",
    "catch me up",
    "quick look",
    "highlights",
    "what's important",
    "key points",
    "tldr",
    "tl;dr",
    "in short",
    "gist",
];

/// Whether the query asks for a summary, which suppresses widgets sourced
/// from tool results for this turn. The LLM may still emit widgets of its
/// own in the final response.
pub fn is_summary_request(query: &str) -> bool {
    let lowered = query.to_lowercase();
    SUMMARY_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Splits text into alternating word and whitespace tokens whose
/// concatenation reproduces the input exactly.
fn split_preserving_whitespace(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_whitespace: Option<bool> = None;

    for (i, c) in text.char_indices() {
        let is_ws = c.is_whitespace();
        match in_whitespace {
            Some(prev) if prev == is_ws => {}
            Some(_) => {
                tokens.push(&text[start..i]);
                start = i;
                in_whitespace = Some(is_ws);
            }
            None => in_whitespace = Some(is_ws),
        }
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Renders the tool-results feedback message: one block per call in
/// dispatch order, then an instruction line for the reply.
fn render_tool_feedback(calls: &[ToolCall], results: &[(String, ToolResult)]) -> String {
    let mut out = String::new();
    for (call, (_, result)) in calls.iter().zip(results.iter()) {
        if result.success {
            let data = result.data.clone().unwrap_or(Value::Null);
            let pretty = serde_json::to_string_pretty(&data)
                .unwrap_or_else(|_| data.to_string());
            out.push_str(&format!("Tool \"{}\" returned: {}\n\n", call.name, pretty));
        } else {
            out.push_str(&format!(
                "Tool \"{}\" failed: {}\n\n",
                call.name,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    out.push_str(
        "Write the user-facing reply now using these results. \
If no results were found, tell the user clearly instead of inventing any.",
    );
    out
}
