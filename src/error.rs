//! Error surface for the agent backend.
//!
//! Two layers exist here. [`Error`] is the internal error type threaded
//! through every fallible path: startup configuration, the LLM provider,
//! the downstream mail and calendar APIs, and tool handlers. [`ErrorCode`]
//! is the much smaller set of failure classes a client ever observes on
//! the event stream. Most `Error`s never surface as an `ErrorCode`: tool
//! failures are folded into tool results for the LLM to recover from, and
//! parse failures always yield a usable response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Internal error type for the agent backend.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration rejected at startup
    #[error("configuration rejected: {0}")]
    Config(String),

    /// The inbound request is unusable (turn order, unusable session handle)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The LLM provider failed: unreachable, bad status, or mid-stream
    #[error("language model failure: {0}")]
    Llm(String),

    /// A downstream productivity API misbehaved
    #[error("{service} API failure: {detail}")]
    Upstream {
        /// Which API: "mail" or "calendar"
        service: &'static str,
        /// What went wrong, including any status and body
        detail: String,
    },

    /// A tool handler could not complete
    #[error("tool failure: {0}")]
    Tool(String),

    /// The overall deadline for a call elapsed
    #[error("deadline elapsed")]
    Deadline,

    /// Transport-level failure on an outbound HTTP call
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A payload failed to encode or decode
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
}

impl Error {
    /// Configuration rejected at startup.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// The inbound request is unusable.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    /// The LLM provider failed.
    pub fn llm(msg: impl Into<String>) -> Self {
        Error::Llm(msg.into())
    }

    /// A downstream API misbehaved.
    pub fn upstream(service: &'static str, detail: impl Into<String>) -> Self {
        Error::Upstream {
            service,
            detail: detail.into(),
        }
    }

    /// A tool handler could not complete.
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }
}

/// Error codes surfaced on the outbound event stream.
///
/// The only failure classes a client ever sees; everything else is
/// recovered inside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request or missing last-user-turn
    ValidationError,
    /// LLM availability probe failed before the loop started
    LlmUnavailable,
    /// Stream-level error from the LLM provider mid-turn
    LlmError,
    /// Unclassified orchestrator failure
    AgentError,
}

impl ErrorCode {
    /// Returns the wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::LlmUnavailable => "LLM_UNAVAILABLE",
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::AgentError => "AGENT_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = Error::config("model cannot be empty");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration rejected: model cannot be empty"
        );
    }

    #[test]
    fn test_upstream_error_names_the_service() {
        let err = Error::upstream("mail", "status 502: bad gateway");
        assert_eq!(err.to_string(), "mail API failure: status 502: bad gateway");

        let err = Error::upstream("calendar", "status 404: not found");
        assert!(err.to_string().starts_with("calendar API failure"));
    }

    #[test]
    fn test_llm_and_tool_errors() {
        assert_eq!(
            Error::llm("connection refused").to_string(),
            "language model failure: connection refused"
        );
        assert_eq!(
            Error::tool("handler panicked").to_string(),
            "tool failure: handler panicked"
        );
    }

    #[test]
    fn test_codec_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_error_code_wire_form() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::LlmUnavailable.as_str(), "LLM_UNAVAILABLE");
        assert_eq!(ErrorCode::LlmError.as_str(), "LLM_ERROR");
        assert_eq!(ErrorCode::AgentError.as_str(), "AGENT_ERROR");
    }

    #[test]
    fn test_error_code_serializes_to_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::LlmUnavailable).unwrap();
        assert_eq!(json, "\"LLM_UNAVAILABLE\"");
    }
}
