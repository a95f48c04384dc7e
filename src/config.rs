//! Agent configuration with validated builder and environment overrides.
//!
//! All tunables from the deployment surface live here: LLM connection knobs,
//! loop and history bounds, streaming pacing, the calendar environment, and
//! the mock-agent bypass. Construct with [`AgentConfig::builder()`]; required
//! fields are validated at build time so misconfiguration fails at startup
//! rather than mid-request.
//!
//! # Environment Variables
//!
//! [`AgentConfig::from_env`] starts from defaults and applies overrides:
//!
//! - `INBOX_AGENT_MODEL` / `INBOX_AGENT_LLM_BASE_URL` / `INBOX_AGENT_API_KEY`
//! - `INBOX_AGENT_LLM_TIMEOUT_MS`
//! - `INBOX_AGENT_MAX_ITERATIONS`
//! - `INBOX_AGENT_TIMEZONE`
//! - `INBOX_AGENT_CALENDAR_ENV` (`staging` | `production`)
//! - `INBOX_AGENT_USE_MOCK` (`1` / `true`)
//! - `INBOX_AGENT_BIND_ADDR`

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Which calendar backend environment outbound calls target.
///
/// Unlike the email API, whose base URL travels with the session, the
/// calendar API lives at a fixed per-environment URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarEnvironment {
    /// Pre-production calendar backend
    Staging,
    /// Live calendar backend
    Production,
}

impl CalendarEnvironment {
    /// Base URL for this environment.
    pub fn base_url(&self) -> &'static str {
        match self {
            CalendarEnvironment::Staging => "https://calendar-staging.alphanetz.de/api",
            CalendarEnvironment::Production => "https://calendar.alphanetz.de/api",
        }
    }
}

impl FromStr for CalendarEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staging" | "stage" => Ok(CalendarEnvironment::Staging),
            "production" | "prod" => Ok(CalendarEnvironment::Production),
            _ => Err(format!("Unknown calendar environment: {}", s)),
        }
    }
}

/// Configuration for the agent backend.
///
/// Covers the LLM provider connection, the reason-and-act loop bounds,
/// conversation history limits, and the peripheral server settings.
#[derive(Clone)]
pub struct AgentConfig {
    /// Model identifier sent to the LLM provider
    model: String,

    /// OpenAI-compatible chat completions endpoint base URL
    llm_base_url: String,

    /// API key for the LLM provider ("not-needed" works for local servers)
    api_key: String,

    /// Sampling temperature (0.0 to 2.0)
    temperature: f32,

    /// Max tokens per LLM response; None uses the provider default
    max_tokens: Option<u32>,

    /// Overall per-LLM-call timeout. Generous because the loop is designed
    /// for large models; covers the entire streamed response.
    llm_timeout: Duration,

    /// Cap on LLM-tool loop depth per turn
    max_iterations: u32,

    /// Conversation prune threshold (entries per conversation)
    max_history_entries: usize,

    /// Most recent entries passed to the LLM when history is included
    context_window_entries: usize,

    /// Optional pause between streamed words, to shape client animation
    stream_word_delay: Duration,

    /// IANA timezone identifier used by the context builder
    timezone: String,

    /// Identity of the signed-in user, when known at startup
    user_email: Option<String>,

    /// Display name for the signed-in user
    user_name: Option<String>,

    /// Calendar backend environment
    calendar_env: CalendarEnvironment,

    /// Bypass the orchestrator with a scripted reply (demo mode)
    use_mock_agent: bool,

    /// Listen address for the HTTP server
    bind_addr: String,
}

/// Masked Debug so the API key never lands in logs.
impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("model", &self.model)
            .field("llm_base_url", &self.llm_base_url)
            .field("api_key", &"***")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("llm_timeout", &self.llm_timeout)
            .field("max_iterations", &self.max_iterations)
            .field("max_history_entries", &self.max_history_entries)
            .field("context_window_entries", &self.context_window_entries)
            .field("timezone", &self.timezone)
            .field("calendar_env", &self.calendar_env)
            .field("use_mock_agent", &self.use_mock_agent)
            .finish()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-32b-instruct".to_string(),
            llm_base_url: "http://localhost:1234/v1".to_string(),
            api_key: "not-needed".to_string(),
            temperature: 0.7,
            max_tokens: Some(4096),
            // 5 minutes: large models stream slowly and the timeout covers
            // the whole response body, not just the first byte
            llm_timeout: Duration::from_millis(300_000),
            max_iterations: 5,
            max_history_entries: 50,
            context_window_entries: 10,
            stream_word_delay: Duration::ZERO,
            timezone: "UTC".to_string(),
            user_email: None,
            user_name: None,
            calendar_env: CalendarEnvironment::Staging,
            use_mock_agent: false,
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AgentConfig {
    /// Creates a new builder for constructing an [`AgentConfig`].
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Defaults plus environment variable overrides.
    ///
    /// Unparseable numeric overrides are ignored with a warning rather than
    /// failing startup.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Ok(model) = env::var("INBOX_AGENT_MODEL") {
            builder = builder.model(model);
        }
        if let Ok(url) = env::var("INBOX_AGENT_LLM_BASE_URL") {
            builder = builder.llm_base_url(url);
        }
        if let Ok(key) = env::var("INBOX_AGENT_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Ok(raw) = env::var("INBOX_AGENT_LLM_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => builder = builder.llm_timeout_ms(ms),
                Err(_) => log::warn!("Ignoring unparseable INBOX_AGENT_LLM_TIMEOUT_MS={}", raw),
            }
        }
        if let Ok(raw) = env::var("INBOX_AGENT_MAX_ITERATIONS") {
            match raw.parse::<u32>() {
                Ok(n) => builder = builder.max_iterations(n),
                Err(_) => log::warn!("Ignoring unparseable INBOX_AGENT_MAX_ITERATIONS={}", raw),
            }
        }
        if let Ok(tz) = env::var("INBOX_AGENT_TIMEZONE") {
            builder = builder.timezone(tz);
        }
        if let Ok(raw) = env::var("INBOX_AGENT_CALENDAR_ENV") {
            match raw.parse::<CalendarEnvironment>() {
                Ok(envr) => builder = builder.calendar_env(envr),
                Err(e) => log::warn!("Ignoring INBOX_AGENT_CALENDAR_ENV: {}", e),
            }
        }
        if let Ok(raw) = env::var("INBOX_AGENT_USE_MOCK") {
            builder = builder.use_mock_agent(raw == "1" || raw.eq_ignore_ascii_case("true"));
        }
        if let Ok(addr) = env::var("INBOX_AGENT_BIND_ADDR") {
            builder = builder.bind_addr(addr);
        }

        builder.build()
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the LLM base URL.
    pub fn llm_base_url(&self) -> &str {
        &self.llm_base_url
    }

    /// Returns the LLM API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the sampling temperature.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the max-tokens setting.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// Returns the overall per-LLM-call timeout.
    pub fn llm_timeout(&self) -> Duration {
        self.llm_timeout
    }

    /// Returns the loop depth cap.
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the conversation prune threshold.
    pub fn max_history_entries(&self) -> usize {
        self.max_history_entries
    }

    /// Returns how many recent entries are passed when history is included.
    pub fn context_window_entries(&self) -> usize {
        self.context_window_entries
    }

    /// Returns the inter-word streaming delay.
    pub fn stream_word_delay(&self) -> Duration {
        self.stream_word_delay
    }

    /// Returns the configured IANA timezone identifier.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Returns the configured user email, if any.
    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    /// Returns the configured user display name, if any.
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Returns the calendar backend environment.
    pub fn calendar_env(&self) -> CalendarEnvironment {
        self.calendar_env
    }

    /// Returns whether the scripted mock bypass is enabled.
    pub fn use_mock_agent(&self) -> bool {
        self.use_mock_agent
    }

    /// Returns the HTTP listen address.
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }
}

/// Builder for [`AgentConfig`] with validation at `build()`.
#[derive(Default)]
pub struct AgentConfigBuilder {
    model: Option<String>,
    llm_base_url: Option<String>,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    llm_timeout_ms: Option<u64>,
    max_iterations: Option<u32>,
    max_history_entries: Option<usize>,
    context_window_entries: Option<usize>,
    stream_word_delay_ms: Option<u64>,
    timezone: Option<String>,
    user_email: Option<String>,
    user_name: Option<String>,
    calendar_env: Option<CalendarEnvironment>,
    use_mock_agent: Option<bool>,
    bind_addr: Option<String>,
}

impl AgentConfigBuilder {
    /// Sets the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the OpenAI-compatible base URL.
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.llm_base_url = Some(url.into());
        self
    }

    /// Sets the provider API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Sets the max tokens per response.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Sets the overall per-LLM-call timeout in milliseconds.
    pub fn llm_timeout_ms(mut self, ms: u64) -> Self {
        self.llm_timeout_ms = Some(ms);
        self
    }

    /// Sets the loop depth cap.
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the conversation prune threshold.
    pub fn max_history_entries(mut self, n: usize) -> Self {
        self.max_history_entries = Some(n);
        self
    }

    /// Sets the context window size in entries.
    pub fn context_window_entries(mut self, n: usize) -> Self {
        self.context_window_entries = Some(n);
        self
    }

    /// Sets the inter-word streaming delay in milliseconds.
    pub fn stream_word_delay_ms(mut self, ms: u64) -> Self {
        self.stream_word_delay_ms = Some(ms);
        self
    }

    /// Sets the IANA timezone identifier.
    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    /// Sets the user email for the context block.
    pub fn user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    /// Sets the user display name for the context block.
    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Sets the calendar backend environment.
    pub fn calendar_env(mut self, env: CalendarEnvironment) -> Self {
        self.calendar_env = Some(env);
        self
    }

    /// Enables or disables the scripted mock bypass.
    pub fn use_mock_agent(mut self, mock: bool) -> Self {
        self.use_mock_agent = Some(mock);
        self
    }

    /// Sets the HTTP listen address.
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// Validates and builds the final [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the temperature is out of range,
    /// the base URL has no http(s) scheme, or a zero bound would disable
    /// the loop entirely.
    pub fn build(self) -> Result<AgentConfig> {
        let defaults = AgentConfig::default();

        let model = self.model.unwrap_or(defaults.model);
        if model.trim().is_empty() {
            return Err(Error::config("model cannot be empty or whitespace"));
        }

        let llm_base_url = self.llm_base_url.unwrap_or(defaults.llm_base_url);
        if !llm_base_url.starts_with("http://") && !llm_base_url.starts_with("https://") {
            return Err(Error::config(
                "llm_base_url must start with http:// or https://",
            ));
        }

        let temperature = self.temperature.unwrap_or(defaults.temperature);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::config(
                "temperature must be between 0.0 and 2.0",
            ));
        }

        let max_iterations = self.max_iterations.unwrap_or(defaults.max_iterations);
        if max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }

        let max_history_entries = self
            .max_history_entries
            .unwrap_or(defaults.max_history_entries);
        if max_history_entries == 0 {
            return Err(Error::config(
                "max_history_entries must be at least 1",
            ));
        }

        Ok(AgentConfig {
            model,
            llm_base_url,
            api_key: self.api_key.unwrap_or(defaults.api_key),
            temperature,
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            llm_timeout: self
                .llm_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.llm_timeout),
            max_iterations,
            max_history_entries,
            context_window_entries: self
                .context_window_entries
                .unwrap_or(defaults.context_window_entries),
            stream_word_delay: self
                .stream_word_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stream_word_delay),
            timezone: self.timezone.unwrap_or(defaults.timezone),
            user_email: self.user_email,
            user_name: self.user_name,
            calendar_env: self.calendar_env.unwrap_or(defaults.calendar_env),
            use_mock_agent: self.use_mock_agent.unwrap_or(defaults.use_mock_agent),
            bind_addr: self.bind_addr.unwrap_or(defaults.bind_addr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.max_iterations(), 5);
        assert_eq!(cfg.max_history_entries(), 50);
        assert_eq!(cfg.context_window_entries(), 10);
        assert_eq!(cfg.llm_timeout(), Duration::from_millis(300_000));
        assert!(!cfg.use_mock_agent());
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = AgentConfig::builder()
            .model("test-model")
            .llm_base_url("http://localhost:9999/v1")
            .max_iterations(3)
            .stream_word_delay_ms(20)
            .build()
            .unwrap();

        assert_eq!(cfg.model(), "test-model");
        assert_eq!(cfg.max_iterations(), 3);
        assert_eq!(cfg.stream_word_delay(), Duration::from_millis(20));
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let result = AgentConfig::builder().temperature(2.5).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = AgentConfig::builder().llm_base_url("localhost:1234").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let result = AgentConfig::builder().max_iterations(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_calendar_environment_urls() {
        assert!(CalendarEnvironment::Staging.base_url().contains("staging"));
        assert!(!CalendarEnvironment::Production.base_url().contains("staging"));
    }

    #[test]
    fn test_calendar_environment_parse() {
        assert_eq!(
            "production".parse::<CalendarEnvironment>(),
            Ok(CalendarEnvironment::Production)
        );
        assert_eq!(
            "staging".parse::<CalendarEnvironment>(),
            Ok(CalendarEnvironment::Staging)
        );
        assert!("local".parse::<CalendarEnvironment>().is_err());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let cfg = AgentConfig::builder().api_key("secret-key").build().unwrap();
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("***"));
    }
}
