//! Tool registry: name-keyed (descriptor, handler) pairs with
//! domain-filtered views.
//!
//! Every capability the LLM can invoke is registered here. A tool carries:
//!
//! 1. **Descriptor**: name, description, and a parameter table with a
//!    required set; rendered into the prompt's tools block.
//! 2. **Domain tag**: `email`, `calendar`, or `general`; gates which tools
//!    a given query sees. Tools without a tag are always included.
//! 3. **Usage hints**: when-to-use / when-not-to-use / prerequisites and
//!    the output shape, also rendered into the prompt.
//! 4. **Action kind**: metadata distinguishing API-backed, client-side,
//!    composite, and internal tools.
//! 5. **Handler**: the async function executing the call.
//!
//! # Handler Anatomy
//!
//! Handlers are stored type-erased so tools with different concrete futures
//! live in one map:
//!
//! ```text
//! Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<ToolResult>> + Send>> + Send + Sync>
//! ```
//!
//! `Arc` makes clones cheap (the executor clones a handler out of the map
//! before dispatch), pinning satisfies the async contract, and the bounds
//! let handlers run on any worker thread.
//!
//! # Example
//!
//! ```rust
//! use inbox_agent::{tool, OutputShape, ToolRegistry, ToolResult};
//! use serde_json::json;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     tool("get_current_time", "Report the current time")
//!         .output(OutputShape::Text)
//!         .build(|_args| async move { Ok(ToolResult::ok(json!({"time": "12:00"}))) }),
//! );
//! assert!(registry.by_name("get_current_time").is_some());
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::ToolResult;
use crate::Result;

/// Coarse capability area used to gate prompt fragments and tool visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Mail operations
    Email,
    /// Scheduling operations
    Calendar,
    /// Everything else; also the fallback when no keywords match
    General,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Domain::Email => write!(f, "email"),
            Domain::Calendar => write!(f, "calendar"),
            Domain::General => write!(f, "general"),
        }
    }
}

/// How a tool acts on the world (metadata only; dispatch ignores it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionKind {
    /// Calls an external API
    Api,
    /// Resolved client-side from a widget action
    Client,
    /// Orchestrates several other tools
    Composite,
    /// Pure in-process computation
    #[default]
    Internal,
}

/// What a tool's result contains, for prompt guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
    /// Data only; the LLM summarizes it
    #[default]
    Text,
    /// Renderable widgets only
    Widget,
    /// Both data and widgets
    Both,
}

impl std::fmt::Display for OutputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputShape::Text => write!(f, "text"),
            OutputShape::Widget => write!(f, "widget"),
            OutputShape::Both => write!(f, "both"),
        }
    }
}

/// Prompt-only guidance on when and how to use a tool.
#[derive(Debug, Clone, Default)]
pub struct UsageHints {
    /// Situations the tool is meant for
    pub when_to_use: Option<String>,

    /// Situations to avoid it
    pub when_not_to_use: Option<String>,

    /// Conditions that must hold before calling it
    pub prerequisites: Option<String>,

    /// Shape of the result
    pub output: OutputShape,
}

/// Schema for one tool parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// JSON type name: "string", "boolean", "number", "integer", "array", "object"
    pub kind: String,

    /// Human-readable description rendered into the prompt
    pub description: String,

    /// Allowed values, when the parameter is an enumeration
    pub enum_values: Option<Vec<String>>,

    /// Element type name for array parameters
    pub items: Option<String>,

    /// Default applied by the handler when the argument is absent
    pub default: Option<Value>,
}

/// Everything the prompt and the executor need to know about a tool,
/// minus the handler itself.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique tool name (snake_case)
    pub name: String,

    /// One-to-three sentence description for the LLM
    pub description: String,

    /// Parameter table in declaration order (order is rendered verbatim,
    /// keeping prompt assembly deterministic)
    pub params: Vec<(String, ParamSpec)>,

    /// Names of parameters that must be present
    pub required: Vec<String>,

    /// Capability area; `None` means "always visible"
    pub domain: Option<Domain>,

    /// Prompt-only usage guidance
    pub hints: UsageHints,

    /// How the tool acts on the world
    pub kind: ActionKind,
}

/// Type-erased async handler executing one tool call.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<ToolResult>> + Send>> + Send + Sync>;

/// A registered tool: descriptor plus handler.
#[derive(Clone)]
pub struct Tool {
    /// Metadata for the prompt and the executor
    pub descriptor: ToolDescriptor,

    /// The function dispatched on invocation
    pub handler: ToolHandler,
}

/// Name-keyed tool map with domain-filtered views.
///
/// Read-only after startup binding; safe for concurrent reads behind an
/// `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    // Registration order, so descriptor listings (and thus prompts) are
    // deterministic.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Last write wins; replacing an existing name keeps
    /// its position and logs a warning.
    pub fn register(&mut self, tool: Tool) {
        let name = tool.descriptor.name.clone();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("Tool {:?} re-registered; previous handler replaced", name);
        } else {
            self.order.push(name);
        }
    }

    /// Removes a tool by name. Returns whether it existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        if self.tools.remove(name).is_some() {
            self.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    /// Fetches a tool for dispatch.
    pub fn by_name(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Returns every tool whose domain is in `domains`, plus every tool
    /// without a domain tag.
    pub fn by_domain(&self, domains: &[Domain]) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| &tool.descriptor)
            .filter(|descriptor| match descriptor.domain {
                Some(domain) => domains.contains(&domain),
                None => true,
            })
            .collect()
    }

    /// All registered names, in registration order.
    pub fn all_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// All descriptors, in registration order.
    pub fn all_descriptors(&self) -> Vec<&ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| &tool.descriptor)
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Starts building a tool. See module docs for a complete example.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Fluent builder producing a [`Tool`].
pub struct ToolBuilder {
    name: String,
    description: String,
    params: Vec<(String, ParamSpec)>,
    required: Vec<String>,
    domain: Option<Domain>,
    hints: UsageHints,
    kind: ActionKind,
}

impl ToolBuilder {
    /// Creates a builder with the mandatory identity fields.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            required: Vec::new(),
            domain: None,
            hints: UsageHints::default(),
            kind: ActionKind::default(),
        }
    }

    /// Adds an optional parameter.
    pub fn param(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.params.push((
            name.to_string(),
            ParamSpec {
                kind: kind.to_string(),
                description: description.to_string(),
                enum_values: None,
                items: None,
                default: None,
            },
        ));
        self
    }

    /// Adds a required parameter.
    pub fn required_param(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.required.push(name.to_string());
        self.param(name, kind, description)
    }

    /// Adds a required enumeration parameter.
    pub fn enum_param(mut self, name: &str, description: &str, values: &[&str]) -> Self {
        self.required.push(name.to_string());
        self.params.push((
            name.to_string(),
            ParamSpec {
                kind: "string".to_string(),
                description: description.to_string(),
                enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
                items: None,
                default: None,
            },
        ));
        self
    }

    /// Adds an optional array parameter with an element type.
    pub fn array_param(mut self, name: &str, items: &str, description: &str) -> Self {
        self.params.push((
            name.to_string(),
            ParamSpec {
                kind: "array".to_string(),
                description: description.to_string(),
                enum_values: None,
                items: Some(items.to_string()),
                default: None,
            },
        ));
        self
    }

    /// Sets a default on the most recently added parameter.
    pub fn default_value(mut self, value: Value) -> Self {
        if let Some((_, spec)) = self.params.last_mut() {
            spec.default = Some(value);
        }
        self
    }

    /// Tags the tool with a domain.
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Sets the action kind.
    pub fn kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the when-to-use hint.
    pub fn when_to_use(mut self, hint: &str) -> Self {
        self.hints.when_to_use = Some(hint.to_string());
        self
    }

    /// Sets the when-not-to-use hint.
    pub fn when_not_to_use(mut self, hint: &str) -> Self {
        self.hints.when_not_to_use = Some(hint.to_string());
        self
    }

    /// Sets the prerequisites hint.
    pub fn prerequisites(mut self, hint: &str) -> Self {
        self.hints.prerequisites = Some(hint.to_string());
        self
    }

    /// Sets the output shape.
    pub fn output(mut self, output: OutputShape) -> Self {
        self.hints.output = output;
        self
    }

    /// Finishes the build with the handler function.
    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult>> + Send + 'static,
    {
        Tool {
            descriptor: ToolDescriptor {
                name: self.name,
                description: self.description,
                params: self.params,
                required: self.required,
                domain: self.domain,
                hints: self.hints,
                kind: self.kind,
            },
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_tool(name: &str, domain: Option<Domain>) -> Tool {
        let mut builder = tool(name, "test tool");
        if let Some(domain) = domain {
            builder = builder.domain(domain);
        }
        builder.build(|_args| async move { Ok(ToolResult::ok(json!({}))) })
    }

    #[test]
    fn test_register_and_fetch() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("fetch_messages", Some(Domain::Email)));

        let tool = registry.by_name("fetch_messages").unwrap();
        assert_eq!(tool.descriptor.name, "fetch_messages");
        assert!(registry.by_name("missing").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("dup", None));
        registry.register(
            tool("dup", "replacement")
                .build(|_args| async move { Ok(ToolResult::ok(json!({}))) }),
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_name("dup").unwrap().descriptor.description, "replacement");
    }

    #[test]
    fn test_register_unregister_round_trip() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("a", None));
        let names_before = registry.all_names();

        registry.register(noop_tool("temp", Some(Domain::Calendar)));
        assert!(registry.unregister("temp"));
        assert!(!registry.unregister("temp"));

        assert_eq!(registry.all_names(), names_before);
    }

    #[test]
    fn test_by_domain_includes_undomained() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("fetch_messages", Some(Domain::Email)));
        registry.register(noop_tool("fetch_events", Some(Domain::Calendar)));
        registry.register(noop_tool("get_current_time", None));

        let email_view = registry.by_domain(&[Domain::Email]);
        let names: Vec<&str> = email_view.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fetch_messages", "get_current_time"]);

        let both = registry.by_domain(&[Domain::Email, Domain::Calendar]);
        assert_eq!(both.len(), 3);
    }

    #[test]
    fn test_descriptor_listing_is_registration_ordered() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("z_tool", None));
        registry.register(noop_tool("a_tool", None));

        let names: Vec<&str> = registry
            .all_descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["z_tool", "a_tool"]);
    }

    #[test]
    fn test_builder_parameter_shapes() {
        let built = tool("search_emails", "Search the mailbox")
            .domain(Domain::Email)
            .kind(ActionKind::Api)
            .required_param("query", "string", "Search terms")
            .param("limit", "integer", "Max results")
            .default_value(json!(20))
            .enum_param("sort", "Sort order", &["newest", "oldest"])
            .array_param("folders", "string", "Folders to search")
            .output(OutputShape::Both)
            .when_to_use("The user asks to find specific emails")
            .build(|_args| async move { Ok(ToolResult::ok(json!({}))) });

        let descriptor = &built.descriptor;
        assert_eq!(descriptor.params.len(), 4);
        assert_eq!(descriptor.required, vec!["query", "sort"]);
        assert_eq!(descriptor.params[1].1.default, Some(json!(20)));
        assert_eq!(
            descriptor.params[2].1.enum_values.as_ref().unwrap(),
            &vec!["newest".to_string(), "oldest".to_string()]
        );
        assert_eq!(descriptor.params[3].1.items.as_deref(), Some("string"));
        assert_eq!(descriptor.hints.output, OutputShape::Both);
    }

    #[tokio::test]
    async fn test_handler_executes() {
        let built = tool("echo", "Echo arguments")
            .build(|args| async move { Ok(ToolResult::ok(args)) });

        let result = (built.handler)(json!({"x": 1})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["x"], 1);
    }
}
