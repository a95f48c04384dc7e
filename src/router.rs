//! Prompt router: intent detection and system prompt assembly.
//!
//! The router turns a user query into a system prompt containing only the
//! fragments that matter for it. Sections are rendered with a heading and
//! concatenated with blank-line separators, in a fixed order:
//!
//! 1. Persona (always)
//! 2. Guardrails (always)
//! 3. Domain blocks: one per detected domain, `general` as fallback
//! 4. Capability blocks: only when capability keywords appear
//! 5. Tools block: rendered from the domain-filtered descriptor set
//! 6. Response format: the structured output the LLM must emit
//! 7. User context (optional)
//!
//! Intent detection is pure string work: lowercase the query, report a
//! domain match when any of its keywords is a substring. No randomness, no
//! clock, no LLM: the same query always yields a byte-identical prompt.

use crate::registry::{Domain, ToolDescriptor};

/// A domain-scoped prompt fragment with its trigger keywords.
#[derive(Debug, Clone)]
pub struct DomainBlock {
    /// The domain this block teaches
    pub domain: Domain,

    /// Substring triggers; an empty list means fallback-only
    pub keywords: Vec<&'static str>,

    /// Section heading
    pub heading: &'static str,

    /// Fragment body: decision trees, query shaping, summary templates
    pub body: &'static str,
}

/// A capability fragment loaded only when its keywords appear.
#[derive(Debug, Clone)]
pub struct CapabilityBlock {
    /// Capability name, for logging
    pub name: &'static str,

    /// Substring triggers
    pub keywords: Vec<&'static str>,

    /// Section heading
    pub heading: &'static str,

    /// Fragment body
    pub body: &'static str,
}

const PERSONA: &str = "\
You are Ada, a personal productivity assistant for email and calendar.
You are warm, efficient, and direct. You can read and search the user's
mailbox, send email on explicit request, inspect and manage their calendar,
and present results as rich interactive cards when that helps.";

const GUARDRAILS: &str = "\
- When the user shares how they feel, respond to the feeling first. Do not
  reach for tools until they ask for something actionable.
- Only send email, create events, or respond to invitations when the user
  explicitly asked for that action in this conversation.
- Never fabricate data. In particular, never invent an email address from a
  bare name; if you do not have the address, say so and ask.
- Keep responses professional and concise. Prefer short paragraphs and
  bullet lists over walls of text.";

const EMAIL_BODY: &str = "\
Choosing an email tool:
- \"any new/unread emails\" -> fetch_messages with unreadOnly=true. Add
  filterDate when the user names a day (\"today\", a date).
- Looking for something specific (a sender, a topic, an invoice) ->
  search_emails with the distinctive terms only; drop filler words.
- The user refers to one particular message -> get_message with its id.
- Sending -> send_email, and only on an explicit request with a concrete
  recipient address.

Shaping queries: prefer the user's own nouns (\"invoice\", \"flight
confirmation\") over broad terms. Searching for a person, use their address
when known, otherwise their name verbatim.

Summarizing results: lead with the count (\"You have 4 unread emails\"),
then one line per message: sender, subject, and why it may matter. Call out
anything time-sensitive. If nothing matched, say so plainly.";

const CALENDAR_BODY: &str = "\
Choosing a calendar tool:
- \"what's on my calendar\", \"meetings today/tomorrow\" -> fetch_events
  with the matching date range.
- Creating anything -> create_event, only on explicit request, with the
  exact title and times the user gave.
- Accepting or declining an invitation -> respond_to_event.
- \"when am I free\", \"find a slot\" -> find_free_slots.

Times: resolve relative dates (\"tomorrow\", \"next Tuesday\") against the
user context block before calling tools, and pass ISO 8601 timestamps.

Summarizing results: list events in start-time order with time, title, and
location or meeting link. Flag conflicts and back-to-back meetings.";

const GENERAL_BODY: &str = "\
No specialized workflow matched this request. Answer directly and
conversationally. Use a tool only when one clearly applies; otherwise just
talk to the user. If the request hints at mail or scheduling, ask a short
clarifying question rather than guessing.";

const CUSTOM_UI_BODY: &str = "\
You may return rich UI in the \"widgets\" array of your response. Prefer a
predefined type (email_preview, calendar_event, search_results, form,
meeting_card, flight_card) with its \"data\" object. For bespoke layouts,
use type \"custom\" with a \"vdom\" tree of {component, props, children}
nodes; allowed components are Card, Column, Row, Text, Button, Image,
Divider, and Badge. Mark interactive elements by setting props.action.
Children may be nested nodes or plain strings. Keep trees shallow; three
levels is almost always enough.";

const RESPONSE_FORMAT: &str = "\
Reply with a single JSON object and nothing else - no prose outside it and
no code fences. Fields:
{
  \"thinking\": \"optional short private reasoning\",
  \"tool_calls\": [{\"id\": \"optional\", \"name\": \"tool_name\", \"arguments\": {}}],
  \"response\": \"the user-facing reply as a plain string\",
  \"widgets\": [{\"type\": \"...\", \"data\": {}}]
}
Omit \"tool_calls\" when you need no tools. \"response\" is required and
must be a string. Emit \"widgets\" only when a card genuinely helps.";

/// Assembles system prompts from intent-selected fragments.
pub struct PromptRouter {
    persona: &'static str,
    guardrails: &'static str,
    domains: Vec<DomainBlock>,
    capabilities: Vec<CapabilityBlock>,
    response_format: &'static str,
}

impl Default for PromptRouter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PromptRouter {
    /// The production router: email + calendar + general domains and the
    /// custom-UI capability.
    pub fn with_defaults() -> Self {
        Self {
            persona: PERSONA,
            guardrails: GUARDRAILS,
            domains: vec![
                DomainBlock {
                    domain: Domain::Email,
                    keywords: vec![
                        "email", "e-mail", "inbox", "unread", "mail", "message", "compose",
                        "reply", "draft", "attachment", "invoice", "sender", "newsletter",
                        "subject line",
                    ],
                    heading: "Email workflows",
                    body: EMAIL_BODY,
                },
                DomainBlock {
                    domain: Domain::Calendar,
                    keywords: vec![
                        "calendar", "meeting", "event", "schedule", "appointment", "invite",
                        "invitation", "availability", "free slot", "agenda", "rsvp", "busy",
                        "reschedule",
                    ],
                    heading: "Calendar workflows",
                    body: CALENDAR_BODY,
                },
                DomainBlock {
                    domain: Domain::General,
                    // Fallback only: no keywords, so it never keyword-matches.
                    keywords: vec![],
                    heading: "General assistance",
                    body: GENERAL_BODY,
                },
            ],
            capabilities: vec![CapabilityBlock {
                name: "custom_ui",
                keywords: vec![
                    "custom ui", "widget", "card", "form", "dashboard", "interactive",
                    "button", "chart",
                ],
                heading: "Rich UI output",
                body: CUSTOM_UI_BODY,
            }],
            response_format: RESPONSE_FORMAT,
        }
    }

    /// Detects which domains a query touches. Falls back to `general` when
    /// no keyword matches. Case-insensitive, deterministic.
    pub fn detect_domains(&self, query: &str) -> Vec<Domain> {
        let lowered = query.to_lowercase();
        let mut detected: Vec<Domain> = self
            .domains
            .iter()
            .filter(|block| {
                !block.keywords.is_empty()
                    && block.keywords.iter().any(|kw| lowered.contains(kw))
            })
            .map(|block| block.domain)
            .collect();

        if detected.is_empty() {
            detected.push(Domain::General);
        }
        detected
    }

    /// Detects capability blocks independently of domains; zero or more may
    /// load for one query.
    fn detect_capabilities(&self, query: &str) -> Vec<&CapabilityBlock> {
        let lowered = query.to_lowercase();
        self.capabilities
            .iter()
            .filter(|block| block.keywords.iter().any(|kw| lowered.contains(kw)))
            .collect()
    }

    /// Filters descriptors to the detected domains. Tools without a domain
    /// tag are always included.
    pub fn relevant_tools<'a>(
        &self,
        all: &[&'a ToolDescriptor],
        domains: &[Domain],
    ) -> Vec<&'a ToolDescriptor> {
        all.iter()
            .filter(|descriptor| match descriptor.domain {
                Some(domain) => domains.contains(&domain),
                None => true,
            })
            .copied()
            .collect()
    }

    /// Assembles the full system prompt for a query.
    ///
    /// Pure: the same `(query, tools, user_context)` yields byte-identical
    /// output.
    pub fn assemble(
        &self,
        query: &str,
        tools: &[&ToolDescriptor],
        user_context: Option<&str>,
    ) -> String {
        let domains = self.detect_domains(query);
        let mut sections: Vec<String> = Vec::new();

        sections.push(format!("## Persona\n{}", self.persona));
        sections.push(format!("## Guardrails\n{}", self.guardrails));

        for block in &self.domains {
            if domains.contains(&block.domain) {
                sections.push(format!("## {}\n{}", block.heading, block.body));
            }
        }

        for capability in self.detect_capabilities(query) {
            log::debug!("Loading capability block {}", capability.name);
            sections.push(format!("## {}\n{}", capability.heading, capability.body));
        }

        sections.push(format!("## Available tools\n{}", render_tools_block(tools)));
        sections.push(format!("## Response format\n{}", self.response_format));

        if let Some(context) = user_context {
            sections.push(format!("## User context\n{}", context));
        }

        sections.join("\n\n")
    }
}

/// Renders the tools block from a descriptor set.
fn render_tools_block(tools: &[&ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "No tools available.".to_string();
    }

    let mut out = String::new();
    for (i, descriptor) in tools.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("### {}\n{}", descriptor.name, descriptor.description));

        if !descriptor.params.is_empty() {
            out.push_str("\nParameters:");
            for (name, spec) in &descriptor.params {
                let requirement = if descriptor.required.contains(name) {
                    "required"
                } else {
                    "optional"
                };
                out.push_str(&format!(
                    "\n- {} ({}, {}): {}",
                    name, spec.kind, requirement, spec.description
                ));
                if let Some(values) = &spec.enum_values {
                    out.push_str(&format!(" One of: {}.", values.join(", ")));
                }
                if let Some(default) = &spec.default {
                    out.push_str(&format!(" Default: {}.", default));
                }
            }
        }

        if let Some(hint) = &descriptor.hints.when_to_use {
            out.push_str(&format!("\nUse when: {}", hint));
        }
        if let Some(hint) = &descriptor.hints.when_not_to_use {
            out.push_str(&format!("\nAvoid when: {}", hint));
        }
        if let Some(hint) = &descriptor.hints.prerequisites {
            out.push_str(&format!("\nRequires: {}", hint));
        }
        out.push_str(&format!("\nReturns: {}", descriptor.hints.output));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{tool, Domain, OutputShape, ToolRegistry};
    use crate::types::ToolResult;
    use serde_json::json;

    fn sample_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            tool("fetch_messages", "Fetch recent messages from the mailbox")
                .domain(Domain::Email)
                .param("unreadOnly", "boolean", "Only unread messages")
                .output(OutputShape::Both)
                .build(|_| async move { Ok(ToolResult::ok(json!({}))) }),
        );
        registry.register(
            tool("fetch_events", "Fetch calendar events in a range")
                .domain(Domain::Calendar)
                .build(|_| async move { Ok(ToolResult::ok(json!({}))) }),
        );
        registry.register(
            tool("get_current_time", "Report the current time")
                .build(|_| async move { Ok(ToolResult::ok(json!({}))) }),
        );
        registry
    }

    #[test]
    fn test_detects_email_domain() {
        let router = PromptRouter::with_defaults();
        assert_eq!(router.detect_domains("any unread messages?"), vec![Domain::Email]);
        assert_eq!(
            router.detect_domains("ANY UNREAD MESSAGES?"),
            vec![Domain::Email]
        );
    }

    #[test]
    fn test_detects_multiple_domains() {
        let router = PromptRouter::with_defaults();
        let domains =
            router.detect_domains("email me the agenda for tomorrow's meeting");
        assert!(domains.contains(&Domain::Email));
        assert!(domains.contains(&Domain::Calendar));
    }

    #[test]
    fn test_falls_back_to_general() {
        let router = PromptRouter::with_defaults();
        assert_eq!(
            router.detect_domains("not feeling well today"),
            vec![Domain::General]
        );
    }

    #[test]
    fn test_detection_is_deterministic() {
        let router = PromptRouter::with_defaults();
        let query = "show my inbox and my schedule";
        assert_eq!(router.detect_domains(query), router.detect_domains(query));
    }

    #[test]
    fn test_relevant_tools_includes_undomained() {
        let router = PromptRouter::with_defaults();
        let registry = sample_registry();
        let all = registry.all_descriptors();

        let relevant = router.relevant_tools(&all, &[Domain::Email]);
        let names: Vec<&str> = relevant.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fetch_messages", "get_current_time"]);
    }

    #[test]
    fn test_assembly_is_byte_identical() {
        let router = PromptRouter::with_defaults();
        let registry = sample_registry();
        let all = registry.all_descriptors();
        let tools = router.relevant_tools(&all, &[Domain::Email]);

        let a = router.assemble("any unread messages", &tools, Some("It is Friday."));
        let b = router.assemble("any unread messages", &tools, Some("It is Friday."));
        assert_eq!(a, b);
    }

    #[test]
    fn test_assembly_section_order() {
        let router = PromptRouter::with_defaults();
        let registry = sample_registry();
        let all = registry.all_descriptors();
        let tools = router.relevant_tools(&all, &[Domain::Email]);

        let prompt = router.assemble("any unread messages", &tools, Some("ctx"));
        let persona = prompt.find("## Persona").unwrap();
        let guardrails = prompt.find("## Guardrails").unwrap();
        let email = prompt.find("## Email workflows").unwrap();
        let tools_at = prompt.find("## Available tools").unwrap();
        let format = prompt.find("## Response format").unwrap();
        let context = prompt.find("## User context").unwrap();

        assert!(persona < guardrails);
        assert!(guardrails < email);
        assert!(email < tools_at);
        assert!(tools_at < format);
        assert!(format < context);

        // Calendar block must not load for an email-only query.
        assert!(!prompt.contains("## Calendar workflows"));
    }

    #[test]
    fn test_capability_block_loads_on_keyword() {
        let router = PromptRouter::with_defaults();
        let with = router.assemble("build me a dashboard of my inbox", &[], None);
        assert!(with.contains("## Rich UI output"));

        let without = router.assemble("any unread messages", &[], None);
        assert!(!without.contains("## Rich UI output"));
    }

    #[test]
    fn test_empty_tools_block() {
        let router = PromptRouter::with_defaults();
        let prompt = router.assemble("hello there", &[], None);
        assert!(prompt.contains("No tools available."));
    }

    #[test]
    fn test_tools_block_marks_required_and_optional() {
        let registry = {
            let mut r = ToolRegistry::new();
            r.register(
                tool("search_emails", "Search the mailbox")
                    .domain(Domain::Email)
                    .required_param("query", "string", "Search terms")
                    .param("limit", "integer", "Max results")
                    .build(|_| async move { Ok(ToolResult::ok(json!({}))) }),
            );
            r
        };
        let all = registry.all_descriptors();
        let block = render_tools_block(&all);

        assert!(block.contains("- query (string, required): Search terms"));
        assert!(block.contains("- limit (integer, optional): Max results"));
    }

    #[test]
    fn test_user_context_is_optional() {
        let router = PromptRouter::with_defaults();
        let prompt = router.assemble("hello", &[], None);
        assert!(!prompt.contains("## User context"));
    }
}
