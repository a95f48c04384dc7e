//! Cross-module integration tests: registry, router, parser, and executor
//! working together the way the orchestrator drives them.

use serde_json::json;
use std::sync::Arc;

use inbox_agent::{
    build_registry, parse_response, sse_encode, tool, AgentConfig, Domain, PromptRouter,
    StreamEvent, ToolExecutor, ToolRegistry, ToolResult,
};

#[test]
fn email_query_routes_email_tools_into_the_prompt() {
    let config = AgentConfig::default();
    let registry = build_registry(&config, None);
    let router = PromptRouter::with_defaults();

    let query = "any unread messages?";
    let domains = router.detect_domains(query);
    assert_eq!(domains, vec![Domain::Email]);

    let all = registry.all_descriptors();
    let tools = router.relevant_tools(&all, &domains);
    let names: Vec<&str> = tools.iter().map(|d| d.name.as_str()).collect();

    assert!(names.contains(&"fetch_messages"));
    assert!(names.contains(&"search_emails"));
    assert!(names.contains(&"get_current_time"));
    assert!(!names.contains(&"fetch_events"));

    let prompt = router.assemble(query, &tools, None);
    assert!(prompt.contains("### fetch_messages"));
    assert!(prompt.contains("### send_email"));
    assert!(!prompt.contains("### create_event"));
}

#[test]
fn calendar_query_excludes_email_tools() {
    let config = AgentConfig::default();
    let registry = build_registry(&config, None);
    let router = PromptRouter::with_defaults();

    let domains = router.detect_domains("what meetings do I have tomorrow?");
    assert_eq!(domains, vec![Domain::Calendar]);

    let all = registry.all_descriptors();
    let tools = router.relevant_tools(&all, &domains);
    let names: Vec<&str> = tools.iter().map(|d| d.name.as_str()).collect();

    assert!(names.contains(&"fetch_events"));
    assert!(names.contains(&"find_free_slots"));
    assert!(!names.contains(&"fetch_messages"));
}

#[test]
fn no_keyword_query_offers_only_undomained_tools() {
    let config = AgentConfig::default();
    let registry = build_registry(&config, None);
    let router = PromptRouter::with_defaults();

    let domains = router.detect_domains("how are you doing?");
    assert_eq!(domains, vec![Domain::General]);

    let all = registry.all_descriptors();
    let tools = router.relevant_tools(&all, &domains);
    let names: Vec<&str> = tools.iter().map(|d| d.name.as_str()).collect();

    assert_eq!(names, vec!["get_current_time"]);
}

#[test]
fn prompt_for_empty_registry_says_no_tools() {
    let router = PromptRouter::with_defaults();
    let registry = ToolRegistry::new();
    let all = registry.all_descriptors();
    let tools = router.relevant_tools(&all, &[Domain::General]);

    let prompt = router.assemble("hello", &tools, None);
    assert!(prompt.contains("No tools available."));
    assert!(prompt.contains("## Response format"));
}

#[tokio::test]
async fn parsed_tool_calls_dispatch_through_the_executor() {
    // The same handoff the orchestrator performs: raw LLM text in, results
    // keyed by call id out.
    let raw = r#"```json
{
  "thinking": "two lookups",
  "tool_calls": [
    {"id": "call-a", "name": "echo", "arguments": {"text": "first"}},
    {"name": "echo", "arguments": {"text": "second"}},
  ],
  "response": ""
}
```"#;

    let parsed = parse_response(raw);
    assert_eq!(parsed.tool_calls.len(), 2);
    assert_eq!(parsed.tool_calls[0].id, "call-a");
    assert!(parsed.tool_calls[1].id.starts_with("tool-"));

    let mut registry = ToolRegistry::new();
    registry.register(
        tool("echo", "Echo arguments")
            .required_param("text", "string", "Text to echo")
            .build(|args| async move { Ok(ToolResult::ok(args)) }),
    );
    let executor = ToolExecutor::new(Arc::new(registry));

    let results = executor.execute_many(&parsed.tool_calls).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "call-a");
    assert_eq!(results[0].1.data.as_ref().unwrap()["text"], "first");
    assert_eq!(results[1].1.data.as_ref().unwrap()["text"], "second");
}

#[tokio::test]
async fn mixed_batch_collects_every_result() {
    let mut registry = ToolRegistry::new();
    registry.register(
        tool("works", "Succeeds")
            .build(|_| async move { Ok(ToolResult::ok(json!({"ok": true}))) }),
    );
    let executor = ToolExecutor::new(Arc::new(registry));

    let parsed = parse_response(
        r#"{"tool_calls": [{"id": "x", "name": "works", "arguments": {}}, {"id": "y", "name": "missing_tool", "arguments": {}}], "response": ""}"#,
    );
    let results = executor.execute_many(&parsed.tool_calls).await;

    assert_eq!(results.len(), 2);
    assert!(results[0].1.success);
    assert!(!results[1].1.success);
    assert!(results[1].1.error.as_ref().unwrap().contains("Unknown tool"));
}

#[test]
fn registry_round_trip_restores_original_state() {
    let config = AgentConfig::default();
    let mut registry = build_registry(&config, None);
    let before = registry.all_names();

    registry.register(
        tool("scratch", "Temporary").build(|_| async move { Ok(ToolResult::ok(json!({}))) }),
    );
    assert!(registry.unregister("scratch"));

    assert_eq!(registry.all_names(), before);
}

#[test]
fn stream_events_encode_for_the_wire() {
    let encoded = sse_encode(&StreamEvent::Status {
        status: "Thinking...".to_string(),
    });
    assert_eq!(encoded, "data: {\"type\":\"status\",\"status\":\"Thinking...\"}\n\n");

    let event: StreamEvent =
        serde_json::from_str(encoded.trim_start_matches("data: ").trim()).unwrap();
    assert!(matches!(event, StreamEvent::Status { .. }));
}

#[test]
fn prompt_assembly_is_stable_across_calls() {
    let config = AgentConfig::default();
    let registry = build_registry(&config, None);
    let router = PromptRouter::with_defaults();

    let all = registry.all_descriptors();
    let domains = router.detect_domains("schedule a meeting about the invoice");
    let tools = router.relevant_tools(&all, &domains);

    let first = router.assemble("schedule a meeting about the invoice", &tools, Some("ctx"));
    let second = router.assemble("schedule a meeting about the invoice", &tools, Some("ctx"));
    assert_eq!(first, second);

    // Both domains matched, so both workflow blocks are present.
    assert!(first.contains("## Email workflows"));
    assert!(first.contains("## Calendar workflows"));
}
