//! Tool handler binding: the per-request registry.
//!
//! Tool handlers need the request's session to talk to the mail and
//! calendar APIs. Instead of installing the session on shared provider
//! singletons (which would race across concurrent requests), each request
//! gets fresh provider objects closed over by freshly-built handlers. The
//! registry itself is cheap to construct; descriptors are static data and
//! handlers are thin closures.
//!
//! A request without a session still gets the full tool set: handlers
//! self-report the missing session in their results so the LLM can tell
//! the user to sign in, rather than the turn failing outright.

use chrono::Utc;
use chrono_tz::Tz;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::calendar::{event_widget, CalendarApi, EventDraft};
use crate::config::AgentConfig;
use crate::email::{message_widget, EmailApi};
use crate::registry::{tool, ActionKind, Domain, OutputShape, ToolRegistry};
use crate::types::{SessionInfo, ToolResult};

const NO_MAIL_SESSION: &str =
    "No active mail session. Ask the user to sign in again before retrying.";
const NO_CALENDAR_SESSION: &str =
    "No active calendar session. Ask the user to sign in again before retrying.";

/// Builds the registry for one request, binding handlers to provider
/// objects constructed from this request's session.
pub fn build_registry(config: &AgentConfig, session: Option<&SessionInfo>) -> ToolRegistry {
    let email: Option<Arc<EmailApi>> = session.and_then(|s| match EmailApi::new(s) {
        Ok(api) => Some(Arc::new(api)),
        Err(e) => {
            log::warn!("Mail API unavailable for this request: {}", e);
            None
        }
    });
    let calendar: Option<Arc<CalendarApi>> =
        session.map(|s| Arc::new(CalendarApi::new(s, config.calendar_env())));

    let mut registry = ToolRegistry::new();
    register_email_tools(&mut registry, email);
    register_calendar_tools(&mut registry, calendar);
    register_general_tools(&mut registry, config.timezone().to_string());
    registry
}

fn register_email_tools(registry: &mut ToolRegistry, email: Option<Arc<EmailApi>>) {
    let api = email.clone();
    registry.register(
        tool("fetch_messages", "Fetch recent messages from the user's mailbox.")
            .domain(Domain::Email)
            .kind(ActionKind::Api)
            .param("unreadOnly", "boolean", "Return only unread messages")
            .param(
                "filterDate",
                "string",
                "Restrict to one day, formatted YYYY-MM-DD",
            )
            .param("limit", "integer", "Maximum messages to return")
            .default_value(json!(20))
            .when_to_use("The user asks about new, recent, or unread mail")
            .when_not_to_use("The user is looking for something specific; use search_emails")
            .output(OutputShape::Both)
            .build(move |args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_MAIL_SESSION));
                    };
                    let unread_only = args
                        .get("unreadOnly")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    let filter_date = args
                        .get("filterDate")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    let limit =
                        args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;

                    let messages = api
                        .fetch_messages(unread_only, filter_date.as_deref(), limit)
                        .await?;
                    let widgets = messages.iter().map(message_widget).collect();
                    Ok(ToolResult::ok_with_widgets(
                        json!({"count": messages.len(), "messages": messages}),
                        widgets,
                    ))
                }
            }),
    );

    let api = email.clone();
    registry.register(
        tool("search_emails", "Search the mailbox by sender, subject, or content.")
            .domain(Domain::Email)
            .kind(ActionKind::Api)
            .required_param("query", "string", "Search terms; distinctive words only")
            .param("limit", "integer", "Maximum results to return")
            .default_value(json!(20))
            .when_to_use("The user wants specific messages (a sender, a topic, an invoice)")
            .output(OutputShape::Both)
            .build(move |args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_MAIL_SESSION));
                    };
                    let query = args
                        .get("query")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let limit =
                        args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;

                    let messages = api.search(&query, limit).await?;
                    let widgets = messages.iter().map(message_widget).collect();
                    Ok(ToolResult::ok_with_widgets(
                        json!({"count": messages.len(), "messages": messages}),
                        widgets,
                    ))
                }
            }),
    );

    let api = email.clone();
    registry.register(
        tool("get_message", "Fetch one message in full by its id.")
            .domain(Domain::Email)
            .kind(ActionKind::Api)
            .required_param("messageId", "string", "Id of the message to fetch")
            .prerequisites("A message id from an earlier fetch or search result")
            .output(OutputShape::Text)
            .build(move |args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_MAIL_SESSION));
                    };
                    let id = args
                        .get("messageId")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let message = api.get_message(&id).await?;
                    Ok(ToolResult::ok(json!({"message": message})))
                }
            }),
    );

    registry.register(
        tool("send_email", "Send an email on the user's behalf.")
            .domain(Domain::Email)
            .kind(ActionKind::Api)
            .array_param("to", "string", "Recipient addresses")
            .required_param("subject", "string", "Subject line")
            .required_param("body", "string", "Message body")
            .when_to_use("Only when the user explicitly asked to send this email")
            .when_not_to_use("Never send unprompted, and never to a guessed address")
            .output(OutputShape::Text)
            .build(move |args| {
                let api = email.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_MAIL_SESSION));
                    };
                    let to: Vec<String> = match args.get("to") {
                        Some(Value::Array(items)) => items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect(),
                        Some(Value::String(one)) => vec![one.clone()],
                        _ => Vec::new(),
                    };
                    if to.is_empty() {
                        return Ok(ToolResult::err(
                            "No recipient address given; ask the user for one.",
                        ));
                    }
                    let subject = args
                        .get("subject")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let body = args.get("body").and_then(Value::as_str).unwrap_or_default();

                    let receipt = api.send(&to, subject, body).await?;
                    Ok(ToolResult::ok(json!({"sent": true, "receipt": receipt})))
                }
            }),
    );
}

fn register_calendar_tools(registry: &mut ToolRegistry, calendar: Option<Arc<CalendarApi>>) {
    let api = calendar.clone();
    registry.register(
        tool("fetch_events", "Fetch calendar events in a time range.")
            .domain(Domain::Calendar)
            .kind(ActionKind::Api)
            .required_param("start", "string", "Range start, RFC 3339")
            .required_param("end", "string", "Range end, RFC 3339")
            .when_to_use("The user asks what is on their calendar")
            .output(OutputShape::Both)
            .build(move |args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_CALENDAR_SESSION));
                    };
                    let start = args.get("start").and_then(Value::as_str).unwrap_or_default();
                    let end = args.get("end").and_then(Value::as_str).unwrap_or_default();

                    let events = api.fetch_events(start, end).await?;
                    let widgets = events.iter().map(event_widget).collect();
                    Ok(ToolResult::ok_with_widgets(
                        json!({"count": events.len(), "events": events}),
                        widgets,
                    ))
                }
            }),
    );

    let api = calendar.clone();
    registry.register(
        tool("create_event", "Create a calendar event.")
            .domain(Domain::Calendar)
            .kind(ActionKind::Api)
            .required_param("title", "string", "Event title")
            .required_param("start", "string", "Start time, RFC 3339")
            .param("end", "string", "End time, RFC 3339")
            .array_param("attendees", "string", "Attendee addresses to invite")
            .param("location", "string", "Free-form location")
            .param("description", "string", "Longer description")
            .when_to_use("Only when the user explicitly asked to schedule something")
            .output(OutputShape::Both)
            .build(move |args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_CALENDAR_SESSION));
                    };
                    let draft = EventDraft {
                        title: args
                            .get("title")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        start: args
                            .get("start")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        end: args.get("end").and_then(Value::as_str).map(str::to_string),
                        attendees: args
                            .get("attendees")
                            .and_then(Value::as_array)
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default(),
                        location: args
                            .get("location")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        description: args
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    };

                    let event = api.create_event(&draft).await?;
                    let widget = event_widget(&event);
                    Ok(ToolResult::ok_with_widgets(
                        json!({"created": true, "event": event}),
                        vec![widget],
                    ))
                }
            }),
    );

    let api = calendar.clone();
    registry.register(
        tool("list_calendars", "List the user's visible calendars.")
            .domain(Domain::Calendar)
            .kind(ActionKind::Api)
            .when_to_use("The user asks which calendars they have or where an event lives")
            .output(OutputShape::Text)
            .build(move |_args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_CALENDAR_SESSION));
                    };
                    let calendars = api.list_calendars().await?;
                    Ok(ToolResult::ok(
                        json!({"count": calendars.len(), "calendars": calendars}),
                    ))
                }
            }),
    );

    let api = calendar.clone();
    registry.register(
        tool("respond_to_event", "Accept, decline, or tentatively respond to an invitation.")
            .domain(Domain::Calendar)
            .kind(ActionKind::Api)
            .required_param("eventId", "string", "Id of the invitation")
            .enum_param("response", "The reply to send", &["accept", "decline", "tentative"])
            .when_to_use("Only when the user explicitly asked to respond")
            .output(OutputShape::Text)
            .build(move |args| {
                let api = api.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_CALENDAR_SESSION));
                    };
                    let event_id = args
                        .get("eventId")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let response = args
                        .get("response")
                        .and_then(Value::as_str)
                        .unwrap_or_default();

                    let receipt = api.respond(event_id, response).await?;
                    Ok(ToolResult::ok(json!({"responded": response, "receipt": receipt})))
                }
            }),
    );

    registry.register(
        tool("find_free_slots", "Find free time slots on a given day.")
            .domain(Domain::Calendar)
            .kind(ActionKind::Api)
            .required_param("date", "string", "Day to check, formatted YYYY-MM-DD")
            .param("durationMinutes", "integer", "Minimum slot length in minutes")
            .default_value(json!(30))
            .when_to_use("The user asks when they are free or wants a slot suggestion")
            .output(OutputShape::Text)
            .build(move |args| {
                let api = calendar.clone();
                async move {
                    let Some(api) = api else {
                        return Ok(ToolResult::err(NO_CALENDAR_SESSION));
                    };
                    let date = args.get("date").and_then(Value::as_str).unwrap_or_default();
                    let duration = args
                        .get("durationMinutes")
                        .and_then(Value::as_u64)
                        .unwrap_or(30) as u32;

                    let slots = api.free_slots(date, duration).await?;
                    Ok(ToolResult::ok(json!({"count": slots.len(), "slots": slots})))
                }
            }),
    );
}

fn register_general_tools(registry: &mut ToolRegistry, default_timezone: String) {
    // Undomained: offered regardless of detected intent.
    registry.register(
        tool("get_current_time", "Report the current date and time.")
            .kind(ActionKind::Internal)
            .param("timezone", "string", "IANA timezone identifier")
            .output(OutputShape::Text)
            .build(move |args| {
                let default_timezone = default_timezone.clone();
                async move {
                    let requested = args
                        .get("timezone")
                        .and_then(Value::as_str)
                        .unwrap_or(&default_timezone);
                    let zone = requested.parse::<Tz>().unwrap_or(Tz::UTC);
                    let now = Utc::now().with_timezone(&zone);
                    Ok(ToolResult::ok(json!({
                        "iso": now.to_rfc3339(),
                        "formatted": now.format("%A, %B %-d, %Y at %-I:%M %p %Z").to_string(),
                        "timezone": zone.name(),
                    })))
                }
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ToolExecutor;
    use crate::types::ToolCall;

    fn sessionless_registry() -> ToolRegistry {
        build_registry(&AgentConfig::default(), None)
    }

    #[test]
    fn test_full_tool_set_registered() {
        let registry = sessionless_registry();
        let names = registry.all_names();
        for expected in [
            "fetch_messages",
            "search_emails",
            "get_message",
            "send_email",
            "fetch_events",
            "create_event",
            "list_calendars",
            "respond_to_event",
            "find_free_slots",
            "get_current_time",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_domain_views() {
        let registry = sessionless_registry();

        let email = registry.by_domain(&[Domain::Email]);
        assert!(email.iter().any(|d| d.name == "fetch_messages"));
        assert!(!email.iter().any(|d| d.name == "fetch_events"));
        // The undomained clock tool shows up everywhere.
        assert!(email.iter().any(|d| d.name == "get_current_time"));
    }

    #[tokio::test]
    async fn test_sessionless_email_tool_self_reports() {
        let registry = Arc::new(sessionless_registry());
        let executor = ToolExecutor::new(registry);

        let call = ToolCall::new(
            "c1",
            "fetch_messages",
            serde_json::Map::new(),
        );
        let result = executor.execute(&call).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("sign in"));
    }

    #[tokio::test]
    async fn test_get_current_time_works_without_session() {
        let registry = Arc::new(sessionless_registry());
        let executor = ToolExecutor::new(registry);

        let mut args = serde_json::Map::new();
        args.insert("timezone".to_string(), json!("Europe/Berlin"));
        let result = executor
            .execute(&ToolCall::new("c1", "get_current_time", args))
            .await;

        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["timezone"], "Europe/Berlin");
        assert!(data["formatted"].as_str().unwrap().contains("at"));
    }

    #[tokio::test]
    async fn test_send_email_requires_recipient() {
        let session = SessionInfo {
            session: "tok".to_string(),
            base_url: Some("https://mail.example.com/api".to_string()),
            cluster_id: None,
        };
        let registry = Arc::new(build_registry(&AgentConfig::default(), Some(&session)));
        let executor = ToolExecutor::new(registry);

        let mut args = serde_json::Map::new();
        args.insert("subject".to_string(), json!("hi"));
        args.insert("body".to_string(), json!("text"));
        let result = executor
            .execute(&ToolCall::new("c1", "send_email", args))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("recipient"));
    }
}
