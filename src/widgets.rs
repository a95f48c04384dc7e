//! Widget model and generation.
//!
//! Widgets are typed UI descriptors the client renders alongside streamed
//! text. Two families exist:
//!
//! - **Predefined**: a `type` from a known set (`email_preview`,
//!   `calendar_event`, `search_results`, `form`, `meeting_card`,
//!   `flight_card`) with a type-specific `data` payload. When the LLM emits
//!   one without actions, sensible defaults are inferred per type.
//! - **Custom**: `type = "custom"` carrying a [`VdomNode`] tree of
//!   whitelisted components.
//!
//! Widget ids are minted from a process-wide monotonic counter so every
//! block is uniquely addressable by client-side actions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ToolResult;

/// The predefined widget types the client knows how to render.
pub const KNOWN_WIDGET_TYPES: &[&str] = &[
    "email_preview",
    "calendar_event",
    "search_results",
    "form",
    "meeting_card",
    "flight_card",
];

/// Type name for vdom-backed widgets.
pub const CUSTOM_WIDGET_TYPE: &str = "custom";

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

/// Mints a process-unique widget id.
pub fn next_widget_id() -> String {
    format!("widget-{}", NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed))
}

/// A node in a custom widget's component tree.
///
/// `props.action` marks interactive bindings; children are nested nodes or
/// bare strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VdomNode {
    /// Whitelisted component name (e.g. "Card", "Button", "Text")
    pub component: String,

    /// Component properties; `action` marks an interactive binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Map<String, Value>>,

    /// Child nodes or text runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<VdomChild>,
}

/// A child of a [`VdomNode`]: either another node or a text run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VdomChild {
    /// Plain text content
    Text(String),
    /// Nested component
    Node(VdomNode),
}

/// A renderable widget block as emitted on the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetBlock {
    /// Process-unique id, addressable by client widget actions
    pub id: String,

    /// Widget type: one of [`KNOWN_WIDGET_TYPES`] or `"custom"`
    #[serde(rename = "type")]
    pub widget_type: String,

    /// Type-specific payload
    pub data: Value,

    /// Action names the client offers on this widget
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,

    /// Component tree for `type = "custom"` widgets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdom: Option<VdomNode>,
}

impl WidgetBlock {
    /// Creates a predefined widget block with a fresh id.
    pub fn new(widget_type: impl Into<String>, data: Value, actions: Vec<String>) -> Self {
        Self {
            id: next_widget_id(),
            widget_type: widget_type.into(),
            data,
            actions,
            vdom: None,
        }
    }

    /// Creates a custom widget block from a vdom tree.
    pub fn custom(vdom: VdomNode) -> Self {
        Self {
            id: next_widget_id(),
            widget_type: CUSTOM_WIDGET_TYPE.to_string(),
            data: Value::Null,
            actions: Vec::new(),
            vdom: Some(vdom),
        }
    }
}

/// A widget as the LLM describes it, before validation and id assignment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WidgetDescriptor {
    /// Requested widget type
    #[serde(rename = "type", default)]
    pub widget_type: String,

    /// Type-specific payload
    #[serde(default)]
    pub data: Option<Value>,

    /// Explicit actions; when absent, defaults are inferred per type
    #[serde(default)]
    pub actions: Option<Vec<String>>,

    /// Component tree for custom widgets
    #[serde(default)]
    pub vdom: Option<VdomNode>,
}

/// Collects widgets from successful tool results, in result-insertion order.
///
/// Failed results never contribute widgets; their errors travel back to the
/// LLM through the tool-results message instead.
pub fn from_tool_results(results: &[(String, ToolResult)]) -> Vec<WidgetBlock> {
    let mut out = Vec::new();
    for (_, result) in results {
        if result.success {
            out.extend(result.widgets.iter().cloned());
        }
    }
    out
}

/// Validates LLM-emitted descriptors and turns them into renderable blocks.
///
/// Descriptors that fail validation are dropped with a warning; a bad widget
/// never fails the turn.
pub fn from_llm(descriptors: &[WidgetDescriptor]) -> Vec<WidgetBlock> {
    let mut out = Vec::new();
    for descriptor in descriptors {
        match build_from_descriptor(descriptor) {
            Some(block) => out.push(block),
            None => log::warn!(
                "Dropping invalid widget descriptor of type {:?}",
                descriptor.widget_type
            ),
        }
    }
    out
}

fn build_from_descriptor(descriptor: &WidgetDescriptor) -> Option<WidgetBlock> {
    if descriptor.widget_type == CUSTOM_WIDGET_TYPE {
        let vdom = descriptor.vdom.clone()?;
        let mut block = WidgetBlock::custom(vdom);
        if let Some(data) = &descriptor.data {
            block.data = data.clone();
        }
        return Some(block);
    }

    if !KNOWN_WIDGET_TYPES.contains(&descriptor.widget_type.as_str()) {
        return None;
    }

    let data = descriptor.data.clone()?;
    if !validate_data(&descriptor.widget_type, &data) {
        return None;
    }

    let actions = descriptor
        .actions
        .clone()
        .unwrap_or_else(|| default_actions(&descriptor.widget_type, &data));

    Some(WidgetBlock::new(descriptor.widget_type.clone(), data, actions))
}

/// Shallow schema check: the minimal keys each predefined type needs.
fn validate_data(widget_type: &str, data: &Value) -> bool {
    let Some(obj) = data.as_object() else {
        return false;
    };
    match widget_type {
        "email_preview" => obj.contains_key("from") && obj.contains_key("subject"),
        "calendar_event" => obj.contains_key("title") && obj.contains_key("start"),
        "search_results" => obj.get("results").map(Value::is_array).unwrap_or(false),
        "form" => obj.get("fields").map(Value::is_array).unwrap_or(false),
        "meeting_card" => obj.contains_key("title"),
        "flight_card" => obj.contains_key("flight"),
        _ => false,
    }
}

/// Default actions appropriate to each predefined type.
fn default_actions(widget_type: &str, data: &Value) -> Vec<String> {
    let has_meeting_link = data
        .get("meetingLink")
        .and_then(Value::as_str)
        .map(|s| !s.is_empty())
        .unwrap_or(false);

    let actions: &[&str] = match widget_type {
        "email_preview" => &["reply", "archive", "open"],
        "calendar_event" if has_meeting_link => &["join", "decline", "details"],
        "calendar_event" => &["accept", "decline", "details"],
        "search_results" => &["open"],
        "form" => &["submit"],
        "meeting_card" => &["join", "copy_link"],
        "flight_card" => &["check_in", "details"],
        _ => &[],
    };
    actions.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_widget_ids_are_unique() {
        let a = next_widget_id();
        let b = next_widget_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_tool_results_skips_failures() {
        let ok = ToolResult::ok_with_widgets(
            json!({"count": 1}),
            vec![WidgetBlock::new(
                "email_preview",
                json!({"from": "a@b.c", "subject": "hi"}),
                vec![],
            )],
        );
        let failed = ToolResult::err("boom");

        let results = vec![("call-1".to_string(), ok), ("call-2".to_string(), failed)];
        let widgets = from_tool_results(&results);
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].widget_type, "email_preview");
    }

    #[test]
    fn test_from_tool_results_preserves_insertion_order() {
        let first = ToolResult::ok_with_widgets(
            Value::Null,
            vec![WidgetBlock::new("meeting_card", json!({"title": "A"}), vec![])],
        );
        let second = ToolResult::ok_with_widgets(
            Value::Null,
            vec![WidgetBlock::new("meeting_card", json!({"title": "B"}), vec![])],
        );

        let results = vec![("x".to_string(), first), ("y".to_string(), second)];
        let widgets = from_tool_results(&results);
        assert_eq!(widgets[0].data["title"], "A");
        assert_eq!(widgets[1].data["title"], "B");
    }

    #[test]
    fn test_from_llm_email_preview_default_actions() {
        let descriptor = WidgetDescriptor {
            widget_type: "email_preview".to_string(),
            data: Some(json!({"from": "pat@example.com", "subject": "Q3 invoice"})),
            actions: None,
            vdom: None,
        };
        let blocks = from_llm(&[descriptor]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].actions, vec!["reply", "archive", "open"]);
    }

    #[test]
    fn test_from_llm_calendar_event_meeting_link_actions() {
        let with_link = WidgetDescriptor {
            widget_type: "calendar_event".to_string(),
            data: Some(json!({
                "title": "Standup",
                "start": "2026-08-01T09:00:00Z",
                "meetingLink": "https://meet.example.com/abc"
            })),
            actions: None,
            vdom: None,
        };
        let without_link = WidgetDescriptor {
            widget_type: "calendar_event".to_string(),
            data: Some(json!({"title": "Lunch", "start": "2026-08-01T12:00:00Z"})),
            actions: None,
            vdom: None,
        };

        let blocks = from_llm(&[with_link, without_link]);
        assert_eq!(blocks[0].actions, vec!["join", "decline", "details"]);
        assert_eq!(blocks[1].actions, vec!["accept", "decline", "details"]);
    }

    #[test]
    fn test_from_llm_drops_unknown_type() {
        let descriptor = WidgetDescriptor {
            widget_type: "hologram".to_string(),
            data: Some(json!({"anything": true})),
            actions: None,
            vdom: None,
        };
        assert!(from_llm(&[descriptor]).is_empty());
    }

    #[test]
    fn test_from_llm_drops_invalid_data() {
        let descriptor = WidgetDescriptor {
            widget_type: "email_preview".to_string(),
            data: Some(json!({"subject": "no sender"})),
            actions: None,
            vdom: None,
        };
        assert!(from_llm(&[descriptor]).is_empty());
    }

    #[test]
    fn test_from_llm_custom_requires_vdom() {
        let missing_vdom = WidgetDescriptor {
            widget_type: "custom".to_string(),
            data: None,
            actions: None,
            vdom: None,
        };
        assert!(from_llm(&[missing_vdom]).is_empty());

        let with_vdom = WidgetDescriptor {
            widget_type: "custom".to_string(),
            data: None,
            actions: None,
            vdom: Some(VdomNode {
                component: "Card".to_string(),
                props: None,
                children: vec![VdomChild::Text("hello".to_string())],
            }),
        };
        let blocks = from_llm(&[with_vdom]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].widget_type, "custom");
        assert!(blocks[0].vdom.is_some());
    }

    #[test]
    fn test_explicit_actions_win_over_defaults() {
        let descriptor = WidgetDescriptor {
            widget_type: "email_preview".to_string(),
            data: Some(json!({"from": "x@y.z", "subject": "s"})),
            actions: Some(vec!["archive".to_string()]),
            vdom: None,
        };
        let blocks = from_llm(&[descriptor]);
        assert_eq!(blocks[0].actions, vec!["archive"]);
    }

    #[test]
    fn test_vdom_child_deserializes_text_and_node() {
        let raw = json!({
            "component": "Column",
            "children": [
                "plain text",
                {"component": "Button", "props": {"action": "confirm"}}
            ]
        });
        let node: VdomNode = serde_json::from_value(raw).unwrap();
        assert_eq!(node.children.len(), 2);
        assert!(matches!(node.children[0], VdomChild::Text(_)));
        assert!(matches!(node.children[1], VdomChild::Node(_)));
    }
}
