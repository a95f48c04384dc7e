//! Forgiving parser for structured LLM output.
//!
//! The LLM is instructed to emit a single JSON object, but real models
//! wander: they wrap JSON in code fences, add prose around it, leave
//! trailing commas, break string literals across raw newlines, or return
//! `response` as an object instead of a string. Each of those observed
//! failure modes is a first-class case here, handled by a ladder:
//!
//! 1. Unwrap a fenced code block labeled `json` (or unlabeled).
//! 2. Slice from the first `{` to the last `}`.
//! 3. Strict JSON parse.
//! 4. On failure, repair (escape raw newlines inside strings, drop trailing
//!    commas) and retry once.
//! 5. On success, normalize: `tool_calls`/`toolCalls`, minted ids,
//!    `response` pulled out of `summary`/`text`/`message` objects.
//! 6. Otherwise fall back to plain-text extraction: regex out the
//!    `"response"` field, or strip fences and the brace region and return
//!    the residue.
//!
//! The parser never fails the turn: every input yields a [`ParsedResponse`],
//! if necessary with the fixed fallback string.

use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::types::{ParsedResponse, ToolCall};
use crate::widgets::WidgetDescriptor;

/// Returned when no usable text can be recovered at all.
pub const FALLBACK_RESPONSE: &str = "I've processed your request.";

static NEXT_TOOL_ID: AtomicU64 = AtomicU64::new(1);

fn mint_tool_id() -> String {
    format!("tool-{}", NEXT_TOOL_ID.fetch_add(1, Ordering::Relaxed))
}

/// Extracts a [`ParsedResponse`] from raw accumulated LLM output.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let candidate = unwrap_fence(raw);

    if let Some(slice) = brace_slice(candidate) {
        if let Ok(value) = serde_json::from_str::<Value>(slice) {
            if let Some(parsed) = from_json(&value, raw) {
                return parsed;
            }
        } else {
            let repaired = repair(slice);
            if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
                log::debug!("LLM output parsed after repair passes");
                if let Some(parsed) = from_json(&value, raw) {
                    return parsed;
                }
            }
        }
    }

    fallback_plain_text(raw)
}

/// Builds the normalized record from a parsed JSON object.
///
/// Returns `None` for non-object values (a bare string or array is not a
/// structured response; the plain-text ladder handles it better).
fn from_json(value: &Value, raw: &str) -> Option<ParsedResponse> {
    let obj = value.as_object()?;

    let thinking = obj
        .get("thinking")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let tool_calls = obj
        .get("tool_calls")
        .or_else(|| obj.get("toolCalls"))
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(normalize_tool_call).collect())
        .unwrap_or_default();

    let widgets = obj
        .get("widgets")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    serde_json::from_value::<WidgetDescriptor>(item.clone()).ok()
                })
                .collect()
        })
        .unwrap_or_default();

    let response = match obj.get("response") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(inner)) => ["summary", "text", "message"]
            .iter()
            .find_map(|key| inner.get(*key).and_then(Value::as_str))
            .map(|s| s.to_string())
            .unwrap_or_else(|| fallback_plain_text(raw).response),
        _ => fallback_plain_text(raw).response,
    };

    Some(ParsedResponse {
        thinking,
        tool_calls,
        response,
        widgets,
    })
}

/// Normalizes one tool-call element, minting an id when the model omitted
/// one. Entries without a name are dropped.
fn normalize_tool_call(value: &Value) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let name = obj.get("name").and_then(Value::as_str)?.to_string();

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(mint_tool_id);

    let arguments = match obj.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        // Some models stringify the arguments object; unwrap that too.
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        _ => Default::default(),
    };

    Some(ToolCall { id, name, arguments })
}

/// Takes the body of the first fenced code block when the fence is
/// unlabeled or labeled `json`; other labels leave the input untouched.
fn unwrap_fence(raw: &str) -> &str {
    let Some(start) = raw.find("```") else {
        return raw;
    };
    let after = &raw[start + 3..];
    let Some(newline) = after.find('\n') else {
        return raw;
    };
    let label = after[..newline].trim();
    if !label.is_empty() && !label.eq_ignore_ascii_case("json") {
        return raw;
    }
    let body = &after[newline + 1..];
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

/// Slice from the first `{` to the last `}`, when both exist in order.
fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// The two repair passes, applied in order:
/// raw `\n`/`\r` inside string literals become escapes, then trailing
/// commas before `}` or `]` are dropped.
fn repair(input: &str) -> String {
    let escaped = escape_raw_newlines(input);
    drop_trailing_commas(&escaped)
}

fn escape_raw_newlines(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut after_backslash = false;

    for c in input.chars() {
        if in_string {
            if after_backslash {
                out.push(c);
                after_backslash = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    after_backslash = true;
                }
                '"' => {
                    out.push(c);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

fn drop_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut after_backslash = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if after_backslash {
                after_backslash = false;
            } else if c == '\\' {
                after_backslash = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                let closes_next = j < chars.len() && (chars[j] == '}' || chars[j] == ']');
                if !closes_next {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Last-resort extraction when the output never becomes valid JSON.
fn fallback_plain_text(raw: &str) -> ParsedResponse {
    if let Some(text) = extract_response_field(raw) {
        return ParsedResponse {
            response: text,
            ..Default::default()
        };
    }

    let without_fences = remove_fenced_blocks(raw);
    let residue = match (without_fences.find('{'), without_fences.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            let mut text = String::new();
            text.push_str(&without_fences[..start]);
            text.push_str(&without_fences[end + 1..]);
            text
        }
        _ => without_fences,
    };

    let trimmed = residue.trim();
    ParsedResponse {
        response: if trimmed.is_empty() {
            FALLBACK_RESPONSE.to_string()
        } else {
            trimmed.to_string()
        },
        ..Default::default()
    }
}

/// Pulls the first `"response"` field's value out of broken JSON.
///
/// Two regex variants: one for a properly escaped string literal and one
/// tolerating raw newlines inside the value.
fn extract_response_field(raw: &str) -> Option<String> {
    static STRICT: OnceLock<Regex> = OnceLock::new();
    static LOOSE: OnceLock<Regex> = OnceLock::new();

    let strict = STRICT.get_or_init(|| {
        Regex::new(r#""response"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
    });
    if let Some(captures) = strict.captures(raw) {
        let text = unescape_json(&captures[1]);
        if !text.trim().is_empty() {
            return Some(text);
        }
    }

    let loose = LOOSE.get_or_init(|| {
        Regex::new(r#"(?s)"response"\s*:\s*"(.*?)"\s*[,}]"#).expect("valid regex")
    });
    if let Some(captures) = loose.captures(raw) {
        let text = unescape_json(&captures[1]);
        if !text.trim().is_empty() {
            return Some(text);
        }
    }

    None
}

/// Unescapes the standard JSON escape sequences.
fn unescape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Removes every fenced code block, keeping surrounding prose.
fn remove_fenced_blocks(text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        match after.find("```") {
            Some(end) => rest = &after[end + 3..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
