//! Tool executor: validation, dispatch, and result aggregation.
//!
//! The executor sits between parsed tool calls and registered handlers.
//! Its failure policy is total containment: an unknown name, a missing
//! required argument, or a handler error all become a
//! `ToolResult { success: false }`, never an error that aborts the turn.
//! The LLM sees the failure text on the next iteration and composes the
//! user-facing recovery itself.
//!
//! Batch execution fans out all calls concurrently and joins, preserving
//! the call-id insertion order in the returned mapping regardless of
//! completion order. A sequential variant exists for handlers with
//! ordering constraints.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::registry::{ParamSpec, ToolRegistry};
use crate::types::{ToolCall, ToolResult};

/// Dispatches tool calls against a registry.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    /// Creates an executor over a shared registry.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Executes a single call.
    ///
    /// Unknown names and missing required parameters produce failed
    /// results. Present-but-mistyped arguments are logged and forwarded;
    /// the handler decides whether it can cope.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.registry.by_name(&call.name) else {
            let available = self.registry.all_names().join(", ");
            return ToolResult::err(format!(
                "Unknown tool: {}; available: {}",
                call.name, available
            ));
        };

        let missing: Vec<&str> = tool
            .descriptor
            .required
            .iter()
            .filter(|name| !call.arguments.contains_key(name.as_str()))
            .map(|name| name.as_str())
            .collect();
        if !missing.is_empty() {
            return ToolResult::err(format!(
                "Missing required parameter(s) for {}: {}",
                call.name,
                missing.join(", ")
            ));
        }

        for (name, spec) in &tool.descriptor.params {
            if let Some(value) = call.arguments.get(name) {
                if !type_matches(spec, value) {
                    log::warn!(
                        "Tool {} argument {:?} has unexpected type (wanted {}); forwarding anyway",
                        call.name,
                        name,
                        spec.kind
                    );
                }
            }
        }

        let args = Value::Object(call.arguments.clone());
        let handler = tool.handler.clone();
        match handler(args).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Tool {} failed: {}", call.name, e);
                ToolResult::err(e.to_string())
            }
        }
    }

    /// Executes all calls concurrently, joining before return.
    ///
    /// The returned pairs follow the insertion order of `calls`, not
    /// completion order, so downstream widget emission stays deterministic.
    /// One failing call never aborts the others.
    pub async fn execute_many(&self, calls: &[ToolCall]) -> Vec<(String, ToolResult)> {
        let futures = calls.iter().map(|call| async {
            let result = self.execute(call).await;
            (call.id.clone(), result)
        });
        join_all(futures).await
    }

    /// Executes calls one at a time, in order.
    pub async fn execute_sequential(&self, calls: &[ToolCall]) -> Vec<(String, ToolResult)> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute(call).await;
            results.push((call.id.clone(), result));
        }
        results
    }
}

/// Shallow JSON type check against a parameter spec.
fn type_matches(spec: &ParamSpec, value: &Value) -> bool {
    match spec.kind.as_str() {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}
