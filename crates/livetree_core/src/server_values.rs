//! Resolution of deferred server values.
//!
//! Writes may contain placeholders such as `{".sv": "timestamp"}` or
//! `{".sv": {"increment": 1}}` that the server fills in. Until the server
//! confirms, the client substitutes a local estimate so events can be raised
//! immediately.

use livetree_snapshot::{LeafValue, Node, PRIORITY_KEY, SERVER_VALUE_KEY};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Values substituted for server placeholders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerValues {
    /// Milliseconds since the Unix epoch, as estimated by the client.
    pub timestamp: f64,
}

impl ServerValues {
    /// Use an explicit timestamp in milliseconds.
    pub fn with_timestamp(timestamp: f64) -> Self {
        Self { timestamp }
    }

    /// Use the local clock.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);
        Self { timestamp: millis }
    }
}

fn resolve_leaf_value(value: &LeafValue, existing: &Node, server_values: &ServerValues) -> Option<LeafValue> {
    let LeafValue::Deferred(marker) = value else {
        return None;
    };
    match marker.get(SERVER_VALUE_KEY)? {
        Value::String(op) if op == "timestamp" => Some(LeafValue::Number(server_values.timestamp)),
        Value::Object(op) => {
            let Some(delta) = op.get("increment").and_then(Value::as_f64) else {
                warn!(?op, "unsupported server value operation");
                return None;
            };
            let base = existing
                .leaf_value()
                .and_then(LeafValue::as_f64)
                .unwrap_or(0.0);
            Some(LeafValue::Number(base + delta))
        }
        other => {
            warn!(?other, "unsupported server value");
            None
        }
    }
}

/// Replace every server placeholder in `node`, using `existing` as the
/// current value for increments. Untouched subtrees are shared with `node`.
pub fn resolve_deferred_value_snapshot(
    node: &Node,
    existing: &Node,
    server_values: &ServerValues,
) -> Node {
    let priority = node.priority();
    let resolved_priority = priority
        .leaf_value()
        .and_then(|p| resolve_leaf_value(p, &existing.immediate_child(PRIORITY_KEY), server_values))
        .map(Node::leaf);

    if let Some(value) = node.leaf_value() {
        let resolved_value = resolve_leaf_value(value, existing, server_values);
        if resolved_value.is_none() && resolved_priority.is_none() {
            return node.clone();
        }
        return Node::leaf(resolved_value.unwrap_or_else(|| value.clone()))
            .update_priority(resolved_priority.unwrap_or(priority));
    }

    let mut resolved = match resolved_priority {
        Some(p) => node.update_priority(p),
        None => node.clone(),
    };
    for child in node.children() {
        let new_child =
            resolve_deferred_value_snapshot(&child.node, &existing.immediate_child(&child.name), server_values);
        if !new_child.ptr_eq(&child.node) {
            resolved = resolved.update_immediate_child(&child.name, new_child);
        }
    }
    resolved
}
