//! Conversion between [`Node`]s and JSON values.
//!
//! Import accepts the export format: objects may carry `.priority` next to
//! their children, and a leaf with a priority is written as
//! `{".value": v, ".priority": p}`. Objects holding a `.sv` key are kept as
//! deferred server values.

use crate::error::{SnapshotError, SnapshotResult};
use crate::index::Index;
use crate::node::{LeafValue, Node};
use crate::path::{validate_key, PRIORITY_KEY};
use serde_json::{Map, Value};

/// Pseudo key holding the value of a leaf in export format.
pub const VALUE_KEY: &str = ".value";

/// Key marking a deferred server value.
pub const SERVER_VALUE_KEY: &str = ".sv";

fn priority_from_json(json: &Value) -> SnapshotResult<Node> {
    match json {
        Value::Null => Ok(Node::empty()),
        Value::Number(n) => n
            .as_f64()
            .map(Node::leaf)
            .ok_or_else(|| SnapshotError::invalid_priority(format!("unsupported number {n}"))),
        Value::String(s) => Ok(Node::leaf(s.as_str())),
        Value::Object(map) if map.contains_key(SERVER_VALUE_KEY) => {
            Ok(Node::leaf(LeafValue::Deferred(map.clone())))
        }
        other => Err(SnapshotError::invalid_priority(format!(
            "expected string, number or null, got {other}"
        ))),
    }
}

fn node_from_json(json: &Value) -> SnapshotResult<Node> {
    let mut json = json;
    let mut priority = Node::empty();
    if let Value::Object(map) = json {
        if let Some(p) = map.get(PRIORITY_KEY) {
            priority = priority_from_json(p)?;
        }
        if let Some(v) = map.get(VALUE_KEY).filter(|v| !v.is_null()) {
            json = v;
        }
    }
    let node = match json {
        Value::Null => return Ok(Node::empty()),
        Value::Bool(b) => Node::leaf(*b),
        Value::Number(n) => Node::leaf(
            n.as_f64()
                .ok_or_else(|| SnapshotError::invalid_json(format!("unsupported number {n}")))?,
        ),
        Value::String(s) => Node::leaf(s.as_str()),
        Value::Object(map) if map.contains_key(SERVER_VALUE_KEY) => {
            Node::leaf(LeafValue::Deferred(map.clone()))
        }
        Value::Object(map) => {
            let mut node = Node::empty();
            for (key, value) in map {
                if key.starts_with('.') {
                    continue;
                }
                validate_key(key)?;
                let child = node_from_json(value)?;
                if !child.is_empty() {
                    node = node.update_immediate_child(key, child);
                }
            }
            node
        }
        Value::Array(items) => {
            let mut node = Node::empty();
            for (i, value) in items.iter().enumerate() {
                let child = node_from_json(value)?;
                if !child.is_empty() {
                    node = node.update_immediate_child(&i.to_string(), child);
                }
            }
            node
        }
    };
    Ok(node.update_priority(priority))
}

fn is_array_key(key: &str) -> Option<usize> {
    if key == "0" || (!key.starts_with('0') && key.bytes().all(|b| b.is_ascii_digit())) {
        key.parse().ok()
    } else {
        None
    }
}

impl Node {
    /// Build a node from JSON. `null` and empty objects become the empty node.
    pub fn from_json(json: &Value) -> SnapshotResult<Node> {
        node_from_json(json)
    }

    /// Convert to JSON.
    ///
    /// With `export` set, priorities are included. Without it, objects whose
    /// keys are all array indexes and at least half populated are rendered as
    /// arrays with `null` holes.
    pub fn to_json(&self, export: bool) -> Value {
        if let Some(value) = self.leaf_value() {
            let json = value.to_json();
            let priority = self.priority();
            if export && !priority.is_empty() {
                let mut map = Map::new();
                map.insert(VALUE_KEY.to_string(), json);
                map.insert(PRIORITY_KEY.to_string(), priority.to_json(false));
                return Value::Object(map);
            }
            return json;
        }
        if self.is_empty() || self.is_max() {
            return Value::Null;
        }
        let mut map = Map::new();
        let mut max_key = 0usize;
        let mut all_array_keys = true;
        for child in self.iter_by(&Index::Priority) {
            match is_array_key(&child.name) {
                Some(k) if all_array_keys => max_key = max_key.max(k),
                _ => all_array_keys = false,
            }
            map.insert(child.name, child.node.to_json(export));
        }
        if !export && all_array_keys && max_key < 2 * map.len() {
            let mut items = vec![Value::Null; max_key + 1];
            for (key, value) in map {
                if let Some(i) = is_array_key(&key) {
                    items[i] = value;
                }
            }
            return Value::Array(items);
        }
        let priority = self.priority();
        if export && !priority.is_empty() {
            map.insert(PRIORITY_KEY.to_string(), priority.to_json(false));
        }
        Value::Object(map)
    }
}
