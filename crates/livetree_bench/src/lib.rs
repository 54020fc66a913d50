//! Benchmark utilities.

#![warn(missing_docs)]

use livetree_snapshot::{Index, Node, Path};
use livetree_sync_protocol::{QueryParams, QuerySpec};
use serde_json::{json, Map, Value};

/// A flat object of `count` children `k0000..` holding `{"score": i, "name": ...}`.
pub fn flat_json(count: usize) -> Value {
    let children: Map<String, Value> = (0..count)
        .map(|i| {
            (
                format!("k{i:04}"),
                json!({"score": (i * 7919) % 1000, "name": format!("user{i}")}),
            )
        })
        .collect();
    Value::Object(children)
}

/// [`flat_json`] as a node.
pub fn flat_node(count: usize) -> Node {
    Node::from_json(&flat_json(count)).unwrap_or_default()
}

/// A tree `depth` levels deep with `width` children per level.
pub fn nested_node(depth: usize, width: usize) -> Node {
    fn build(depth: usize, width: usize) -> Value {
        if depth == 0 {
            return json!("leaf");
        }
        let children: Map<String, Value> = (0..width)
            .map(|i| (format!("key_{i}"), build(depth - 1, width)))
            .collect();
        Value::Object(children)
    }
    Node::from_json(&build(depth, width)).unwrap_or_default()
}

/// A query at the root over the first `limit` children ordered by `index`.
pub fn limited_query(index: Index, limit: usize) -> Option<QuerySpec> {
    let params = QueryParams::new()
        .order_by(index)
        .and_then(|params| params.limit_to_first(limit))
        .ok()?;
    Some(QuerySpec::new(Path::root(), params))
}

/// Paths of the children written by [`flat_json`].
pub fn child_paths(count: usize) -> Vec<Path> {
    (0..count).map(|i| Path::new(&format!("k{i:04}"))).collect()
}
