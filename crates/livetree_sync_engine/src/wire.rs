//! JSON entry points for network layers.
//!
//! Servers push paths as strings and data as JSON. These helpers validate
//! both before anything reaches the views, so malformed input becomes a
//! [`SyncError`] instead of a panic.

use crate::error::SyncResult;
use crate::event::Event;
use crate::listen::{ListenProvider, Tag};
use crate::sync_tree::SyncTree;
use livetree_core::MergeChildren;
use livetree_snapshot::{Node, Path};
use livetree_sync_protocol::{QueryParams, QuerySpec};
use serde_json::{Map, Value};

/// Build a query from a path string and the wire form of its parameters.
pub fn parse_query(path: &str, query_object: &Value) -> SyncResult<QuerySpec> {
    let path = Path::parse(path)?;
    let params = QueryParams::from_query_object(query_object)?;
    Ok(QuerySpec::new(path, params))
}

/// Parse merge children keyed by relative path strings.
pub fn parse_merge(children: &Map<String, Value>) -> SyncResult<MergeChildren> {
    children
        .iter()
        .map(|(path, json)| -> SyncResult<(Path, Node)> {
            Ok((Path::parse(path)?, Node::from_json(json)?))
        })
        .collect()
}

impl<P: ListenProvider> SyncTree<P> {
    /// Server data for `path` in JSON, for the query tagged `tag` or for
    /// every view when untagged.
    pub fn apply_server_json(&mut self, path: &str, data: &Value, tag: Option<Tag>) -> SyncResult<Vec<Event>> {
        let path = Path::parse(path)?;
        let node = Node::from_json(data)?;
        Ok(match tag {
            Some(tag) => self.apply_tagged_query_overwrite(&path, node, tag),
            None => self.apply_server_overwrite(&path, node),
        })
    }

    /// Server merge for `path` in JSON: an object keyed by relative paths.
    pub fn apply_server_json_merge(
        &mut self,
        path: &str,
        children: &Map<String, Value>,
        tag: Option<Tag>,
    ) -> SyncResult<Vec<Event>> {
        let path = Path::parse(path)?;
        let children = parse_merge(children)?;
        Ok(match tag {
            Some(tag) => self.apply_tagged_query_merge(&path, &children, tag),
            None => self.apply_server_merge(&path, &children),
        })
    }
}
