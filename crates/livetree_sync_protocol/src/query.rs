//! Query parameters and query identity.
//!
//! A query is a location plus [`QueryParams`]: an ordering index, optional
//! start and end bounds and an optional limit anchored to either end. Queries
//! with identical parameters share one identifier and therefore one view.

use crate::error::{ProtocolError, ProtocolResult};
use livetree_snapshot::{Index, LeafValue, Node, Path, MAX_NAME, MIN_NAME};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Identifier of every query that loads all data with the default ordering.
pub const DEFAULT_QUERY_ID: &str = "default";

/// Which end of the ordering a limit keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewFrom {
    /// Keep the first children.
    #[serde(rename = "l")]
    Left,
    /// Keep the last children.
    #[serde(rename = "r")]
    Right,
}

#[derive(Debug, Clone, PartialEq)]
struct Endpoint {
    value: Node,
    name: Option<String>,
}

/// Ordering, range and limit of a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParams {
    index: Index,
    start: Option<Endpoint>,
    end: Option<Endpoint>,
    limit: Option<usize>,
    view_from: Option<ViewFrom>,
}

impl QueryParams {
    /// Parameters that load everything in priority order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Order children by `index`.
    pub fn order_by(mut self, index: Index) -> ProtocolResult<Self> {
        if self.index != Index::Priority {
            return Err(ProtocolError::invalid_query(
                "an ordering was already specified",
            ));
        }
        self.index = index;
        self.validate_endpoints()?;
        Ok(self)
    }

    /// Only include children at or after `value` (and `name`, for ties).
    pub fn start_at(mut self, value: Node, name: Option<&str>) -> ProtocolResult<Self> {
        if self.start.is_some() {
            return Err(ProtocolError::invalid_query("start was already set"));
        }
        self.start = Some(Endpoint {
            value,
            name: name.map(String::from),
        });
        self.validate_endpoints()?;
        Ok(self)
    }

    /// Only include children at or before `value` (and `name`, for ties).
    pub fn end_at(mut self, value: Node, name: Option<&str>) -> ProtocolResult<Self> {
        if self.end.is_some() {
            return Err(ProtocolError::invalid_query("end was already set"));
        }
        self.end = Some(Endpoint {
            value,
            name: name.map(String::from),
        });
        self.validate_endpoints()?;
        Ok(self)
    }

    /// Only include children equal to `value`.
    pub fn equal_to(self, value: Node, name: Option<&str>) -> ProtocolResult<Self> {
        self.start_at(value.clone(), name)?.end_at(value, name)
    }

    /// Keep the first `limit` children.
    pub fn limit_to_first(self, limit: usize) -> ProtocolResult<Self> {
        self.with_limit(limit, ViewFrom::Left)
    }

    /// Keep the last `limit` children.
    pub fn limit_to_last(self, limit: usize) -> ProtocolResult<Self> {
        self.with_limit(limit, ViewFrom::Right)
    }

    fn with_limit(mut self, limit: usize, view_from: ViewFrom) -> ProtocolResult<Self> {
        if limit == 0 {
            return Err(ProtocolError::invalid_query("limit must be a positive integer"));
        }
        if self.limit.is_some() {
            return Err(ProtocolError::invalid_query("limit was already set"));
        }
        self.limit = Some(limit);
        self.view_from = Some(view_from);
        Ok(self)
    }

    fn validate_endpoints(&self) -> ProtocolResult<()> {
        for endpoint in self.start.iter().chain(self.end.iter()) {
            let value = endpoint.value.leaf_value();
            if !endpoint.value.is_empty() && value.is_none() {
                return Err(ProtocolError::invalid_query(
                    "query bounds must be null, a boolean, a number or a string",
                ));
            }
            match self.index {
                Index::Key => {
                    if endpoint.name.is_some() {
                        return Err(ProtocolError::invalid_query(
                            "when ordering by key only one bound argument is allowed",
                        ));
                    }
                    if !matches!(value, Some(LeafValue::String(_))) {
                        return Err(ProtocolError::invalid_query(
                            "when ordering by key bounds must be strings",
                        ));
                    }
                }
                Index::Priority => {
                    if matches!(value, Some(LeafValue::Bool(_))) {
                        return Err(ProtocolError::invalid_query(
                            "when ordering by priority bounds must be null, numbers or strings",
                        ));
                    }
                }
                Index::Value | Index::Child(_) => {}
            }
        }
        Ok(())
    }

    /// The ordering index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Whether a start bound is set.
    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }

    /// Whether an end bound is set.
    pub fn has_end(&self) -> bool {
        self.end.is_some()
    }

    /// Whether a limit is set.
    pub fn has_limit(&self) -> bool {
        self.limit.is_some()
    }

    /// Whether a limit is set together with the end it keeps.
    pub fn has_anchored_limit(&self) -> bool {
        self.limit.is_some() && self.view_from.is_some()
    }

    /// The limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether the limit keeps the first children.
    pub fn is_view_from_left(&self) -> bool {
        match self.view_from {
            Some(view_from) => view_from == ViewFrom::Left,
            None => self.has_start(),
        }
    }

    /// Start bound value.
    pub fn index_start_value(&self) -> Option<&Node> {
        self.start.as_ref().map(|e| &e.value)
    }

    /// Start bound name, or [`MIN_NAME`] when none was given.
    pub fn index_start_name(&self) -> &str {
        self.start
            .as_ref()
            .and_then(|e| e.name.as_deref())
            .unwrap_or(MIN_NAME)
    }

    /// End bound value.
    pub fn index_end_value(&self) -> Option<&Node> {
        self.end.as_ref().map(|e| &e.value)
    }

    /// End bound name, or [`MAX_NAME`] when none was given.
    pub fn index_end_name(&self) -> &str {
        self.end
            .as_ref()
            .and_then(|e| e.name.as_deref())
            .unwrap_or(MAX_NAME)
    }

    /// Whether every child is included.
    pub fn loads_all_data(&self) -> bool {
        !(self.has_start() || self.has_end() || self.has_limit())
    }

    /// Whether these are the default parameters.
    pub fn is_default(&self) -> bool {
        self.loads_all_data() && self.index == Index::Priority
    }

    /// Wire form of the parameters.
    pub fn query_object(&self) -> Value {
        let mut obj = Map::new();
        if let Some(start) = &self.start {
            obj.insert("sp".into(), start.value.to_json(false));
            if let Some(name) = &start.name {
                obj.insert("sn".into(), Value::String(name.clone()));
            }
        }
        if let Some(end) = &self.end {
            obj.insert("ep".into(), end.value.to_json(false));
            if let Some(name) = &end.name {
                obj.insert("en".into(), Value::String(name.clone()));
            }
        }
        if let Some(limit) = self.limit {
            obj.insert("l".into(), Value::from(limit));
            let view_from = self.view_from.unwrap_or(if self.is_view_from_left() {
                ViewFrom::Left
            } else {
                ViewFrom::Right
            });
            obj.insert(
                "vf".into(),
                serde_json::to_value(view_from).unwrap_or(Value::Null),
            );
        }
        if self.index != Index::Priority {
            obj.insert("i".into(), Value::String(self.index.query_definition()));
        }
        Value::Object(obj)
    }

    /// Stable identifier: [`DEFAULT_QUERY_ID`] or the key-sorted JSON of
    /// [`QueryParams::query_object`].
    pub fn query_identifier(&self) -> String {
        if self.is_default() {
            return DEFAULT_QUERY_ID.to_string();
        }
        match self.query_object() {
            Value::Object(obj) => {
                let sorted: BTreeMap<String, Value> = obj.into_iter().collect();
                serde_json::to_string(&sorted).unwrap_or_default()
            }
            other => other.to_string(),
        }
    }

    /// Parse the wire form produced by [`QueryParams::query_object`].
    ///
    /// Every bound and limit goes through the same validation as the
    /// builders.
    pub fn from_query_object(object: &Value) -> ProtocolResult<Self> {
        let Value::Object(obj) = object else {
            return Err(ProtocolError::invalid_query("query object must be a JSON object"));
        };
        let mut params = QueryParams::new();
        if let Some(index) = obj.get("i") {
            let Some(definition) = index.as_str() else {
                return Err(ProtocolError::invalid_query("index must be a string"));
            };
            params = params.order_by(parse_index(definition)?)?;
        }

        let name_of = |key: &str| -> ProtocolResult<Option<String>> {
            match obj.get(key) {
                None => Ok(None),
                Some(Value::String(name)) => Ok(Some(name.clone())),
                Some(_) => Err(ProtocolError::invalid_query(format!("{key} must be a string"))),
            }
        };
        if let Some(value) = obj.get("sp") {
            let name = name_of("sn")?;
            params = params.start_at(bound_node(value)?, name.as_deref())?;
        }
        if let Some(value) = obj.get("ep") {
            let name = name_of("en")?;
            params = params.end_at(bound_node(value)?, name.as_deref())?;
        }

        if let Some(limit) = obj.get("l") {
            let Some(limit) = limit.as_u64().and_then(|l| usize::try_from(l).ok()) else {
                return Err(ProtocolError::invalid_query("limit must be a positive integer"));
            };
            let view_from = match obj.get("vf") {
                Some(vf) => serde_json::from_value::<ViewFrom>(vf.clone())
                    .map_err(|_| ProtocolError::invalid_query("view from must be \"l\" or \"r\""))?,
                None if params.has_end() && !params.has_start() => ViewFrom::Right,
                None => ViewFrom::Left,
            };
            params = params.with_limit(limit, view_from)?;
        }
        Ok(params)
    }
}

fn parse_index(definition: &str) -> ProtocolResult<Index> {
    match definition {
        ".priority" => Ok(Index::Priority),
        ".key" => Ok(Index::Key),
        ".value" => Ok(Index::Value),
        path => Path::parse(path)
            .map(Index::Child)
            .map_err(|err| ProtocolError::invalid_query(err.to_string())),
    }
}

fn bound_node(value: &Value) -> ProtocolResult<Node> {
    Node::from_json(value).map_err(|err| ProtocolError::invalid_query(err.to_string()))
}

/// A location plus parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    /// Location of the query.
    pub path: Path,
    /// Parameters of the query.
    pub params: QueryParams,
}

impl QuerySpec {
    /// A query at `path` with `params`.
    pub fn new(path: Path, params: QueryParams) -> Self {
        Self { path, params }
    }

    /// The default query at `path`.
    pub fn default_at(path: Path) -> Self {
        Self {
            path,
            params: QueryParams::default(),
        }
    }

    /// See [`QueryParams::query_identifier`].
    pub fn query_identifier(&self) -> String {
        self.params.query_identifier()
    }

    /// Whether this query's identifier is [`DEFAULT_QUERY_ID`].
    pub fn is_default(&self) -> bool {
        self.params.is_default()
    }

    /// See [`QueryParams::loads_all_data`].
    pub fn loads_all_data(&self) -> bool {
        self.params.loads_all_data()
    }

    /// Globally unique key: `"{path}${identifier}"`.
    pub fn query_key(&self) -> String {
        format!("{}${}", self.path, self.query_identifier())
    }

    /// The query to listen to on the server. Queries that load all data are
    /// listened to as the default query at the same path.
    pub fn for_listening(&self) -> QuerySpec {
        if self.loads_all_data() && !self.is_default() {
            QuerySpec::default_at(self.path.clone())
        } else {
            self.clone()
        }
    }
}
