//! The boundary between the sync tree and the network layer.
//!
//! The sync tree decides which queries must be listened to on the server and
//! tells a [`ListenProvider`]. When the server acknowledges a listen, the
//! provider reports back through [`SyncTree::on_listen_complete`] on the same
//! serialized context that applies every other operation.
//!
//! [`SyncTree::on_listen_complete`]: crate::SyncTree::on_listen_complete

use crate::event::Event;
use livetree_sync_protocol::QuerySpec;
use std::fmt;

/// Tag correlating a constrained query with server pushes for it.
pub type Tag = u64;

/// Outcome of a listen reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenStatus {
    /// The listen is active and the initial data has been sent.
    Ok,
    /// The client may not read the location.
    PermissionDenied,
    /// The requested data is too large for a single listen.
    TooBig,
    /// The service is unavailable.
    Unavailable,
    /// Any other status string.
    Other(String),
}

impl ListenStatus {
    /// Parse a wire status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "ok" => ListenStatus::Ok,
            "permission_denied" => ListenStatus::PermissionDenied,
            "too_big" => ListenStatus::TooBig,
            "unavailable" => ListenStatus::Unavailable,
            other => ListenStatus::Other(other.to_string()),
        }
    }

    /// Whether the listen succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, ListenStatus::Ok)
    }
}

impl fmt::Display for ListenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenStatus::Ok => f.write_str("ok"),
            ListenStatus::PermissionDenied => {
                f.write_str("client doesn't have permission to access the desired data")
            }
            ListenStatus::TooBig => f.write_str(
                "the data requested exceeds the maximum size that can be accessed with a single request",
            ),
            ListenStatus::Unavailable => f.write_str("the service is unavailable"),
            ListenStatus::Other(status) => f.write_str(status),
        }
    }
}

/// A request to start listening to a query on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenRequest {
    /// The query to send to the server.
    pub query: QuerySpec,
    /// The local query whose view asked for the listen. Differs from
    /// `query` for queries that load all data under a non-default index.
    pub view_query: QuerySpec,
    /// Tag of a constrained query.
    pub tag: Option<Tag>,
    /// Content hash of the view's server cache when the listen started.
    pub hash: String,
}

/// The network layer as seen by the sync tree.
pub trait ListenProvider {
    /// Start listening. Any events returned are passed on to the caller of
    /// the sync tree operation that caused the listen.
    fn start_listening(&mut self, request: &ListenRequest) -> Vec<Event>;

    /// Stop listening to `query`.
    fn stop_listening(&mut self, query: &QuerySpec, tag: Option<Tag>);
}

/// A call made to a [`MockListenProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ListenCall {
    /// `start_listening` was called.
    Start(ListenRequest),
    /// `stop_listening` was called.
    Stop {
        /// The query.
        query: QuerySpec,
        /// The tag passed along.
        tag: Option<Tag>,
    },
}

/// A provider that records every call.
#[derive(Debug, Default)]
pub struct MockListenProvider {
    calls: Vec<ListenCall>,
}

impl MockListenProvider {
    /// Creates an empty mock provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call, oldest first.
    pub fn calls(&self) -> &[ListenCall] {
        &self.calls
    }

    /// Requests passed to `start_listening`.
    pub fn started(&self) -> Vec<&ListenRequest> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ListenCall::Start(request) => Some(request),
                ListenCall::Stop { .. } => None,
            })
            .collect()
    }

    /// Queries and tags passed to `stop_listening`.
    pub fn stopped(&self) -> Vec<(&QuerySpec, Option<Tag>)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ListenCall::Stop { query, tag } => Some((query, *tag)),
                ListenCall::Start(_) => None,
            })
            .collect()
    }

    /// The most recent start request.
    pub fn last_started(&self) -> Option<&ListenRequest> {
        self.started().pop()
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl ListenProvider for MockListenProvider {
    fn start_listening(&mut self, request: &ListenRequest) -> Vec<Event> {
        self.calls.push(ListenCall::Start(request.clone()));
        Vec::new()
    }

    fn stop_listening(&mut self, query: &QuerySpec, tag: Option<Tag>) {
        self.calls.push(ListenCall::Stop {
            query: query.clone(),
            tag,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetree_snapshot::Path;

    #[test]
    fn test_parse_status() {
        assert!(ListenStatus::parse("ok").is_ok());
        assert_eq!(ListenStatus::parse("unavailable"), ListenStatus::Unavailable);
        assert_eq!(
            ListenStatus::parse("expired_token"),
            ListenStatus::Other("expired_token".to_string())
        );
        assert_eq!(ListenStatus::parse("expired_token").to_string(), "expired_token");
    }

    #[test]
    fn test_mock_records_calls() {
        let mut provider = MockListenProvider::new();
        let query = QuerySpec::default_at(Path::new("a"));
        let request = ListenRequest {
            query: query.clone(),
            view_query: query.clone(),
            tag: None,
            hash: String::new(),
        };
        assert!(provider.start_listening(&request).is_empty());
        provider.stop_listening(&query, Some(3));

        assert_eq!(provider.calls().len(), 2);
        assert_eq!(provider.last_started(), Some(&request));
        assert_eq!(provider.stopped(), vec![(&query, Some(3))]);
        provider.clear();
        assert!(provider.calls().is_empty());
    }
}
