//! Operations applied to the sync tree.

use livetree_core::{ImmutableTree, MergeChildren};
use livetree_snapshot::{Node, Path};

/// Where an operation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationSource {
    /// A local user write or its acknowledgement.
    User,
    /// Untagged server data, applying to every view at a location.
    Server,
    /// Server data for one tagged query, identified by its query identifier.
    ServerTaggedQuery(String),
}

impl OperationSource {
    /// Whether the operation originates from the server.
    pub fn from_server(&self) -> bool {
        !matches!(self, OperationSource::User)
    }

    /// Whether the operation originates from the user.
    pub fn from_user(&self) -> bool {
        matches!(self, OperationSource::User)
    }

    /// Identifier of the query a tagged operation targets.
    pub fn query_id(&self) -> Option<&str> {
        match self {
            OperationSource::ServerTaggedQuery(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the operation targets a single tagged query.
    pub fn is_tagged(&self) -> bool {
        self.query_id().is_some()
    }
}

/// What an operation does.
#[derive(Debug, Clone)]
pub enum OperationKind {
    /// Replace the data at the path.
    Overwrite(Node),
    /// Replace the listed children below the path.
    Merge(ImmutableTree<Node>),
    /// Acknowledge (or revert) a user write. `affected_tree` marks the paths
    /// the write touched, relative to the operation path.
    AckUserWrite {
        /// Paths touched by the write.
        affected_tree: ImmutableTree<bool>,
        /// Whether the write failed and must be rolled back.
        revert: bool,
    },
    /// The server finished sending the initial data for a listen.
    ListenComplete,
}

/// A change to apply to the sync tree.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Origin of the operation.
    pub source: OperationSource,
    /// Location the operation applies to.
    pub path: Path,
    /// The operation payload.
    pub kind: OperationKind,
}

impl Operation {
    /// Overwrite `path` with `snapshot`.
    pub fn overwrite(source: OperationSource, path: Path, snapshot: Node) -> Self {
        Self {
            source,
            path,
            kind: OperationKind::Overwrite(snapshot),
        }
    }

    /// Merge `children` into `path`.
    pub fn merge(source: OperationSource, path: Path, children: &MergeChildren) -> Self {
        let tree = ImmutableTree::from_entries(children.iter().map(|(p, n)| (p.clone(), n.clone())));
        Self {
            source,
            path,
            kind: OperationKind::Merge(tree),
        }
    }

    /// Acknowledge a user write at `path`.
    pub fn ack_user_write(path: Path, affected_tree: ImmutableTree<bool>, revert: bool) -> Self {
        Self {
            source: OperationSource::User,
            path,
            kind: OperationKind::AckUserWrite {
                affected_tree,
                revert,
            },
        }
    }

    /// Mark the listen at `path` complete.
    pub fn listen_complete(source: OperationSource, path: Path) -> Self {
        Self {
            source,
            path,
            kind: OperationKind::ListenComplete,
        }
    }

    /// The equivalent operation relative to the direct child `name`, or `None`
    /// when the operation does not touch that child.
    pub fn operation_for_child(&self, name: &str) -> Option<Operation> {
        let relative = match self.path.front() {
            Some(front) if front != name => return None,
            Some(_) => Some(self.path.pop_front()),
            None => None,
        };
        let source = self.source.clone();
        match (&self.kind, relative) {
            (OperationKind::Overwrite(snap), Some(path)) => {
                Some(Operation::overwrite(source, path, snap.clone()))
            }
            (OperationKind::Overwrite(snap), None) => Some(Operation::overwrite(
                source,
                Path::root(),
                snap.immediate_child(name),
            )),
            (OperationKind::Merge(children), Some(path)) => Some(Self {
                source,
                path,
                kind: OperationKind::Merge(children.clone()),
            }),
            (OperationKind::Merge(children), None) => {
                let child_tree = children.subtree(&Path::new(name));
                if child_tree.is_empty() {
                    None
                } else if let Some(value) = child_tree.value() {
                    Some(Operation::overwrite(source, Path::root(), value.clone()))
                } else {
                    Some(Self {
                        source,
                        path: Path::root(),
                        kind: OperationKind::Merge(child_tree),
                    })
                }
            }
            (OperationKind::AckUserWrite { affected_tree, revert }, Some(path)) => {
                Some(Operation::ack_user_write(path, affected_tree.clone(), *revert))
            }
            (OperationKind::AckUserWrite { affected_tree, revert }, None) => {
                if affected_tree.value().is_some() {
                    return Some(self.clone());
                }
                let child_tree = affected_tree.subtree(&Path::new(name));
                Some(Operation::ack_user_write(Path::root(), child_tree, *revert))
            }
            (OperationKind::ListenComplete, Some(path)) => {
                Some(Operation::listen_complete(source, path))
            }
            (OperationKind::ListenComplete, None) => {
                Some(Operation::listen_complete(source, Path::root()))
            }
        }
    }
}
