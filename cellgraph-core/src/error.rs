//! Graph Errors
//!
//! Only contract violations are errors. Dependency loops are a data
//! condition and surface as [`ErrorKind::Loop`](crate::ErrorKind::Loop)
//! values on the implicated cells instead.

use thiserror::Error;

use crate::graph::{NodeId, ObserverKind};

/// A caller broke one of the graph's structural contracts.
///
/// The graph is left unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Observers are terminal; nothing may depend on them.
    #[error("observer {0} cannot have dependents")]
    ObserverDependent(NodeId),

    /// The id does not name a live node of this graph.
    #[error("node {0} is not registered with this graph")]
    UnknownNode(NodeId),

    /// An observer operation was given a cell or range node.
    #[error("node {0} is not an observer")]
    NotAnObserver(NodeId),

    /// A state accessor was used on a calculation observer or vice versa.
    #[error("observer {0} is a {1:?} observer")]
    ObserverKindMismatch(NodeId, ObserverKind),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
