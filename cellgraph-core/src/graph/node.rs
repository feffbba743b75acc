//! Graph Nodes
//!
//! This module defines the node record shared by every vertex of the
//! dependency graph, and the per-kind payloads it carries.

use std::fmt;

use indexmap::IndexSet;

use crate::address::{Area, CellAddress};
use crate::error::{GraphError, GraphResult};
use crate::value::Value;

/// Handle to a node in the graph's arena.
///
/// The generation makes a handle to a removed node stale instead of letting
/// it alias whatever node later reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot of this node.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Exploration color used by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Not yet explored.
    #[default]
    Unvisited,

    /// Entered by the walk in progress, its component not yet closed.
    Exploring,

    /// Classified; `in_loop` holds the outcome.
    Done,
}

/// Payload of a node bound to one sheet cell.
#[derive(Debug, Clone)]
pub struct CellNode {
    pub(crate) address: CellAddress,

    /// Last value this node settled on.
    pub(crate) result: Value,

    /// Whether the cell anchors (is the top-left of) its array formula's
    /// target range. Refreshed on every evaluation.
    pub(crate) array_head: bool,

    /// The node whose dynamic array currently covers this cell.
    pub(crate) spill_owner: Option<NodeId>,

    /// The formula references its own address. Self-edges are never stored,
    /// so the loop is remembered here instead.
    pub(crate) self_reference: bool,
}

impl CellNode {
    pub fn address(&self) -> CellAddress {
        self.address
    }

    /// Last settled value.
    pub fn result(&self) -> &Value {
        &self.result
    }

    /// Whether the cell is the top-left cell of a legacy array formula.
    pub fn is_array_head(&self) -> bool {
        self.array_head
    }

    /// The anchor whose spilled array covers this cell.
    pub fn spill_owner(&self) -> Option<NodeId> {
        self.spill_owner
    }

    /// Whether the formula reads its own address.
    pub fn has_self_reference(&self) -> bool {
        self.self_reference
    }
}

/// Payload of a range reference node: one indirection between a dependent
/// and every cell inside `area`.
#[derive(Debug, Clone)]
pub struct RangeNode {
    pub(crate) area: Area,
}

impl RangeNode {
    pub fn area(&self) -> Area {
        self.area
    }
}

/// Which flavor of observer to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    /// Bumps a counter whenever its inputs settle.
    State,

    /// Evaluates an expression (e.g. a conditional format) through the host.
    Calculation,
}

/// Payload of a terminal node consumed by non-cell clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverNode {
    State { state_id: u64 },
    Calculation { result: Value, updated: bool },
}

impl ObserverNode {
    pub(crate) fn new(kind: ObserverKind) -> Self {
        match kind {
            ObserverKind::State => ObserverNode::State { state_id: 0 },
            ObserverKind::Calculation => ObserverNode::Calculation {
                result: Value::Empty,
                updated: false,
            },
        }
    }

    pub fn kind(&self) -> ObserverKind {
        match self {
            ObserverNode::State { .. } => ObserverKind::State,
            ObserverNode::Calculation { .. } => ObserverKind::Calculation,
        }
    }
}

/// The kind-specific part of a node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Cell(CellNode),
    Range(RangeNode),
    Observer(ObserverNode),
}

/// A vertex of the dependency graph.
///
/// `edges_in` holds the nodes this node reads from, `edges_out` the nodes
/// that read from it. The graph keeps the two sides symmetric; the methods
/// here only ever touch one side.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    pub(crate) color: Color,
    pub(crate) dirty: bool,
    pub(crate) in_loop: bool,
    edges_in: IndexSet<NodeId>,
    edges_out: IndexSet<NodeId>,
}

impl Node {
    fn with_kind(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            color: Color::Unvisited,
            dirty: false,
            in_loop: false,
            edges_in: IndexSet::new(),
            edges_out: IndexSet::new(),
        }
    }

    pub(crate) fn cell(id: NodeId, address: CellAddress) -> Self {
        Self::with_kind(
            id,
            NodeKind::Cell(CellNode {
                address,
                result: Value::Empty,
                array_head: false,
                spill_owner: None,
                self_reference: false,
            }),
        )
    }

    pub(crate) fn range(id: NodeId, area: Area) -> Self {
        Self::with_kind(id, NodeKind::Range(RangeNode { area }))
    }

    pub(crate) fn observer(id: NodeId, kind: ObserverKind) -> Self {
        Self::with_kind(id, NodeKind::Observer(ObserverNode::new(kind)))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the last cycle check placed this node on a dependency loop.
    pub fn in_loop(&self) -> bool {
        self.in_loop
    }

    /// Nodes this node depends on.
    pub fn edges_in(&self) -> &IndexSet<NodeId> {
        &self.edges_in
    }

    /// Nodes that depend on this node.
    pub fn edges_out(&self) -> &IndexSet<NodeId> {
        &self.edges_out
    }

    /// Whether the node has no edges at all.
    pub fn is_isolated(&self) -> bool {
        self.edges_in.is_empty() && self.edges_out.is_empty()
    }

    pub fn as_cell(&self) -> Option<&CellNode> {
        match &self.kind {
            NodeKind::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub(crate) fn as_cell_mut(&mut self) -> Option<&mut CellNode> {
        match &mut self.kind {
            NodeKind::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeNode> {
        match &self.kind {
            NodeKind::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn as_observer(&self) -> Option<&ObserverNode> {
        match &self.kind {
            NodeKind::Observer(observer) => Some(observer),
            _ => None,
        }
    }

    pub fn is_observer(&self) -> bool {
        matches!(self.kind, NodeKind::Observer(_))
    }

    /// Address of a cell node.
    pub fn address(&self) -> Option<CellAddress> {
        self.as_cell().map(|cell| cell.address)
    }

    /// Record that this node reads from `other`. Returns false for
    /// duplicates and self-edges.
    pub fn add_dependency(&mut self, other: NodeId) -> bool {
        other != self.id && self.edges_in.insert(other)
    }

    /// Record that `other` reads from this node.
    ///
    /// Fails without touching the node if this node is an observer.
    pub fn add_dependent(&mut self, other: NodeId) -> GraphResult<bool> {
        if self.is_observer() {
            return Err(GraphError::ObserverDependent(self.id));
        }
        Ok(self.insert_dependent(other))
    }

    /// Unchecked half of [`Node::add_dependent`] for callers that already
    /// know this node is not an observer.
    pub(crate) fn insert_dependent(&mut self, other: NodeId) -> bool {
        other != self.id && self.edges_out.insert(other)
    }

    /// Forget the input `other`. Returns whether it was present.
    pub fn remove_dependency(&mut self, other: NodeId) -> bool {
        self.edges_in.shift_remove(&other)
    }

    /// Forget the dependent `other`. Returns whether it was present.
    pub fn remove_dependent(&mut self, other: NodeId) -> bool {
        self.edges_out.shift_remove(&other)
    }

    /// Detach both edge sets, leaving the node isolated.
    pub(crate) fn take_edges(&mut self) -> (IndexSet<NodeId>, IndexSet<NodeId>) {
        (
            std::mem::take(&mut self.edges_in),
            std::mem::take(&mut self.edges_out),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SheetId;

    fn cell(index: u32) -> Node {
        Node::cell(
            NodeId::new(index, 0),
            CellAddress::new(SheetId::new(1), index, 0),
        )
    }

    #[test]
    fn new_cell_starts_clean_and_unvisited() {
        let node = cell(0);
        assert!(!node.is_dirty());
        assert_eq!(node.color(), Color::Unvisited);
        assert!(node.is_isolated());
        assert_eq!(node.as_cell().unwrap().result(), &Value::Empty);
    }

    #[test]
    fn edges_are_deduplicated_and_never_self() {
        let mut node = cell(0);
        let other = NodeId::new(1, 0);

        assert!(node.add_dependency(other));
        assert!(!node.add_dependency(other));
        assert!(!node.add_dependency(node.id()));
        assert_eq!(node.edges_in().len(), 1);

        assert!(node.add_dependent(other).unwrap());
        assert!(!node.add_dependent(node.id()).unwrap());
        assert_eq!(node.edges_out().len(), 1);

        assert!(node.remove_dependency(other));
        assert!(!node.remove_dependency(other));
        assert!(node.remove_dependent(other));
        assert!(node.is_isolated());
    }

    #[test]
    fn observer_rejects_dependents() {
        let id = NodeId::new(7, 2);
        let mut observer = Node::observer(id, ObserverKind::State);

        let err = observer.add_dependent(NodeId::new(1, 0)).unwrap_err();
        assert_eq!(err, GraphError::ObserverDependent(id));
        assert!(observer.edges_out().is_empty());

        assert!(observer.add_dependency(NodeId::new(1, 0)));
    }

    #[test]
    fn take_edges_isolates() {
        let mut node = cell(0);
        node.add_dependency(NodeId::new(1, 0));
        node.add_dependent(NodeId::new(2, 0)).unwrap();

        let (inbound, outbound) = node.take_edges();
        assert_eq!(inbound.len(), 1);
        assert_eq!(outbound.len(), 1);
        assert!(node.is_isolated());
    }
}
