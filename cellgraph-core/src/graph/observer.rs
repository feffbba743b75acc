//! Observer Nodes
//!
//! Observers are terminal nodes for clients outside the sheet (charts,
//! conditional formats, data validation). They take inputs like any formula
//! cell but nothing may depend on them.

use crate::address::{Area, CellAddress};
use crate::error::{GraphError, GraphResult};
use crate::value::Value;

use super::node::{Color, Node, NodeId, ObserverKind, ObserverNode};
use super::Graph;

impl Graph {
    /// Register a new observer with no inputs.
    pub fn add_observer(&mut self, kind: ObserverKind) -> NodeId {
        let id = self.arena.insert_with(|id| Node::observer(id, kind));
        if let Some(node) = self.arena.get_mut(id) {
            // Nothing can be reached from an observer.
            node.color = Color::Done;
        }
        self.observers.insert(id);
        id
    }

    /// Detach an observer from its inputs and drop it.
    pub fn remove_observer(&mut self, observer: NodeId) -> GraphResult<()> {
        self.ensure_observer(observer)?;
        let inputs: Vec<NodeId> = self
            .arena
            .get(observer)
            .map(|node| node.edges_in().iter().copied().collect())
            .unwrap_or_default();
        self.sever(observer);
        self.remove_detached(observer);
        for input in inputs {
            self.prune_if_isolated(input);
        }
        Ok(())
    }

    fn ensure_observer(&self, id: NodeId) -> GraphResult<&ObserverNode> {
        self.arena
            .get(id)
            .ok_or(GraphError::UnknownNode(id))?
            .as_observer()
            .ok_or(GraphError::NotAnObserver(id))
    }

    /// Make `observer` read the cell at `address`.
    pub fn add_observer_dependency(
        &mut self,
        observer: NodeId,
        address: CellAddress,
    ) -> GraphResult<NodeId> {
        self.ensure_observer(observer)?;
        let cell = self.get_or_create_cell(address);
        self.attach(cell, observer);
        Ok(cell)
    }

    /// Make `observer` read every cell of `area`.
    pub fn add_observer_range_dependency(
        &mut self,
        observer: NodeId,
        area: Area,
    ) -> GraphResult<NodeId> {
        self.ensure_observer(observer)?;
        let (range, _) = self.range_node(area);
        self.attach(range, observer);
        Ok(range)
    }

    /// Stop `observer` from watching the cell at `address`.
    pub fn remove_observer_dependency(
        &mut self,
        observer: NodeId,
        address: CellAddress,
    ) -> GraphResult<bool> {
        self.ensure_observer(observer)?;
        let Some(cell) = self.cells.get(address) else {
            return Ok(false);
        };
        let removed = self.unlink(cell, observer);
        if removed {
            self.prune_if_isolated(cell);
        }
        Ok(removed)
    }

    /// Stop `observer` from watching `area`.
    pub fn remove_observer_range_dependency(
        &mut self,
        observer: NodeId,
        area: Area,
    ) -> GraphResult<bool> {
        self.ensure_observer(observer)?;
        let Some(range) = self.find_range(&area) else {
            return Ok(false);
        };
        Ok(self.unlink(range, observer))
    }

    /// Every registered observer, in registration order.
    pub fn observers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.observers.iter().copied()
    }

    /// Counter of a state observer; bumped every time its inputs settle.
    pub fn observer_state(&self, observer: NodeId) -> GraphResult<u64> {
        match self.ensure_observer(observer)? {
            ObserverNode::State { state_id } => Ok(*state_id),
            ObserverNode::Calculation { .. } => Err(GraphError::ObserverKindMismatch(
                observer,
                ObserverKind::Calculation,
            )),
        }
    }

    /// Last result of a calculation observer and whether the last evaluation
    /// changed it.
    pub fn observer_result(&self, observer: NodeId) -> GraphResult<(&Value, bool)> {
        match self.ensure_observer(observer)? {
            ObserverNode::Calculation { result, updated } => Ok((result, *updated)),
            ObserverNode::State { .. } => Err(GraphError::ObserverKindMismatch(
                observer,
                ObserverKind::State,
            )),
        }
    }

    /// Whether the last evaluation of a calculation observer changed its
    /// result.
    pub fn observer_updated(&self, observer: NodeId) -> GraphResult<bool> {
        self.observer_result(observer).map(|(_, updated)| updated)
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{Area, CellAddress, SheetId};
    use crate::error::GraphError;
    use crate::graph::{Graph, ObserverKind};

    const S1: SheetId = SheetId::new(1);

    fn a(row: u32, column: u32) -> CellAddress {
        CellAddress::new(S1, row, column)
    }

    #[test]
    fn observer_wiring_and_removal() {
        let mut graph = Graph::new();
        let chart = graph.add_observer(ObserverKind::State);
        let cell = graph.add_observer_dependency(chart, a(0, 0)).unwrap();
        let range = graph
            .add_observer_range_dependency(chart, Area::column(S1, 1))
            .unwrap();

        let node = graph.node(chart).unwrap();
        assert!(node.edges_in().contains(&cell));
        assert!(node.edges_in().contains(&range));
        assert!(node.edges_out().is_empty());

        graph.remove_observer(chart).unwrap();
        assert!(graph.node(chart).is_none());
        assert!(graph.node_id(a(0, 0)).is_none());
        assert_eq!(graph.range_count(), 0);
        assert_eq!(graph.observers().count(), 0);
    }

    #[test]
    fn observers_cannot_gain_dependents() {
        let mut graph = Graph::new();
        let chart = graph.add_observer(ObserverKind::State);
        let cell = graph.get_or_create_cell(a(0, 0));
        assert_eq!(
            graph.depends_on(cell, chart),
            Err(GraphError::ObserverDependent(chart))
        );
    }

    #[test]
    fn cell_nodes_are_not_observers() {
        let mut graph = Graph::new();
        let cell = graph.get_or_create_cell(a(0, 0));
        assert_eq!(
            graph.add_observer_dependency(cell, a(1, 0)),
            Err(GraphError::NotAnObserver(cell))
        );
        assert_eq!(graph.remove_observer(cell), Err(GraphError::NotAnObserver(cell)));
    }

    #[test]
    fn observer_accessors_check_the_flavor() {
        let mut graph = Graph::new();
        let state = graph.add_observer(ObserverKind::State);
        let format = graph.add_observer(ObserverKind::Calculation);

        assert_eq!(graph.observer_state(state), Ok(0));
        assert_eq!(
            graph.observer_state(format),
            Err(GraphError::ObserverKindMismatch(format, ObserverKind::Calculation))
        );
        let (result, updated) = graph.observer_result(format).unwrap();
        assert_eq!(result, &crate::Value::Empty);
        assert!(!updated);
        assert_eq!(graph.observer_updated(format), Ok(false));
        assert!(graph.observer_updated(state).is_err());
    }

    #[test]
    fn removing_an_observer_dependency() {
        let mut graph = Graph::new();
        let chart = graph.add_observer(ObserverKind::State);
        graph.add_observer_dependency(chart, a(0, 0)).unwrap();
        graph
            .add_observer_range_dependency(chart, Area::row(S1, 4))
            .unwrap();

        assert_eq!(graph.remove_observer_dependency(chart, a(0, 0)), Ok(true));
        assert_eq!(graph.remove_observer_dependency(chart, a(0, 0)), Ok(false));
        assert_eq!(
            graph.remove_observer_range_dependency(chart, Area::row(S1, 4)),
            Ok(true)
        );
        assert!(graph.node(chart).unwrap().is_isolated());
    }
}
