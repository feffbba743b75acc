//! Range Nodes
//!
//! A formula reading `A:A` does not get an edge from every cell in column A.
//! It gets one edge from a shared range node, and every realized cell of the
//! area links into that range node. Cells created later are wired in by
//! [`Graph::notify_new_cell`], so the dependent never has to re-scan.
//!
//! Range nodes are shared by every dependent referencing the same area and
//! released when the last one goes away.

use crate::address::{Area, CellAddress};

use super::node::{Node, NodeId};
use super::Graph;

impl Graph {
    /// The range node for `area`, creating and wiring it on first use.
    /// The flag is true when the node was just created.
    pub(crate) fn range_node(&mut self, area: Area) -> (NodeId, bool) {
        if let Some(id) = self.find_range(&area) {
            return (id, false);
        }
        let id = self.arena.insert_with(|id| Node::range(id, area));
        self.ranges.entry(area.sheet).or_default().push(id);
        // A dirty member dirties the range as it links in.
        for member in self.cells.in_area(&area) {
            self.attach(member, id);
        }
        tracing::trace!(area = %area, node = %id, "range node created");
        (id, true)
    }

    pub(crate) fn find_range(&self, area: &Area) -> Option<NodeId> {
        self.ranges.get(&area.sheet)?.iter().copied().find(|id| {
            self.arena
                .get(*id)
                .and_then(Node::as_range)
                .is_some_and(|range| range.area == *area)
        })
    }

    /// Wire a freshly created cell into every range node covering it.
    pub(crate) fn notify_new_cell(&mut self, address: CellAddress, cell: NodeId) {
        let Some(ranges) = self.ranges.get(&address.sheet) else {
            return;
        };
        let covering: Vec<NodeId> = ranges
            .iter()
            .copied()
            .filter(|id| {
                self.arena
                    .get(*id)
                    .and_then(Node::as_range)
                    .is_some_and(|range| range.area.contains(address))
            })
            .collect();
        for range in covering {
            self.attach(cell, range);
        }
    }

    /// Record that the formula at `dependent` reads every cell of `area`.
    /// Returns the shared range node.
    pub fn add_range_dependency(&mut self, dependent: CellAddress, area: Area) -> NodeId {
        let node = self.get_or_create_cell(dependent);
        let (range, _) = self.range_node(area);
        self.attach(range, node);
        range
    }

    /// Drop the edge from `area` to `dependent`, releasing the range node
    /// once nothing reads it.
    pub fn remove_range_dependency(&mut self, dependent: CellAddress, area: Area) -> bool {
        let (Some(node), Some(range)) = (self.cells.get(dependent), self.find_range(&area)) else {
            return false;
        };
        self.unlink(range, node)
    }

    /// Release a range node nobody reads anymore. Member cells left without
    /// edges are pruned with it.
    pub(crate) fn release_range_if_unused(&mut self, id: NodeId) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if node.as_range().is_none() || !node.edges_out().is_empty() {
            return;
        }
        let members: Vec<NodeId> = node.edges_in().iter().copied().collect();
        for member in &members {
            if let Some(cell) = self.arena.get_mut(*member) {
                cell.remove_dependent(id);
            }
        }
        if let Some(range) = self.arena.get_mut(id) {
            range.take_edges();
        }
        self.remove_detached(id);
        self.cycle_check_needed = true;
        for member in members {
            self.prune_if_isolated(member);
        }
    }

    /// Number of live range nodes.
    pub fn range_count(&self) -> usize {
        self.ranges.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{Area, CellAddress, SheetId};
    use crate::graph::Graph;

    const S1: SheetId = SheetId::new(1);

    fn a(row: u32, column: u32) -> CellAddress {
        CellAddress::new(S1, row, column)
    }

    #[test]
    fn range_links_existing_and_later_cells() {
        let mut graph = Graph::new();
        let a2 = graph.get_or_create_cell(a(1, 0));
        let range = graph.add_range_dependency(a(0, 1), Area::column(S1, 0));

        assert!(graph.node(range).unwrap().edges_in().contains(&a2));

        let a1000 = graph.get_or_create_cell(a(999, 0));
        assert!(graph.node(range).unwrap().edges_in().contains(&a1000));
        assert!(graph.node(a1000).unwrap().edges_out().contains(&range));

        // Outside the column: not wired.
        let c1 = graph.get_or_create_cell(a(0, 2));
        assert!(graph.node(c1).unwrap().edges_out().is_empty());
    }

    #[test]
    fn ranges_are_shared_per_area() {
        let mut graph = Graph::new();
        let first = graph.add_range_dependency(a(0, 1), Area::column(S1, 0));
        let second = graph.add_range_dependency(a(0, 2), Area::column(S1, 0));
        let other = graph.add_range_dependency(a(0, 3), Area::bounded(S1, (0, 0), (9, 0)));

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(graph.range_count(), 2);
        assert_eq!(graph.node(first).unwrap().edges_out().len(), 2);
    }

    #[test]
    fn range_is_released_with_last_dependent() {
        let mut graph = Graph::new();
        graph.get_or_create_cell(a(4, 0));
        graph.add_range_dependency(a(0, 1), Area::column(S1, 0));
        let range = graph.add_range_dependency(a(0, 2), Area::column(S1, 0));

        assert!(graph.remove_range_dependency(a(0, 1), Area::column(S1, 0)));
        assert!(graph.node(range).is_some());

        graph.reset_dependencies(a(0, 2));
        assert!(graph.node(range).is_none());
        assert_eq!(graph.range_count(), 0);
        // A5 only existed as a range member.
        assert!(graph.node_id(a(4, 0)).is_none());
    }

    #[test]
    fn new_range_inherits_dirty_members() {
        let mut graph = Graph::new();
        graph.mark_dirty(a(3, 0));
        let range = graph.add_range_dependency(a(0, 1), Area::column(S1, 0));
        assert!(graph.node(range).unwrap().is_dirty());
        assert!(graph.is_dirty(a(0, 1)));
    }

    #[test]
    fn dependent_inside_its_own_range_is_wired_as_member() {
        let mut graph = Graph::new();
        // A1 = SUM(A:A)
        let range = graph.add_range_dependency(a(0, 0), Area::column(S1, 0));
        let a1 = graph.node_id(a(0, 0)).unwrap();
        let node = graph.node(range).unwrap();
        assert!(node.edges_in().contains(&a1));
        assert!(node.edges_out().contains(&a1));
        assert!(graph.check_for_cycles(false));
    }
}
