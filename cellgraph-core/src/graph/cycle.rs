//! Loop Detection
//!
//! Depth-first search over `edges_out`, driven by an explicit path stack
//! and tracking strongly connected components the way Tarjan's algorithm
//! does. `Exploring` marks a node whose component is still open; once its
//! component closes, every member turns `Done`. A component of two or more
//! nodes is a loop and all of its members are flagged `in_loop`.
//!
//! Nodes feeding a loop without being on it are not flagged; they settle
//! before the loop members do. Since every node entered ends up `Done`, a
//! later walk stops at it, and classifying the whole graph touches each
//! node and edge once.

use std::collections::HashMap;

use super::node::{Color, Node, NodeId};
use super::Graph;

/// Discovery index and lowest index reachable, per entered node.
type Order = HashMap<NodeId, (usize, usize)>;

impl Graph {
    /// Whether `start` lies on a dependency loop, exploring from it if it has
    /// not been classified yet.
    pub fn detect_cycle(&mut self, start: NodeId) -> bool {
        self.explore_from(start, false);
        self.arena.get(start).is_some_and(Node::in_loop)
    }

    /// Like [`Graph::detect_cycle`] for a node whose inputs just changed.
    ///
    /// A loop closed by the new inputs runs through nodes downstream of
    /// `start`, which are dirty while it is; those are walked again even if
    /// an earlier check classified them.
    pub(crate) fn detect_rewired_cycle(&mut self, start: NodeId) -> bool {
        self.explore_from(start, true);
        self.arena.get(start).is_some_and(Node::in_loop)
    }

    /// Whether a walk may enter `id`.
    fn is_open(&self, id: NodeId, reopen_dirty: bool) -> bool {
        self.arena.get(id).is_some_and(|node| {
            node.color == Color::Unvisited || (reopen_dirty && (node.dirty || node.in_loop))
        })
    }

    fn enter(&mut self, id: NodeId, order: &mut Order, stack: &mut Vec<NodeId>) {
        let index = order.len();
        order.insert(id, (index, index));
        stack.push(id);
        self.explored += 1;
        if let Some(node) = self.arena.get_mut(id) {
            node.color = Color::Exploring;
            if node.as_cell().is_some_and(|cell| cell.self_reference) {
                node.in_loop = true;
            }
        }
    }

    /// Classify everything reachable from `start` that is still open.
    /// Returns the first node found on a loop.
    fn explore_from(&mut self, start: NodeId, reopen_dirty: bool) -> Option<NodeId> {
        if !self.is_open(start, reopen_dirty) {
            return None;
        }
        let mut order = Order::new();
        let mut stack = Vec::new();
        // (node, index of the next edge to follow)
        let mut path: Vec<(NodeId, usize)> = vec![(start, 0)];
        let mut first = None;
        self.enter(start, &mut order, &mut stack);

        while let Some(frame) = path.last_mut() {
            let (current, cursor) = *frame;
            let next = self
                .arena
                .get(current)
                .and_then(|node| node.edges_out().get_index(cursor).copied());

            if let Some(next) = next {
                frame.1 += 1;
                match order.get(&next).copied() {
                    Some((index, _)) => {
                        if self.arena.get(next).is_some_and(|n| n.color == Color::Exploring) {
                            lower(&mut order, current, index);
                        }
                    }
                    None if self.is_open(next, reopen_dirty) => {
                        self.enter(next, &mut order, &mut stack);
                        path.push((next, 0));
                    }
                    None => {}
                }
                continue;
            }

            path.pop();
            let Some((index, low)) = order.get(&current).copied() else {
                continue;
            };
            if let Some(&(parent, _)) = path.last() {
                lower(&mut order, parent, low);
            }
            if low != index {
                continue;
            }

            let at = stack.iter().rposition(|id| *id == current).unwrap_or(0);
            let component = stack.split_off(at);
            let looped = component.len() > 1;
            for member in &component {
                if let Some(node) = self.arena.get_mut(*member) {
                    node.color = Color::Done;
                    node.in_loop |= looped;
                    if node.in_loop {
                        first.get_or_insert(*member);
                    }
                }
            }
        }
        first
    }

    /// Classify every node, if a structural change happened since the last
    /// clean check (or `force` is set). Returns whether any loop exists.
    ///
    /// Nodes that were on a loop before and no longer are get marked dirty
    /// so their loop error is replaced by a real value.
    pub fn check_for_cycles(&mut self, force: bool) -> bool {
        if !force && !self.cycle_check_needed {
            return self.last_cycle.is_some();
        }
        let _span = tracing::debug_span!("check_for_cycles", nodes = self.arena.len()).entered();

        let mut previously_looped = Vec::new();
        for node in self.arena.iter_mut() {
            if node.in_loop {
                previously_looped.push(node.id());
            }
            node.in_loop = node.as_cell().is_some_and(|cell| cell.self_reference);
            node.color = if node.edges_out().is_empty() {
                Color::Done
            } else {
                Color::Unvisited
            };
        }

        let mut first = None;
        for id in self.arena.ids() {
            if self.arena.get(id).is_some_and(Node::in_loop) {
                first.get_or_insert(id);
            }
            if let Some(found) = self.explore_from(id, false) {
                first.get_or_insert(found);
            }
        }

        for id in previously_looped {
            if self.arena.get(id).is_some_and(|node| !node.in_loop) {
                self.propagate_dirty(id);
            }
        }

        match first {
            Some(id) => {
                let address = self.render_address(id);
                tracing::warn!(node = %address, "dependency loop detected");
                self.last_cycle = Some(address);
                true
            }
            None => {
                self.cycle_check_needed = false;
                self.last_cycle = None;
                false
            }
        }
    }

    /// Rendered address of the first node implicated by the last cycle check
    /// that found a loop.
    pub fn last_cycle(&self) -> Option<&str> {
        self.last_cycle.as_deref()
    }

    /// Whether edges changed since the last check that found no loop.
    pub fn is_cycle_check_needed(&self) -> bool {
        self.cycle_check_needed
    }
}

fn lower(order: &mut Order, id: NodeId, index: usize) {
    if let Some(entry) = order.get_mut(&id) {
        entry.1 = entry.1.min(index);
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{CellAddress, SheetId};
    use crate::graph::{Color, Graph};

    fn a(row: u32) -> CellAddress {
        CellAddress::new(SheetId::new(1), row, 0)
    }

    fn b(row: u32) -> CellAddress {
        CellAddress::new(SheetId::new(1), row, 1)
    }

    /// Row `i + 1` reads row `i`, for `len` cells.
    fn chain(graph: &mut Graph, len: u32) {
        for row in 1..len {
            graph.add_dependency(a(row), a(row - 1));
        }
    }

    #[test]
    fn acyclic_graph_has_no_loops() {
        let mut graph = Graph::new();
        chain(&mut graph, 5);
        assert!(!graph.check_for_cycles(false));
        assert!(!graph.is_cycle_check_needed());
        assert!(graph.nodes().all(|node| node.color() == Color::Done));
        assert!(graph.last_cycle().is_none());
    }

    #[test]
    fn loop_members_are_flagged_but_not_the_cell_feeding_them() {
        let mut graph = Graph::new();
        // A1 -> A2 -> A3 -> A4 -> A2
        chain(&mut graph, 4);
        graph.add_dependency(a(1), a(3));

        assert!(graph.check_for_cycles(false));
        assert!(!graph.has_loop_error(a(0)));
        for row in 1..4 {
            assert!(graph.has_loop_error(a(row)), "row {row}");
        }
        assert!(graph.is_cycle_check_needed());
        assert!(graph.last_cycle().unwrap().starts_with("Sheet1!A"));
    }

    #[test]
    fn downstream_of_loop_is_not_a_member() {
        let mut graph = Graph::new();
        graph.add_dependency(a(0), a(1));
        graph.add_dependency(a(1), a(0));
        graph.add_dependency(a(2), a(1));

        assert!(graph.check_for_cycles(false));
        assert!(graph.has_loop_error(a(0)));
        assert!(graph.has_loop_error(a(1)));
        assert!(!graph.has_loop_error(a(2)));
    }

    #[test]
    fn self_reference_is_a_loop() {
        let mut graph = Graph::new();
        let id = graph.add_dependency(a(0), a(0));
        assert!(graph.detect_cycle(id));
        assert!(graph.check_for_cycles(true));
        assert_eq!(graph.last_cycle(), Some("Sheet1!A1"));
    }

    #[test]
    fn long_chain_does_not_overflow() {
        let mut graph = Graph::new();
        chain(&mut graph, 10_000);
        assert!(!graph.check_for_cycles(false));

        graph.add_dependency(a(0), a(9_999));
        assert!(graph.check_for_cycles(false));
        assert!(graph.has_loop_error(a(0)));
        assert!(graph.has_loop_error(a(5_000)));
    }

    #[test]
    fn long_chain_feeding_a_loop_is_classified_in_one_walk() {
        const LEN: u32 = 10_000;
        let mut graph = Graph::new();
        chain(&mut graph, LEN);
        // B1 reads the end of the chain and B2; B2 reads B1.
        graph.add_dependency(b(0), a(LEN - 1));
        graph.add_dependency(b(0), b(1));
        graph.add_dependency(b(1), b(0));

        let before = graph.explored;
        assert!(graph.check_for_cycles(false));
        assert!(graph.explored - before <= graph.node_count());
        assert!(graph.has_loop_error(b(0)));
        assert!(graph.has_loop_error(b(1)));
        assert!(!graph.has_loop_error(a(0)));
        assert!(!graph.has_loop_error(a(LEN - 1)));
        assert!(graph.nodes().all(|node| node.color() == Color::Done));

        // Classified nodes are answered without walking again.
        let before = graph.explored;
        let head = graph.node_id(a(0)).unwrap();
        assert!(!graph.detect_cycle(head));
        assert_eq!(graph.explored, before);

        // The loop is still there, so the next check runs, again in one walk.
        let before = graph.explored;
        assert!(graph.check_for_cycles(false));
        assert!(graph.explored - before <= graph.node_count());
    }

    #[test]
    fn node_reaching_a_loop_through_a_side_edge_is_a_member() {
        let mut graph = Graph::new();
        // A1 <-> A2, and A1 -> A3 -> A2 closes a second path back.
        graph.add_dependency(a(1), a(0));
        graph.add_dependency(a(0), a(1));
        graph.add_dependency(a(2), a(0));
        graph.add_dependency(a(1), a(2));
        // A4 only reads the loop.
        graph.add_dependency(a(3), a(1));

        assert!(graph.check_for_cycles(false));
        for row in 0..3 {
            assert!(graph.has_loop_error(a(row)), "row {row}");
        }
        assert!(!graph.has_loop_error(a(3)));
    }

    #[test]
    fn breaking_the_loop_clears_flags_and_redirties() {
        let mut graph = Graph::new();
        graph.add_dependency(a(0), a(1));
        graph.add_dependency(a(1), a(0));
        assert!(graph.check_for_cycles(false));

        graph.remove_dependency(a(0), a(1));
        assert!(!graph.check_for_cycles(false));
        assert!(!graph.has_loop_error(a(0)));
        assert!(!graph.has_loop_error(a(1)));
        assert!(graph.is_dirty(a(1)));
    }

    #[test]
    fn skipped_check_reports_previous_outcome() {
        let mut graph = Graph::new();
        graph.add_dependency(a(0), a(0));
        assert!(graph.check_for_cycles(false));
        // Still flagged as needed, since the loop was not broken.
        assert!(graph.check_for_cycles(false));
    }
}
