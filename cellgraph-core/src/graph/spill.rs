//! Dynamic Array Spill
//!
//! A formula returning an array lays its values across the cells right and
//! below its anchor. The graph remembers each such region so it can:
//!
//! - clear the region before the anchor recalculates, marking the covered
//!   cells dirty since their displayed values are about to change;
//! - route a formula that reads a covered cell to the anchor, through an
//!   implicit edge `anchor -> reader`, since the value it reads is produced
//!   by the anchor's evaluation.

use crate::address::{Area, CellAddress};
use crate::host::Calculator;

use super::node::{Node, NodeId};
use super::Graph;

/// Area currently covered by the array spilled from `anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillRegion {
    /// Cells covered, anchor included.
    pub area: Area,

    /// Node of the anchor cell.
    pub owner: NodeId,

    pub anchor: CellAddress,
}

impl Graph {
    /// Every array currently spilled.
    pub fn spill_regions(&self) -> &[SpillRegion] {
        &self.spill_regions
    }

    /// The anchor of the spilled array covering `address`, if any.
    pub fn spill_anchor(&self, address: CellAddress) -> Option<CellAddress> {
        self.spill_regions
            .iter()
            .find(|region| region.area.contains(address) && region.anchor != address)
            .map(|region| region.anchor)
    }

    /// Remember that `owner`'s array now covers `area`, replacing whatever it
    /// covered before.
    pub(crate) fn record_spill(&mut self, owner: NodeId, anchor: CellAddress, area: Area) {
        self.forget_spill(owner);
        for member in self.cells.in_area(&area) {
            if member == owner {
                continue;
            }
            if let Some(cell) = self.arena.get_mut(member).and_then(Node::as_cell_mut) {
                cell.spill_owner = Some(owner);
            }
        }
        self.spill_regions.push(SpillRegion { area, owner, anchor });
        tracing::trace!(anchor = %anchor, area = %area, "array spilled");
    }

    /// Drop the region owned by `owner` and the marks it left on its cells.
    pub(crate) fn forget_spill(&mut self, owner: NodeId) -> Option<SpillRegion> {
        let position = self
            .spill_regions
            .iter()
            .position(|region| region.owner == owner)?;
        let region = self.spill_regions.remove(position);
        for member in self.cells.in_area(&region.area) {
            if let Some(cell) = self.arena.get_mut(member).and_then(Node::as_cell_mut) {
                if cell.spill_owner == Some(owner) {
                    cell.spill_owner = None;
                }
            }
        }
        Some(region)
    }

    /// Clear every region whose anchor is about to recalculate or is gone.
    ///
    /// The host erases the spilled values, and every realized cell of the
    /// region other than the anchor is marked dirty.
    pub(crate) fn teardown_stale_spills<H: Calculator>(&mut self, host: &mut H) {
        let stale: Vec<NodeId> = self
            .spill_regions
            .iter()
            .filter(|region| self.arena.get(region.owner).map_or(true, Node::is_dirty))
            .map(|region| region.owner)
            .collect();
        for owner in stale {
            let Some(region) = self.forget_spill(owner) else {
                continue;
            };
            host.clear_spill(region.anchor, region.area);
            for member in self.cells.in_area(&region.area) {
                if member != owner {
                    self.propagate_dirty(member);
                }
            }
            tracing::trace!(anchor = %region.anchor, area = %region.area, "spill cleared");
        }
    }

    /// Add the implicit edge from the anchor of any array covering
    /// `precedent` to `dependent`.
    pub(crate) fn link_array_head(&mut self, precedent: CellAddress, dependent: NodeId) {
        let owners: Vec<NodeId> = self
            .spill_regions
            .iter()
            .filter(|region| region.area.contains(precedent) && region.anchor != precedent)
            .map(|region| region.owner)
            .collect();
        for owner in owners {
            self.attach(owner, dependent);
        }
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
    fn recorded_spill_marks_members_and_routes_readers_to_the_anchor() {
        let mut graph = Graph::new();
        let anchor = graph.get_or_create_cell(a(0, 0));
        let a2 = graph.get_or_create_cell(a(1, 0));
        graph.record_spill(anchor, a(0, 0), Area::bounded(S1, (0, 0), (2, 0)));

        let cell = graph.node(a2).unwrap().as_cell().unwrap();
        assert_eq!(cell.spill_owner(), Some(anchor));
        assert!(graph.node(anchor).unwrap().as_cell().unwrap().spill_owner().is_none());

        // Created after the spill: picks the mark up on creation.
        let a3 = graph.get_or_create_cell(a(2, 0));
        assert_eq!(graph.node(a3).unwrap().as_cell().unwrap().spill_owner(), Some(anchor));

        // B1 = A3 reads a spilled value, so it depends on the anchor too.
        let b1 = graph.add_dependency(a(0, 1), a(2, 0));
        let inputs = graph.node(b1).unwrap().edges_in();
        assert!(inputs.contains(&a3));
        assert!(inputs.contains(&anchor));

        assert_eq!(graph.spill_anchor(a(2, 0)), Some(a(0, 0)));
        assert_eq!(graph.spill_anchor(a(0, 0)), None);
    }

    #[test]
    fn reading_the_anchor_adds_no_extra_edge() {
        let mut graph = Graph::new();
        let anchor = graph.get_or_create_cell(a(0, 0));
        graph.record_spill(anchor, a(0, 0), Area::bounded(S1, (0, 0), (2, 0)));

        let b1 = graph.add_dependency(a(0, 1), a(0, 0));
        assert_eq!(graph.node(b1).unwrap().edges_in().len(), 1);
    }

    #[test]
    fn forgetting_a_spill_clears_marks() {
        let mut graph = Graph::new();
        let anchor = graph.get_or_create_cell(a(0, 0));
        let a2 = graph.get_or_create_cell(a(1, 0));
        graph.record_spill(anchor, a(0, 0), Area::bounded(S1, (0, 0), (1, 0)));

        let region = graph.forget_spill(anchor).unwrap();
        assert_eq!(region.anchor, a(0, 0));
        assert!(graph.spill_regions().is_empty());
        assert!(graph.node(a2).unwrap().as_cell().unwrap().spill_owner().is_none());
    }
}
