//! Node Storage
//!
//! [`NodeArena`] owns every node; [`CellRegistry`] is the sparse
//! `sheet -> column -> row` index used to find cell nodes by address and to
//! enumerate the realized cells inside an area.

use std::collections::BTreeMap;

use crate::address::{Area, CellAddress, SheetId, Span};

use super::node::{Node, NodeId};

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Generational slot storage for graph nodes.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl NodeArena {
    pub fn insert_with(&mut self, build: impl FnOnce(NodeId) -> Node) -> NodeId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = NodeId::new(index, slot.generation);
        slot.node = Some(build(id));
        self.len += 1;
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.slots.iter().filter_map(|slot| slot.node.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.node.as_mut())
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(Node::id).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

/// Sparse `nodes[sheet][column][row]` index of cell nodes.
#[derive(Debug, Default)]
pub(crate) struct CellRegistry {
    sheets: BTreeMap<SheetId, BTreeMap<u32, BTreeMap<u32, NodeId>>>,
    len: usize,
}

impl CellRegistry {
    pub fn get(&self, address: CellAddress) -> Option<NodeId> {
        self.sheets
            .get(&address.sheet)?
            .get(&address.column)?
            .get(&address.row)
            .copied()
    }

    pub fn insert(&mut self, address: CellAddress, id: NodeId) {
        let previous = self
            .sheets
            .entry(address.sheet)
            .or_default()
            .entry(address.column)
            .or_default()
            .insert(address.row, id);
        if previous.is_none() {
            self.len += 1;
        }
    }

    pub fn remove(&mut self, address: CellAddress) -> Option<NodeId> {
        let columns = self.sheets.get_mut(&address.sheet)?;
        let rows = columns.get_mut(&address.column)?;
        let id = rows.remove(&address.row)?;
        if rows.is_empty() {
            columns.remove(&address.column);
        }
        if columns.is_empty() {
            self.sheets.remove(&address.sheet);
        }
        self.len -= 1;
        Some(id)
    }

    /// Realized cell nodes inside `area`, column by column.
    ///
    /// Only columns and rows that actually hold nodes are visited, so an
    /// unbounded area costs no more than the cells that exist.
    pub fn in_area(&self, area: &Area) -> Vec<NodeId> {
        let Some(columns) = self.sheets.get(&area.sheet) else {
            return Vec::new();
        };
        let inverted = |span: Span| span.end.is_some_and(|end| end < span.start);
        if inverted(area.rows) || inverted(area.columns) {
            return Vec::new();
        }
        let column_span = match area.columns.end {
            Some(end) => columns.range(area.columns.start..=end),
            None => columns.range(area.columns.start..),
        };
        let mut found = Vec::new();
        for (_, rows) in column_span {
            let row_span = match area.rows.end {
                Some(end) => rows.range(area.rows.start..=end),
                None => rows.range(area.rows.start..),
            };
            found.extend(row_span.map(|(_, id)| *id));
        }
        found
    }

    pub fn len(&self) -> usize {
        self.len
    }
}
