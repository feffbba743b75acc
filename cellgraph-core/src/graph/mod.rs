//! Dependency Graph
//!
//! This module implements the recalculation graph that tracks which cells,
//! range references and observers depend on which others.
//!
//! # Overview
//!
//! - Nodes are sheet cells, range references (possibly whole rows/columns)
//!   or observers (charts, conditional formats).
//! - Edges represent dependencies: if B reads A, then B ∈ A.edges_out and
//!   A ∈ B.edges_in. The two sides are always kept symmetric.
//!
//! When a cell changes it is marked dirty, and dirtiness spreads along
//! `edges_out`. A recalculation pass then evaluates the dirty nodes,
//! deferring any node whose inputs are still dirty until the last of them
//! settles. No topological sort is precomputed, so formulas that rewire
//! themselves mid-pass are tolerated.
//!
//! # Design Decisions
//!
//! 1. The graph owns every node in one generational arena; nodes refer to
//!    each other by [`NodeId`]. Cells are additionally indexed by address in
//!    a sparse `sheet -> column -> row` registry.
//!
//! 2. Every node shares one record ([`Node`]) with a kind tag, and
//!    evaluation dispatches on the tag.
//!
//! 3. Graph walks (dirty propagation, cycle detection) use explicit stacks
//!    so that long dependency chains cannot overflow the call stack.
//!
//! 4. Range nodes are deduplicated per sheet and reference counted by their
//!    dependents; the registry lives on the graph instance.

mod arena;
mod context;
mod cycle;
mod node;
mod observer;
mod range;
mod scheduler;
mod spill;

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexSet;

use crate::address::{CellAddress, SheetId};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::value::Value;

use arena::{CellRegistry, NodeArena};

pub use context::{DependencyEdit, EvalContext};
pub use node::{CellNode, Color, Node, NodeId, NodeKind, ObserverKind, ObserverNode, RangeNode};
pub use scheduler::RecalcReport;
pub use spill::SpillRegion;

/// The recalculation graph of one workbook.
#[derive(Debug, Default)]
pub struct Graph {
    config: GraphConfig,

    /// Owns every node.
    arena: NodeArena,

    /// Cell nodes by address.
    cells: CellRegistry,

    /// Range nodes, per sheet.
    ranges: BTreeMap<SheetId, Vec<NodeId>>,

    observers: IndexSet<NodeId>,

    /// Nodes dirtied since the last pass.
    dirty_queue: Vec<NodeId>,

    /// Nodes that must re-evaluate on every pass.
    volatile_queue: IndexSet<NodeId>,

    /// Work list of the pass in progress. Grows while it is processed.
    calculation_queue: Vec<NodeId>,

    spill_regions: Vec<SpillRegion>,

    /// Set by every structural edge change; cleared by a clean cycle check.
    cycle_check_needed: bool,

    /// Rendered address of the first node implicated by the last cycle check.
    last_cycle: Option<String>,

    sheet_names: BTreeMap<SheetId, String>,

    /// Nodes that short-circuited during the pass in progress.
    short_circuited: HashSet<NodeId>,

    /// Running count of nodes entered by loop detection.
    explored: usize,
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Configuration the graph was built with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Look up a live node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    /// Id of the cell node at `address`, if one has been created.
    pub fn node_id(&self, address: CellAddress) -> Option<NodeId> {
        self.cells.get(address)
    }

    /// The cell node at `address`, if one has been created.
    pub fn cell(&self, address: CellAddress) -> Option<&Node> {
        self.cells.get(address).and_then(|id| self.arena.get(id))
    }

    /// Last value the cell at `address` settled on.
    pub fn result(&self, address: CellAddress) -> Option<&Value> {
        self.cell(address)
            .and_then(Node::as_cell)
            .map(CellNode::result)
    }

    /// Whether the cell at `address` awaits recalculation.
    pub fn is_dirty(&self, address: CellAddress) -> bool {
        self.cell(address).is_some_and(Node::is_dirty)
    }

    /// Whether the cell currently sits on a dependency loop.
    pub fn has_loop_error(&self, address: CellAddress) -> bool {
        self.cell(address).is_some_and(Node::in_loop)
    }

    /// Every live node, in slot order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.arena.iter()
    }

    /// Number of live nodes of every kind.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Number of cell nodes.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Name a sheet for `render_address`.
    pub fn set_sheet_name(&mut self, sheet: SheetId, name: impl Into<String>) {
        self.sheet_names.insert(sheet, name.into());
    }

    /// Get the cell node at `address`, creating it on first reference.
    ///
    /// A new cell is wired into every registered range containing it and
    /// picks up the spill mark of any array already covering it.
    pub fn get_or_create_cell(&mut self, address: CellAddress) -> NodeId {
        if let Some(id) = self.cells.get(address) {
            return id;
        }
        let id = self.arena.insert_with(|id| Node::cell(id, address));
        self.cells.insert(address, id);

        let spill_owner = self
            .spill_regions
            .iter()
            .find(|region| region.area.contains(address) && region.anchor != address)
            .map(|region| region.owner);
        if let Some(cell) = self.arena.get_mut(id).and_then(Node::as_cell_mut) {
            cell.spill_owner = spill_owner;
        }

        self.notify_new_cell(address, id);
        tracing::trace!(cell = %address, node = %id, "cell node created");
        id
    }

    /// Add the edge `from -> to`: `to` depends on `from`.
    ///
    /// Returns `Ok(false)` if the edge already exists or `from == to`.
    /// Observers are terminal, so an observer `from` is rejected.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> GraphResult<bool> {
        let source = self.arena.get(from).ok_or(GraphError::UnknownNode(from))?;
        if source.is_observer() {
            return Err(GraphError::ObserverDependent(from));
        }
        if !self.arena.contains(to) {
            return Err(GraphError::UnknownNode(to));
        }
        Ok(self.attach(from, to))
    }

    /// Make `node` depend on `dependency`.
    pub fn depends_on(&mut self, node: NodeId, dependency: NodeId) -> GraphResult<bool> {
        self.link(dependency, node)
    }

    /// Remove the edge `from -> to`. A range node that loses its last
    /// dependent is released.
    pub fn unlink(&mut self, from: NodeId, to: NodeId) -> bool {
        let removed = self
            .arena
            .get_mut(from)
            .is_some_and(|source| source.remove_dependent(to));
        if let Some(target) = self.arena.get_mut(to) {
            target.remove_dependency(from);
        }
        if removed {
            self.cycle_check_needed = true;
            self.release_range_if_unused(from);
        }
        removed
    }

    /// Edge insertion shared by every caller that already knows `from` is
    /// not an observer.
    ///
    /// A dirty source dirties the target, so a node never looks clean while
    /// one of its inputs is stale.
    pub(crate) fn attach(&mut self, from: NodeId, to: NodeId) -> bool {
        debug_assert!(!self.arena.get(from).is_some_and(Node::is_observer));
        if from == to || !self.arena.contains(to) {
            return false;
        }
        let Some(source) = self.arena.get_mut(from) else {
            return false;
        };
        if !source.insert_dependent(to) {
            return false;
        }
        let source_dirty = source.dirty;
        if let Some(target) = self.arena.get_mut(to) {
            target.add_dependency(from);
        }
        self.cycle_check_needed = true;
        if source_dirty {
            self.propagate_dirty(to);
        }
        true
    }

    /// Record that the formula at `dependent` reads `precedent`, creating
    /// either cell node as needed. Returns the dependent's node.
    ///
    /// A self reference is kept as a flag on the cell rather than an edge.
    pub fn add_dependency(&mut self, dependent: CellAddress, precedent: CellAddress) -> NodeId {
        let node = self.get_or_create_cell(dependent);
        if dependent == precedent {
            if let Some(cell) = self.arena.get_mut(node).and_then(Node::as_cell_mut) {
                cell.self_reference = true;
            }
            self.cycle_check_needed = true;
            return node;
        }
        let source = self.get_or_create_cell(precedent);
        self.attach(source, node);
        self.link_array_head(precedent, node);
        node
    }

    /// Drop the edge `precedent -> dependent`, pruning the precedent if it is
    /// left isolated. Returns whether an edge was removed.
    pub fn remove_dependency(&mut self, dependent: CellAddress, precedent: CellAddress) -> bool {
        let Some(node) = self.cells.get(dependent) else {
            return false;
        };
        if dependent == precedent {
            let cell = self.arena.get_mut(node).and_then(Node::as_cell_mut);
            let removed = cell.is_some_and(|cell| std::mem::take(&mut cell.self_reference));
            if removed {
                self.cycle_check_needed = true;
            }
            return removed;
        }
        let Some(source) = self.cells.get(precedent) else {
            return false;
        };
        let removed = self.unlink(source, node);
        if removed {
            self.prune_if_isolated(source);
        }
        removed
    }

    /// Drop every input of the cell at `address` (its formula changed or was
    /// cleared). Cells left without any edge are removed afterwards.
    pub fn reset_dependencies(&mut self, address: CellAddress) {
        let Some(id) = self.cells.get(address) else {
            return;
        };
        let inputs: Vec<NodeId> = match self.arena.get_mut(id) {
            Some(node) => {
                if let Some(cell) = node.as_cell_mut() {
                    if std::mem::take(&mut cell.self_reference) {
                        self.cycle_check_needed = true;
                    }
                }
                node.edges_in().iter().copied().collect()
            }
            None => return,
        };
        for input in &inputs {
            self.unlink(*input, id);
        }
        for input in inputs {
            self.prune_if_isolated(input);
        }
        self.prune_if_isolated(id);
    }

    /// Sever every edge of the cell at `address`, on both sides.
    pub fn reset_node(&mut self, address: CellAddress) -> bool {
        let Some(id) = self.cells.get(address) else {
            return false;
        };
        if let Some(cell) = self.arena.get_mut(id).and_then(Node::as_cell_mut) {
            if std::mem::take(&mut cell.self_reference) {
                self.cycle_check_needed = true;
            }
        }
        self.sever(id);
        true
    }

    /// Remove the cell node at `address`. Its dependents are marked dirty
    /// since one of their inputs just disappeared.
    pub fn remove_node(&mut self, address: CellAddress) -> bool {
        let Some(id) = self.cells.get(address) else {
            return false;
        };
        let dependents: Vec<NodeId> = self
            .arena
            .get(id)
            .map(|node| node.edges_out().iter().copied().collect())
            .unwrap_or_default();
        for dependent in dependents {
            self.propagate_dirty(dependent);
        }
        self.sever(id);
        self.remove_detached(id);
        true
    }

    /// Detach every edge of `id` on both sides.
    pub(crate) fn sever(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        let (inputs, dependents) = node.take_edges();
        if inputs.is_empty() && dependents.is_empty() {
            return;
        }
        self.cycle_check_needed = true;
        for dependent in &dependents {
            if let Some(node) = self.arena.get_mut(*dependent) {
                node.remove_dependency(id);
            }
        }
        for input in inputs {
            if let Some(node) = self.arena.get_mut(input) {
                node.remove_dependent(id);
            }
            self.release_range_if_unused(input);
        }
    }

    /// Remove a cell node with no edges left, if pruning is enabled and it
    /// carries no other state the graph must remember.
    pub(crate) fn prune_if_isolated(&mut self, id: NodeId) {
        if !self.config.prune_isolated_cells {
            return;
        }
        let Some(node) = self.arena.get(id) else {
            return;
        };
        let Some(cell) = node.as_cell() else {
            return;
        };
        let removable = node.is_isolated()
            && !cell.self_reference
            && cell.spill_owner.is_none()
            && !self.spill_regions.iter().any(|region| region.owner == id);
        if removable {
            self.remove_detached(id);
        }
    }

    /// Drop an edgeless node from every registry.
    ///
    /// Queue entries are left behind; passes skip ids that no longer
    /// resolve.
    fn remove_detached(&mut self, id: NodeId) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };
        match node.kind() {
            NodeKind::Cell(cell) => {
                self.cells.remove(cell.address);
            }
            NodeKind::Range(range) => {
                if let Some(list) = self.ranges.get_mut(&range.area.sheet) {
                    list.retain(|other| *other != id);
                }
            }
            NodeKind::Observer(_) => {
                self.observers.shift_remove(&id);
            }
        }
        tracing::trace!(node = %id, "node removed");
    }

    /// Human-readable name of a node, e.g. `Sheet1!B3` or `'Q1 Plan'!A:A`.
    pub fn render_address(&self, id: NodeId) -> String {
        match self.arena.get(id).map(Node::kind) {
            Some(NodeKind::Cell(cell)) => {
                format!("{}!{}", self.sheet_label(cell.address.sheet), cell.address)
            }
            Some(NodeKind::Range(range)) => {
                format!("{}!{}", self.sheet_label(range.area.sheet), range.area)
            }
            Some(NodeKind::Observer(_)) => format!("observer {id}"),
            None => format!("removed node {id}"),
        }
    }

    fn sheet_label(&self, sheet: SheetId) -> String {
        let name = match self.sheet_names.get(&sheet) {
            Some(name) => name.clone(),
            None => format!("{}{}", self.config.sheet_label_prefix, sheet.raw()),
        };
        let plain = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if plain {
            name
        } else {
            format!("'{}'", name.replace('\'', "''"))
        }
    }

    /// Drop every node, queue and registry, e.g. when the document reloads.
    /// The configuration is kept.
    pub fn flush(&mut self) {
        let config = std::mem::take(&mut self.config);
        *self = Self::with_config(config);
        tracing::debug!("graph flushed");
    }
}
