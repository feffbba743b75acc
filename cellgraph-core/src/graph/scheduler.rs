//! Recalculation Scheduler
//!
//! Editing a cell marks it dirty, and dirtiness spreads to everything
//! downstream. A recalculation pass then settles the dirty nodes.
//!
//! # Algorithm
//!
//! No topological order is computed up front. Instead:
//!
//! 1. Volatile nodes are marked dirty.
//! 2. Spilled arrays whose anchor is dirty are cleared.
//! 3. The dirty queue becomes the calculation queue.
//! 4. If edges changed since the last check, loops are classified.
//! 5. The queue is processed by index while it grows. A node is skipped
//!    while any input is still dirty; when a node settles, each dirty
//!    dependent is appended, so a node with several inputs is reached once
//!    per input and runs on the last visit.
//!
//! Loop detection runs before the queue is processed and only walks nodes
//! not yet classified, so a pass stays linear in the size of the graph.
//!
//! Formulas may rewire their own inputs while being evaluated. The queue
//! tolerates that, and anything left dirty because of it is retried once
//! after a forced loop check.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::address::CellAddress;
use crate::error::{GraphError, GraphResult};
use crate::host::{Calculator, CellStore, Evaluation};
use crate::value::{ErrorKind, Value};

use super::context::{DependencyEdit, EvalContext};
use super::node::{Color, Node, NodeId, NodeKind, ObserverNode};
use super::Graph;

/// Counters from one recalculation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecalcReport {
    /// Nodes that settled normally.
    pub evaluated: usize,

    /// Nodes that settled as part of a dependency loop.
    pub loop_errors: usize,

    /// Visits skipped because an input was still dirty.
    pub deferred: usize,

    /// Nodes still dirty when the pass ended.
    pub stalled: usize,

    /// Nodes entered by loop detection during the pass.
    pub explored: usize,
}

impl Graph {
    /// Mark the cell at `address` and everything downstream dirty, creating
    /// the cell node if needed.
    pub fn mark_dirty(&mut self, address: CellAddress) -> NodeId {
        let id = self.get_or_create_cell(address);
        self.propagate_dirty(id);
        id
    }

    /// Mark a node of any kind and everything downstream dirty.
    pub fn mark_node_dirty(&mut self, id: NodeId) -> GraphResult<()> {
        if !self.arena.contains(id) {
            return Err(GraphError::UnknownNode(id));
        }
        self.propagate_dirty(id);
        Ok(())
    }

    /// Nodes dirtied since the last pass, in marking order.
    pub fn dirty_queue(&self) -> &[NodeId] {
        &self.dirty_queue
    }

    /// Nodes reported volatile, re-dirtied at the start of the next pass.
    pub fn volatile_queue(&self) -> &IndexSet<NodeId> {
        &self.volatile_queue
    }

    /// Iterative dirty marking. Nodes already dirty stop the walk, so
    /// marking twice queues nothing new.
    pub(crate) fn propagate_dirty(&mut self, start: NodeId) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.arena.get_mut(id) else {
                continue;
            };
            if node.dirty {
                continue;
            }
            node.dirty = true;
            self.dirty_queue.push(id);
            stack.extend(node.edges_out().iter().rev().copied());
        }
    }

    /// Bring every cell node in line with the host after a load.
    ///
    /// Formula cells are marked dirty for the first pass; literal cells take
    /// their value from the store.
    pub fn initialize<H: CellStore>(&mut self, host: &mut H) {
        let _span = tracing::debug_span!("initialize", cells = self.cells.len()).entered();

        let cells: Vec<(NodeId, CellAddress)> = self
            .arena
            .iter()
            .filter_map(|node| node.address().map(|address| (node.id(), address)))
            .collect();
        for (id, address) in cells {
            host.ensure_cell(address);
            if host.is_formula(address) {
                self.propagate_dirty(id);
                if host.is_volatile(address) {
                    self.volatile_queue.insert(id);
                }
            } else {
                let value = host.get_value(address);
                if let Some(cell) = self.arena.get_mut(id).and_then(Node::as_cell_mut) {
                    cell.result = value;
                }
            }
        }

        if self.config.cycle_check_on_initialize {
            self.cycle_check_needed = true;
        }
        tracing::debug!(dirty = self.dirty_queue.len(), "graph initialized");
    }

    /// Run one recalculation pass.
    pub fn recalculate<H: CellStore + Calculator>(&mut self, host: &mut H) -> RecalcReport {
        let _span = tracing::debug_span!("recalculate", dirty = self.dirty_queue.len()).entered();
        let mut report = RecalcReport::default();
        let explored_before = self.explored;
        self.short_circuited.clear();

        for id in std::mem::take(&mut self.volatile_queue) {
            self.propagate_dirty(id);
        }

        self.teardown_stale_spills(host);

        self.calculation_queue.append(&mut self.dirty_queue);
        if self.cycle_check_needed {
            self.check_for_cycles(false);
            // Nodes released from a loop were just re-dirtied.
            self.calculation_queue.append(&mut self.dirty_queue);
        }

        self.drain_calculation_queue(host, &mut report);

        let mut stalled = self.collect_stalled();
        if !stalled.is_empty() && self.cycle_check_needed {
            tracing::debug!(stalled = stalled.len(), "retrying stalled nodes after loop check");
            self.check_for_cycles(true);
            self.calculation_queue = stalled;
            self.calculation_queue.append(&mut self.dirty_queue);
            self.drain_calculation_queue(host, &mut report);
            stalled = self.collect_stalled();
        }

        report.stalled = stalled.len();
        report.explored = self.explored - explored_before;
        if !stalled.is_empty() {
            tracing::warn!(stalled = stalled.len(), "nodes left dirty after recalculation");
        }
        self.dirty_queue = stalled;

        tracing::debug!(
            evaluated = report.evaluated,
            loop_errors = report.loop_errors,
            deferred = report.deferred,
            explored = report.explored,
            "recalculation finished"
        );
        report
    }

    fn drain_calculation_queue<H: CellStore + Calculator>(
        &mut self,
        host: &mut H,
        report: &mut RecalcReport,
    ) {
        let mut index = 0;
        while index < self.calculation_queue.len() {
            let id = self.calculation_queue[index];
            index += 1;
            self.evaluate(id, host, report);
        }
    }

    /// Empty both queues, keeping each node that is still dirty once.
    fn collect_stalled(&mut self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let queued: Vec<NodeId> = self
            .calculation_queue
            .drain(..)
            .chain(self.dirty_queue.drain(..))
            .collect();
        queued
            .into_iter()
            .filter(|id| seen.insert(*id) && self.arena.get(*id).is_some_and(Node::is_dirty))
            .collect()
    }

    /// Visit one queued node.
    fn evaluate<H: CellStore + Calculator>(
        &mut self,
        id: NodeId,
        host: &mut H,
        report: &mut RecalcReport,
    ) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if !node.dirty {
            return;
        }
        let (in_loop, color) = (node.in_loop, node.color);
        if in_loop || (color == Color::Unvisited && self.detect_cycle(id)) {
            self.settle_loop(id, host);
            report.loop_errors += 1;
            return;
        }
        if self.has_dirty_input(id) {
            report.deferred += 1;
            tracing::trace!(node = %self.render_address(id), "deferred on dirty input");
            return;
        }

        let settled = match self.arena.get(id).map(Node::kind) {
            Some(NodeKind::Cell(_)) => self.evaluate_cell(id, host, report),
            Some(NodeKind::Range(_)) => true,
            Some(NodeKind::Observer(_)) => {
                self.evaluate_observer(id, host);
                true
            }
            None => false,
        };
        if settled {
            self.settle(id);
            report.evaluated += 1;
        }
    }

    fn has_dirty_input(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some_and(|node| {
            node.edges_in()
                .iter()
                .any(|input| self.arena.get(*input).is_some_and(Node::is_dirty))
        })
    }

    /// Clear the dirty flag and queue every dependent still waiting.
    fn settle(&mut self, id: NodeId) {
        let Some(node) = self.arena.get_mut(id) else {
            return;
        };
        node.dirty = false;
        let dependents: Vec<NodeId> = node.edges_out().iter().copied().collect();
        for dependent in dependents {
            if self.arena.get(dependent).is_some_and(Node::is_dirty) {
                self.calculation_queue.push(dependent);
            }
        }
    }

    /// Settle a node sitting on a loop. Formula cells get the loop error;
    /// literal cells on the loop keep their value.
    fn settle_loop<H: CellStore>(&mut self, id: NodeId, host: &mut H) {
        if let Some(node) = self.arena.get_mut(id) {
            let has_inputs = !node.edges_in().is_empty();
            if let Some(cell) = node.as_cell_mut() {
                if has_inputs || cell.self_reference {
                    cell.result = Value::Error(ErrorKind::Loop);
                    host.set_calculation_error(cell.address, ErrorKind::Loop);
                }
            }
        }
        tracing::trace!(node = %self.render_address(id), "settled on loop");
        self.settle(id);
    }

    /// Evaluate a cell node. Returns false if the node must stay dirty.
    fn evaluate_cell<H: CellStore + Calculator>(
        &mut self,
        id: NodeId,
        host: &mut H,
        report: &mut RecalcReport,
    ) -> bool {
        let Some(address) = self.arena.get(id).and_then(Node::address) else {
            return false;
        };
        host.ensure_cell(address);
        let array_head = host
            .array_range(address)
            .is_some_and(|area| area.top_left() == address);

        let value = if host.is_formula(address) {
            let mut cx = EvalContext::new(address);
            let outcome = host.evaluate(&mut cx);
            let rewired = self.apply_edits(id, address, cx.into_edits());

            if rewired && self.detect_rewired_cycle(id) {
                self.settle_loop(id, host);
                report.loop_errors += 1;
                return false;
            }
            let value = match outcome {
                Evaluation::ShortCircuit => {
                    self.retry_short_circuit(id);
                    return false;
                }
                // Computed against an input that only just became one.
                Evaluation::Computed { .. } if rewired && self.has_dirty_input(id) => {
                    return false;
                }
                Evaluation::Computed { value, volatile } => {
                    if volatile {
                        self.volatile_queue.insert(id);
                    }
                    value
                }
            };
            host.set_calculated_value(address, &value, value.value_type());
            value
        } else {
            host.get_value(address)
        };

        if let Some(cell) = self.arena.get_mut(id).and_then(Node::as_cell_mut) {
            cell.result = value.clone();
            cell.array_head = array_head;
        }

        if array_head {
            host.spread(address, &value);
        } else if value.is_array() {
            self.spill_array(id, address, &value, host, report);
        } else if self.forget_spill(id).is_some() {
            tracing::trace!(anchor = %address, "array result replaced by scalar");
        }
        true
    }

    /// Apply the dependency edits recorded during evaluation. Returns
    /// whether anything was recorded.
    fn apply_edits(
        &mut self,
        id: NodeId,
        address: CellAddress,
        edits: impl IntoIterator<Item = DependencyEdit>,
    ) -> bool {
        let mut rewired = false;
        for edit in edits {
            rewired = true;
            match edit {
                DependencyEdit::AddCell(precedent) => {
                    self.add_dependency(address, precedent);
                }
                DependencyEdit::RemoveCell(precedent) => {
                    self.remove_dependency(address, precedent);
                }
                DependencyEdit::AddRange(area) => {
                    self.add_range_dependency(address, area);
                }
                DependencyEdit::RemoveRange(area) => {
                    self.remove_range_dependency(address, area);
                }
            }
        }
        if rewired {
            if let Some(node) = self.arena.get_mut(id) {
                node.color = Color::Unvisited;
            }
            self.cycle_check_needed = true;
        }
        rewired
    }

    /// A short-circuited node is re-queued once per pass unless a dirty
    /// input will bring it back anyway.
    fn retry_short_circuit(&mut self, id: NodeId) {
        if self.has_dirty_input(id) {
            return;
        }
        if self.short_circuited.insert(id) {
            self.calculation_queue.push(id);
        } else {
            tracing::debug!(node = %self.render_address(id), "short-circuited twice in one pass");
        }
    }

    /// Lay an array result out and settle the cells it touched right away.
    ///
    /// Besides the cells the host reports as changed, every covered cell
    /// that already settled this pass is refreshed: it was cleared along
    /// with the old spill and read before the new one was laid out.
    fn spill_array<H: CellStore + Calculator>(
        &mut self,
        id: NodeId,
        address: CellAddress,
        value: &Value,
        host: &mut H,
        report: &mut RecalcReport,
    ) {
        let outcome = host.spill(address, value);
        let mut refresh: Vec<NodeId> = Vec::new();
        match outcome.area {
            Some(area) => {
                self.record_spill(id, address, area);
                refresh.extend(self.cells.in_area(&area).into_iter().filter(|member| {
                    *member != id && self.arena.get(*member).is_some_and(|node| !node.dirty)
                }));
            }
            None => {
                self.forget_spill(id);
            }
        }
        for changed in outcome.changed {
            let member = self.get_or_create_cell(changed);
            if member != id && !refresh.contains(&member) {
                refresh.push(member);
            }
        }
        for member in refresh {
            self.propagate_dirty(member);
            self.evaluate(member, host, report);
        }
    }

    fn evaluate_observer<H: Calculator>(&mut self, id: NodeId, host: &mut H) {
        let is_state = matches!(
            self.arena.get(id).and_then(Node::as_observer),
            Some(ObserverNode::State { .. })
        );
        if is_state {
            if let Some(NodeKind::Observer(ObserverNode::State { state_id })) =
                self.arena.get_mut(id).map(Node::kind_mut)
            {
                *state_id += 1;
            }
            return;
        }

        let outcome = host.evaluate_observer(id);
        if let Evaluation::Computed { volatile: true, .. } = outcome {
            self.volatile_queue.insert(id);
        }
        if let Some(NodeKind::Observer(ObserverNode::Calculation { result, updated })) =
            self.arena.get_mut(id).map(Node::kind_mut)
        {
            match outcome {
                Evaluation::Computed { value, .. } => {
                    *updated = *result != value;
                    *result = value;
                }
                Evaluation::ShortCircuit => *updated = false,
            }
        }
    }
}
