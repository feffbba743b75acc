//! Evaluation Context
//!
//! The evaluation callback runs while the graph is in the middle of a pass,
//! so it cannot be handed the graph itself. Instead it receives an
//! [`EvalContext`] scoped to the cell being evaluated: it can read which cell
//! that is and record changes to that cell's own dependencies. The graph
//! applies the recorded edits as soon as the callback returns.
//!
//! This is how formulas whose references depend on other cells' values
//! (`INDIRECT`, `OFFSET`) rewire themselves mid-pass.

use smallvec::SmallVec;

use crate::address::{Area, CellAddress};

/// One structural change requested by the evaluation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyEdit {
    AddCell(CellAddress),
    RemoveCell(CellAddress),
    AddRange(Area),
    RemoveRange(Area),
}

/// Handle passed to [`Calculator::evaluate`](crate::Calculator::evaluate).
#[derive(Debug)]
pub struct EvalContext {
    address: CellAddress,
    edits: SmallVec<[DependencyEdit; 4]>,
}

impl EvalContext {
    pub(crate) fn new(address: CellAddress) -> Self {
        Self {
            address,
            edits: SmallVec::new(),
        }
    }

    /// The formula cell being evaluated.
    pub fn address(&self) -> CellAddress {
        self.address
    }

    /// Make the current cell depend on `precedent`.
    pub fn add_dependency(&mut self, precedent: CellAddress) {
        self.edits.push(DependencyEdit::AddCell(precedent));
    }

    /// Stop reading the cell at `precedent`.
    pub fn remove_dependency(&mut self, precedent: CellAddress) {
        self.edits.push(DependencyEdit::RemoveCell(precedent));
    }

    /// Make the current cell depend on every cell of `area`.
    pub fn add_range_dependency(&mut self, area: Area) {
        self.edits.push(DependencyEdit::AddRange(area));
    }

    /// Stop reading `area`.
    pub fn remove_range_dependency(&mut self, area: Area) {
        self.edits.push(DependencyEdit::RemoveRange(area));
    }

    /// Edits recorded so far, in call order.
    pub fn edits(&self) -> &[DependencyEdit] {
        &self.edits
    }

    pub(crate) fn into_edits(self) -> SmallVec<[DependencyEdit; 4]> {
        self.edits
    }
}
