//! Host Interfaces
//!
//! The graph decides *whether* and *in what order* cells recalculate; the
//! host decides *what* they compute and where values live. The host plugs in
//! through two traits:
//!
//! - [`CellStore`]: the cell/sheet data model. The graph keeps only the
//!   address of each cell as its back-reference into the store.
//! - [`Calculator`]: the formula evaluation, array spread and dynamic spill
//!   callbacks.
//!
//! Both are passed by `&mut` into each pass; the graph never stores them.

use crate::address::{Area, CellAddress};
use crate::graph::{EvalContext, NodeId};
use crate::value::{ErrorKind, Value, ValueType};

/// The cell data model as seen by the graph.
pub trait CellStore {
    /// Materialize an empty cell at `address` if none exists.
    ///
    /// Called before every cell evaluation, so a node whose backing cell
    /// vanished (e.g. after a reload) keeps its edges instead of erroring.
    fn ensure_cell(&mut self, address: CellAddress);

    /// Whether the cell holds a formula, as opposed to a literal value.
    fn is_formula(&self, address: CellAddress) -> bool;

    /// The literal value of a non-formula cell.
    fn get_value(&self, address: CellAddress) -> Value;

    /// Store a freshly calculated formula result.
    fn set_calculated_value(&mut self, address: CellAddress, value: &Value, kind: ValueType);

    /// Flag a calculation error on the cell.
    fn set_calculation_error(&mut self, address: CellAddress, kind: ErrorKind);

    /// Target range of the legacy array formula covering `address`, if any.
    fn array_range(&self, _address: CellAddress) -> Option<Area> {
        None
    }

    /// Whether the cell's formula must recalculate on every pass.
    fn is_volatile(&self, _address: CellAddress) -> bool {
        false
    }
}

/// Outcome of one evaluation callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The formula produced a value.
    Computed { value: Value, volatile: bool },

    /// Evaluation changed the cell's dependencies and must not be trusted;
    /// the graph re-runs it once its new inputs are clean.
    ShortCircuit,
}

impl Evaluation {
    /// A computed, non-volatile result.
    pub fn value(value: impl Into<Value>) -> Self {
        Evaluation::Computed {
            value: value.into(),
            volatile: false,
        }
    }

    /// A computed result that must be recalculated on every pass.
    pub fn volatile(value: impl Into<Value>) -> Self {
        Evaluation::Computed {
            value: value.into(),
            volatile: true,
        }
    }
}

/// What the host reports after laying out a dynamic array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpillOutcome {
    /// The area the array now occupies, anchor included. `None` when the
    /// array could not be laid out.
    pub area: Option<Area>,

    /// Cells whose array membership changed (newly covered or uncovered).
    pub changed: Vec<CellAddress>,
}

/// Formula evaluation callbacks.
pub trait Calculator {
    /// Evaluate the formula at `cx.address()`.
    fn evaluate(&mut self, cx: &mut EvalContext) -> Evaluation;

    /// Evaluate a calculation observer's expression.
    fn evaluate_observer(&mut self, _observer: NodeId) -> Evaluation {
        Evaluation::value(Value::Empty)
    }

    /// Lay an array result out across the target range of the array formula
    /// anchored at `head`.
    fn spread(&mut self, _head: CellAddress, _value: &Value) {}

    /// Lay a dynamic array result out starting at `anchor`.
    fn spill(&mut self, _anchor: CellAddress, _value: &Value) -> SpillOutcome {
        SpillOutcome::default()
    }

    /// Remove the values a previous spill from `anchor` laid across `area`.
    fn clear_spill(&mut self, _anchor: CellAddress, _area: Area) {}
}
