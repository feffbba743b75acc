//! Cellgraph Core
//!
//! This crate provides the incremental recalculation engine of a
//! spreadsheet. It implements:
//!
//! - A dependency graph over cells, range references and observers
//! - Dirty propagation and a deferring recalculation scheduler
//! - Dependency loop detection
//! - Bookkeeping for array formulas and spilled dynamic arrays
//!
//! The crate does not parse or evaluate formulas and does not store cell
//! data. Both are supplied by the host through the [`CellStore`] and
//! [`Calculator`] traits.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `address`: Sheet, cell and area coordinates
//! - `value`: Cell results, including loop errors and arrays
//! - `graph`: The dependency graph and the recalculation scheduler
//! - `host`: The traits the host implements
//! - `config`: Graph configuration
//! - `error`: Contract violations reported by the graph
//!
//! # Example
//!
//! ```rust,ignore
//! use cellgraph_core::{CellAddress, Graph, SheetId};
//!
//! let sheet = SheetId::new(1);
//! let a1 = CellAddress::new(sheet, 0, 0);
//! let b1 = CellAddress::new(sheet, 0, 1);
//!
//! let mut graph = Graph::new();
//!
//! // B1 = A1 * 2
//! graph.add_dependency(b1, a1);
//!
//! // The user edits A1
//! graph.mark_dirty(a1);
//!
//! // `workbook` implements CellStore + Calculator
//! graph.recalculate(&mut workbook);
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod graph;
pub mod host;
pub mod value;

pub use address::{column_letters, Area, CellAddress, SheetId, Span};
pub use config::{ConfigError, GraphConfig};
pub use error::{GraphError, GraphResult};
pub use graph::{
    CellNode, Color, DependencyEdit, EvalContext, Graph, Node, NodeId, NodeKind, ObserverKind,
    ObserverNode, RangeNode, RecalcReport, SpillRegion,
};
pub use host::{Calculator, CellStore, Evaluation, SpillOutcome};
pub use value::{ArrayValue, ErrorKind, Value, ValueType};
