//! Calculated Values
//!
//! The graph never interprets values beyond two questions: "is this an
//! array?" (spill handling) and "did it change?" (observer updates). The
//! representation is still a full tagged value so that the cell store and
//! the evaluation callback can exchange results through the graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Calculation error codes a cell can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The cell takes part in a dependency loop.
    Loop,
    /// A reference points outside the sheet or to a deleted cell.
    Ref,
    /// An operand has the wrong type.
    Value,
    /// Division by zero.
    DivZero,
    /// A dynamic array could not be laid out.
    Spill,
    /// No value is available.
    NotAvailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ErrorKind::Loop => "#LOOP!",
            ErrorKind::Ref => "#REF!",
            ErrorKind::Value => "#VALUE!",
            ErrorKind::DivZero => "#DIV/0!",
            ErrorKind::Spill => "#SPILL!",
            ErrorKind::NotAvailable => "#N/A",
        };
        f.write_str(code)
    }
}

/// A row-major block of values produced by an array formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    rows: u32,
    columns: u32,
    values: Vec<Value>,
}

impl ArrayValue {
    /// Build an array; returns `None` if `values` does not fill the shape.
    pub fn new(rows: u32, columns: u32, values: Vec<Value>) -> Option<Self> {
        let expected = rows as usize * columns as usize;
        (expected == values.len()).then_some(Self {
            rows,
            columns,
            values,
        })
    }

    /// A single-column array.
    pub fn column(values: Vec<Value>) -> Self {
        Self {
            rows: values.len() as u32,
            columns: 1,
            values,
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Element at a zero-based position.
    pub fn get(&self, row: u32, column: u32) -> Option<&Value> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        self.values.get(row as usize * self.columns as usize + column as usize)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// The result held by a cell node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorKind),
    Array(ArrayValue),
}

/// Type tag handed to the cell store alongside a calculated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Empty,
    Number,
    Text,
    Boolean,
    Error,
    Array,
}

impl Value {
    /// Type tag reported to the cell store with a calculated value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Empty => ValueType::Empty,
            Value::Number(_) => ValueType::Number,
            Value::Text(_) => ValueType::Text,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Error(_) => ValueType::Error,
            Value::Array(_) => ValueType::Array,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match self {
            Value::Error(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<ErrorKind> for Value {
    fn from(kind: ErrorKind) -> Self {
        Value::Error(kind)
    }
}
