//! Cell Addresses and Areas
//!
//! Every cell node in the graph is keyed by a [`CellAddress`]. Range nodes
//! are keyed by an [`Area`], which may be unbounded along either axis to
//! express whole-column (`A:A`) and whole-row (`3:3`) references.
//!
//! Rows and columns are 0-based internally and rendered 1-based / lettered.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a worksheet.
///
/// Sheet ids are handed out by the cell store; the graph only uses them to
/// partition its registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SheetId(u32);

impl SheetId {
    /// Create a sheet id from its raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for SheetId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Position of a single cell on a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    pub sheet: SheetId,
    pub row: u32,
    pub column: u32,
}

impl CellAddress {
    #[inline]
    pub const fn new(sheet: SheetId, row: u32, column: u32) -> Self {
        Self { sheet, row, column }
    }
}

/// Renders the sheet-local part, e.g. `B3`.
impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.column), self.row + 1)
    }
}

/// One axis of an [`Area`]. An absent `end` means the span runs to the edge
/// of the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: Option<u32>,
}

impl Span {
    /// A closed span; the bounds may be given in either order.
    pub fn bounded(a: u32, b: u32) -> Self {
        Self {
            start: a.min(b),
            end: Some(a.max(b)),
        }
    }

    /// A span from `start` to the edge of the sheet.
    pub const fn open(start: u32) -> Self {
        Self { start, end: None }
    }

    #[inline]
    pub fn contains(self, index: u32) -> bool {
        index >= self.start && self.end.map_or(true, |end| index <= end)
    }

    pub fn is_unbounded(self) -> bool {
        self.end.is_none()
    }
}

/// A rectangular, possibly unbounded, region of one sheet.
///
/// Two areas are the same range reference iff they are structurally equal;
/// the graph relies on this to deduplicate range nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    pub sheet: SheetId,
    pub rows: Span,
    pub columns: Span,
}

impl Area {
    pub const fn new(sheet: SheetId, rows: Span, columns: Span) -> Self {
        Self {
            sheet,
            rows,
            columns,
        }
    }

    /// A closed rectangle between two corner cells.
    pub fn bounded(sheet: SheetId, first: (u32, u32), last: (u32, u32)) -> Self {
        Self::new(
            sheet,
            Span::bounded(first.0, last.0),
            Span::bounded(first.1, last.1),
        )
    }

    /// The single-cell area covering `address`.
    pub fn cell(address: CellAddress) -> Self {
        Self::bounded(
            address.sheet,
            (address.row, address.column),
            (address.row, address.column),
        )
    }

    /// Whole columns, e.g. `A:C`.
    pub fn columns(sheet: SheetId, first: u32, last: u32) -> Self {
        Self::new(sheet, Span::open(0), Span::bounded(first, last))
    }

    /// A whole column, e.g. `A:A`.
    pub fn column(sheet: SheetId, column: u32) -> Self {
        Self::columns(sheet, column, column)
    }

    /// Whole rows, e.g. `2:4`.
    pub fn rows(sheet: SheetId, first: u32, last: u32) -> Self {
        Self::new(sheet, Span::bounded(first, last), Span::open(0))
    }

    /// A whole row, e.g. `3:3`.
    pub fn row(sheet: SheetId, row: u32) -> Self {
        Self::rows(sheet, row, row)
    }

    #[inline]
    pub fn contains(&self, address: CellAddress) -> bool {
        address.sheet == self.sheet
            && self.rows.contains(address.row)
            && self.columns.contains(address.column)
    }

    pub fn top_left(&self) -> CellAddress {
        CellAddress::new(self.sheet, self.rows.start, self.columns.start)
    }

    /// Whether either span runs to the end of the sheet.
    pub fn is_unbounded(&self) -> bool {
        self.rows.is_unbounded() || self.columns.is_unbounded()
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.top_left();
        match (self.rows.end, self.columns.end) {
            (Some(row), Some(column)) => {
                let end = CellAddress::new(self.sheet, row, column);
                if start == end {
                    write!(f, "{start}")
                } else {
                    write!(f, "{start}:{end}")
                }
            }
            (None, Some(column)) if self.rows.start == 0 => write!(
                f,
                "{}:{}",
                column_letters(self.columns.start),
                column_letters(column)
            ),
            (None, Some(column)) => write!(f, "{start}:{}", column_letters(column)),
            (Some(row), None) if self.columns.start == 0 => {
                write!(f, "{}:{}", self.rows.start + 1, row + 1)
            }
            (Some(row), None) => write!(f, "{start}:{}", row + 1),
            (None, None) => write!(f, "{start}:*"),
        }
    }
}

/// Convert a 0-based column index to spreadsheet letters: 0=A, 25=Z, 26=AA.
pub fn column_letters(column: u32) -> String {
    let mut letters = Vec::new();
    let mut n = column;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const S1: SheetId = SheetId::new(1);

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn whole_column_contains_any_row() {
        let area = Area::column(S1, 2);
        assert!(area.contains(CellAddress::new(S1, 0, 2)));
        assert!(area.contains(CellAddress::new(S1, 1_000_000, 2)));
        assert!(!area.contains(CellAddress::new(S1, 0, 3)));
        assert!(!area.contains(CellAddress::new(SheetId::new(2), 0, 2)));
        assert!(area.is_unbounded());
    }

    #[test]
    fn bounded_area_normalizes_corners() {
        let area = Area::bounded(S1, (4, 3), (1, 0));
        assert_eq!(area, Area::bounded(S1, (1, 0), (4, 3)));
        assert_eq!(area.top_left(), CellAddress::new(S1, 1, 0));
        assert!(!area.is_unbounded());
    }

    #[test]
    fn areas_render_like_references() {
        assert_eq!(Area::cell(CellAddress::new(S1, 2, 1)).to_string(), "B3");
        assert_eq!(Area::bounded(S1, (0, 0), (9, 1)).to_string(), "A1:B10");
        assert_eq!(Area::column(S1, 0).to_string(), "A:A");
        assert_eq!(Area::rows(S1, 1, 3).to_string(), "2:4");
        let tail = Area::new(S1, Span::open(4), Span::bounded(2, 2));
        assert_eq!(tail.to_string(), "C5:C");
    }
}
