//! A1-style cell address arithmetic
//!
//! Column letters are a base-26 numeral without a zero digit (A=1 … Z=26,
//! AA=27 …). Rows are 1-based. Both are bounded by the xlsx grid.

use crate::error::{TransferError, TransferResult};
use std::fmt;
use std::str::FromStr;

/// Last addressable row of an xlsx worksheet.
pub const MAX_ROW: u32 = 1_048_576;

/// Last addressable column of an xlsx worksheet (XFD).
pub const MAX_COLUMN: u32 = 16_384;

/// A single cell position, 1-based on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    /// Row number (1-based). Ordered before `col` so sorting is row-major.
    pub row: u32,
    /// Column index (1-based, A=1)
    pub col: u32,
}

impl CellAddress {
    /// Build an address from 1-based indices, checking grid bounds.
    pub fn new(col: u32, row: u32) -> TransferResult<Self> {
        if col == 0 || col > MAX_COLUMN || row == 0 || row > MAX_ROW {
            return Err(TransferError::InvalidAddress(format!(
                "column {} / row {} is outside the sheet grid",
                col, row
            )));
        }
        Ok(Self { row, col })
    }

    /// Parse `"F40"`, `"aa14"` … into an address.
    ///
    /// The leading alphabetic run is the column, the trailing digit run the
    /// row. Anything else (empty runs, `$` markers, row 0) is rejected.
    pub fn parse(address: &str) -> TransferResult<Self> {
        let text = address.trim();
        let split = text
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (letters, digits) = text.split_at(split);

        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(TransferError::InvalidAddress(address.to_string()));
        }

        let col = column_to_index(letters)
            .map_err(|_| TransferError::InvalidAddress(address.to_string()))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| TransferError::InvalidAddress(address.to_string()))?;

        Self::new(col, row).map_err(|_| TransferError::InvalidAddress(address.to_string()))
    }

    /// Same column, different row.
    pub fn retarget(&self, row: u32) -> TransferResult<Self> {
        Self::new(self.col, row)
    }

    /// Column letters of this address (`"AA"` for col 27).
    pub fn column_letters(&self) -> String {
        index_to_column(self.col)
    }

    /// Zero-based `(row, col)` pair, as used by calamine ranges.
    pub fn zero_based(&self) -> (u32, u32) {
        (self.row - 1, self.col - 1)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row)
    }
}

impl FromStr for CellAddress {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Convert column letters to a 1-based index.
///
/// Examples:
/// - A → 1
/// - Z → 26
/// - AA → 27
/// - XFD → 16384
pub fn column_to_index(letters: &str) -> TransferResult<u32> {
    if letters.is_empty() {
        return Err(TransferError::InvalidAddress(letters.to_string()));
    }

    let mut index: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(TransferError::InvalidAddress(letters.to_string()));
        }
        let value = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index * 26 + value;
        if index > MAX_COLUMN {
            return Err(TransferError::InvalidAddress(letters.to_string()));
        }
    }

    Ok(index)
}

/// Convert a 1-based column index to letters (inverse of [`column_to_index`]).
pub fn index_to_column(index: u32) -> String {
    let mut result = String::new();
    let mut idx = index;

    while idx > 0 {
        let remainder = (idx - 1) % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        idx = (idx - 1) / 26;
    }

    result
}

/// A rectangular block of cells, e.g. a merged range `B2:D3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Parse `"B2:D3"`; a bare `"B2"` is a one-cell range.
    pub fn parse(text: &str) -> TransferResult<Self> {
        let (first, second) = match text.split_once(':') {
            Some((a, b)) => (a, b),
            None => (text, text),
        };
        let a = CellAddress::parse(first)?;
        let b = CellAddress::parse(second)?;

        Ok(Self {
            start: CellAddress {
                row: a.row.min(b.row),
                col: a.col.min(b.col),
            },
            end: CellAddress {
                row: a.row.max(b.row),
                col: a.col.max(b.col),
            },
        })
    }

    pub fn contains(&self, cell: &CellAddress) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Top-left cell: the only cell of a merge that carries a visible value.
    pub fn anchor(&self) -> CellAddress {
        self.start
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}
