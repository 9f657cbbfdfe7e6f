//! Write Engine: place values into a template workbook, keeping merged
//! layout intact, and serialize the result.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::package::{SheetEntry, XlsxPackage};
use super::sheet::{CellWrite, WorksheetEditor};
use crate::address::CellAddress;
use crate::error::{TransferError, TransferResult};
use crate::format::{coerce_numeric_or_string, CellValue};

/// Outcome of one `write_pairs` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub skipped: usize,
}

/// A destination workbook opened for editing.
///
/// Only the worksheets that receive writes are re-serialized; every other
/// part of the template is carried over byte for byte.
pub struct TemplateWorkbook {
    package: XlsxPackage,
    sheets: Vec<SheetEntry>,
    editors: BTreeMap<String, WorksheetEditor>,
}

impl TemplateWorkbook {
    pub fn open(bytes: &[u8]) -> TransferResult<Self> {
        let package = XlsxPackage::from_bytes(bytes)
            .map_err(|e| TransferError::Write(format!("cannot open template workbook: {}", e)))?;
        let sheets = package.workbook_sheets()?;
        Ok(Self {
            package,
            sheets,
            editors: BTreeMap::new(),
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Write `(target, value)` pairs into `sheet`.
    ///
    /// An unknown sheet fails the whole call. A pair whose target is not a
    /// valid address is logged and skipped.
    pub fn write_pairs<A: AsRef<str>>(
        &mut self,
        sheet: &str,
        pairs: &[(A, String)],
    ) -> TransferResult<WriteSummary> {
        let editor = self.editor(sheet)?;
        let mut summary = WriteSummary::default();

        for (target, value) in pairs {
            let target = target.as_ref();
            match CellAddress::parse(target) {
                Ok(cell) => {
                    write_merge_aware(editor, cell, value);
                    summary.written += 1;
                }
                Err(e) => {
                    warn!(sheet, target, error = %e, "skipping write to invalid cell");
                    summary.skipped += 1;
                }
            }
        }

        debug!(
            sheet,
            written = summary.written,
            skipped = summary.skipped,
            "values written"
        );
        Ok(summary)
    }

    /// Write one record's row of typed `(target, value)` pairs into `sheet`.
    ///
    /// Unlike `write_pairs`, a cell covered by a merge anchored on another
    /// row is skipped: its value would land on that row's record.
    pub fn write_cells(
        &mut self,
        sheet: &str,
        cells: &[(CellAddress, String)],
    ) -> TransferResult<WriteSummary> {
        let editor = self.editor(sheet)?;
        let mut summary = WriteSummary::default();

        for (cell, value) in cells {
            match editor.merged_range_at(cell) {
                Some(range) if range.anchor().row != cell.row => {
                    warn!(
                        sheet,
                        cell = %cell,
                        merge = %range,
                        "skipping write into a merge anchored on another row"
                    );
                    summary.skipped += 1;
                }
                _ => {
                    write_merge_aware(editor, *cell, value);
                    summary.written += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Serialize the edited workbook, consuming the handle.
    pub fn save(mut self) -> TransferResult<Vec<u8>> {
        let mut formula_changed = false;

        for (part, editor) in &self.editors {
            let original = self
                .package
                .part(part)
                .ok_or_else(|| TransferError::Write(format!("worksheet part vanished: {}", part)))?;
            let (updated, changed) = editor.apply(original)?;
            formula_changed |= changed;
            self.package.set_part(part.clone(), updated);
        }

        if formula_changed {
            self.package.invalidate_calc_chain()?;
        }

        Ok(self.package.write_to_bytes()?)
    }

    fn editor(&mut self, sheet: &str) -> TransferResult<&mut WorksheetEditor> {
        let entry = self
            .sheets
            .iter()
            .find(|s| s.name == sheet)
            .ok_or_else(|| TransferError::SheetNotFound(sheet.to_string()))?;
        let part = self.package.worksheet_part(entry)?;

        if !self.editors.contains_key(&part) {
            let xml = self
                .package
                .part(&part)
                .ok_or_else(|| TransferError::Write(format!("missing worksheet part {}", part)))?;
            let editor = WorksheetEditor::from_xml(xml)?;
            self.editors.insert(part.clone(), editor);
        }

        self.editors
            .get_mut(&part)
            .ok_or_else(|| TransferError::Write(format!("missing worksheet part {}", part)))
    }
}

/// Numbers become numeric cells, other text stays text, blank clears.
fn to_cell_write(value: &str) -> CellWrite {
    match coerce_numeric_or_string(value) {
        Some(CellValue::Number(n)) => CellWrite::Number(n),
        Some(CellValue::Text(s)) => CellWrite::Text(s),
        None => CellWrite::Clear,
    }
}

/// Write `cell`, landing on the anchor when it sits inside a merged range.
/// The range itself is kept as it was.
fn write_merge_aware(editor: &mut WorksheetEditor, cell: CellAddress, value: &str) {
    let target = match editor.merged_range_at(&cell) {
        Some(range) if range.anchor() != cell => {
            debug!(cell = %cell, anchor = %range.anchor(), "write redirected to merge anchor");
            range.anchor()
        }
        _ => cell,
    };
    editor.set_cell(target, to_cell_write(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cell_write() {
        assert_eq!(to_cell_write("12"), CellWrite::Number(12.0));
        assert_eq!(to_cell_write("1,200"), CellWrite::Number(1200.0));
        assert_eq!(to_cell_write(" abc "), CellWrite::Text("abc".to_string()));
        assert_eq!(to_cell_write(""), CellWrite::Clear);
    }

    #[test]
    fn test_open_rejects_garbage() {
        assert!(matches!(
            TemplateWorkbook::open(b"definitely not a workbook"),
            Err(TransferError::Write(_))
        ));
    }
}
