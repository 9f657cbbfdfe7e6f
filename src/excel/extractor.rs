//! Extraction Engine: read mapped cells out of a submitted workbook.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::debug;

use crate::address::CellAddress;
use crate::error::{TransferError, TransferResult};
use crate::format::{apply_format_rule, render_number, CellValue};
use crate::types::{CellReferenceSpec, ExtractedData, MappingKind};

/// Reads one value per spec from a source workbook.
///
/// The engine talks to sources only through this trait, so orchestration can
/// be exercised without real workbooks.
pub trait SourceExtractor: Send + Sync {
    fn extract(
        &self,
        content: &[u8],
        sheet: &str,
        specs: &[CellReferenceSpec],
    ) -> TransferResult<ExtractedData>;
}

/// calamine-backed extractor for xlsb, xlsx, xlsm and xls sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkbookExtractor;

impl SourceExtractor for WorkbookExtractor {
    fn extract(
        &self,
        content: &[u8],
        sheet: &str,
        specs: &[CellReferenceSpec],
    ) -> TransferResult<ExtractedData> {
        let range = load_sheet(content, sheet)?;
        let values = specs.iter().map(|spec| evaluate(&range, spec)).collect();

        Ok(ExtractedData {
            values,
            source_sheet: sheet.to_string(),
            specs: specs.to_vec(),
        })
    }
}

/// Open the workbook and fetch one sheet's cells.
fn load_sheet(content: &[u8], sheet: &str) -> TransferResult<Range<Data>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| TransferError::Extraction(format!("cannot open source workbook: {}", e)))?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(TransferError::SheetNotFound(sheet.to_string()));
    }

    workbook
        .worksheet_range(sheet)
        .map_err(|e| TransferError::Extraction(format!("cannot read sheet '{}': {}", sheet, e)))
}

/// Present value of one cell. Empty, error and out-of-range cells are absent.
pub fn read_cell(range: &Range<Data>, cell: &CellAddress) -> Option<CellValue> {
    let value = range.get_value(cell.zero_based())?;
    match value {
        Data::Empty | Data::Error(_) => None,
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::DateTime(dt) => Some(CellValue::Number(dt.as_f64())),
        Data::Bool(b) => Some(CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string())),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| CellValue::Text(trimmed.to_string()))
        }
    }
}

/// Compute the value of one spec. Never fails: unreadable cells count as
/// absent.
pub fn evaluate(range: &Range<Data>, spec: &CellReferenceSpec) -> String {
    match spec.kind() {
        MappingKind::Single => match spec.cells().first() {
            Some(cell) => read_cell(range, cell)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            None => String::new(),
        },
        MappingKind::Sum => {
            let mut total = 0.0;
            for cell in spec.cells() {
                match read_cell(range, cell).and_then(|v| v.as_number()) {
                    Some(n) => total += n,
                    None => debug!(cell = %cell, "non-numeric cell ignored in sum"),
                }
            }
            render_number(total)
        }
        MappingKind::Concat => {
            let segments: Vec<String> = spec
                .cells()
                .iter()
                .map(|cell| {
                    let raw = read_cell(range, cell)
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    apply_format_rule(&raw, spec.format_rule(cell))
                })
                .filter(|segment| !segment.is_empty())
                .collect();
            segments.join(spec.separator())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatRule;
    use std::collections::HashMap;

    fn addr(s: &str) -> CellAddress {
        CellAddress::parse(s).unwrap()
    }

    /// A1:C4 grid with a few typed cells.
    fn grid() -> Range<Data> {
        let mut range = Range::new((0, 0), (3, 2));
        range.set_value((0, 0), Data::Float(2.0));
        range.set_value((0, 1), Data::String("abc".to_string()));
        range.set_value((0, 2), Data::Int(3));
        range.set_value((1, 0), Data::Float(0.0));
        range.set_value((1, 1), Data::Float(0.0));
        range.set_value((1, 2), Data::String("  株式会社  ".to_string()));
        range.set_value((2, 0), Data::String("No.1-2ab3".to_string()));
        range.set_value((2, 1), Data::String("   ".to_string()));
        range.set_value((2, 2), Data::Bool(true));
        range.set_value((3, 0), Data::String("1,500".to_string()));
        range.set_value((3, 1), Data::Float(2.5));
        range
    }

    #[test]
    fn test_single_values() {
        let range = grid();
        assert_eq!(evaluate(&range, &CellReferenceSpec::single(addr("A1"))), "2");
        assert_eq!(evaluate(&range, &CellReferenceSpec::single(addr("C2"))), "株式会社");
        assert_eq!(evaluate(&range, &CellReferenceSpec::single(addr("B3"))), "");
        assert_eq!(evaluate(&range, &CellReferenceSpec::single(addr("C3"))), "TRUE");
        assert_eq!(evaluate(&range, &CellReferenceSpec::single(addr("B4"))), "2.5");
    }

    #[test]
    fn test_single_outside_range_is_empty() {
        let range = grid();
        assert_eq!(evaluate(&range, &CellReferenceSpec::single(addr("Z99"))), "");
    }

    #[test]
    fn test_sum_ignores_text() {
        let range = grid();
        let spec = CellReferenceSpec::sum(vec![addr("A1"), addr("B1"), addr("C1")]).unwrap();
        assert_eq!(evaluate(&range, &spec), "5");
    }

    #[test]
    fn test_sum_of_zeros_renders_zero() {
        let range = grid();
        let spec = CellReferenceSpec::sum(vec![addr("A2"), addr("B2")]).unwrap();
        assert_eq!(evaluate(&range, &spec), "0");
        let spec = CellReferenceSpec::sum(vec![addr("Z50")]).unwrap();
        assert_eq!(evaluate(&range, &spec), "0");
    }

    #[test]
    fn test_sum_accepts_comma_text() {
        let range = grid();
        let spec = CellReferenceSpec::sum(vec![addr("A4"), addr("B4")]).unwrap();
        assert_eq!(evaluate(&range, &spec), "1502.5");
    }

    #[test]
    fn test_concat_drops_empty_segments() {
        let range = grid();
        let spec = CellReferenceSpec::concat(vec![addr("B1"), addr("B3")], "-", HashMap::new())
            .unwrap();
        assert_eq!(evaluate(&range, &spec), "abc");
    }

    #[test]
    fn test_concat_with_format_rule() {
        let range = grid();
        let mut rules = HashMap::new();
        rules.insert(addr("A3"), FormatRule::ZenkakuInt);
        let spec =
            CellReferenceSpec::concat(vec![addr("C2"), addr("A3")], " ", rules).unwrap();
        assert_eq!(evaluate(&range, &spec), "株式会社 １２３");
    }

    #[test]
    fn test_extract_rejects_non_workbook() {
        let result = WorkbookExtractor.extract(
            b"this is not a spreadsheet",
            "Sheet1",
            &[CellReferenceSpec::single(addr("A1"))],
        );
        assert!(matches!(result, Err(TransferError::Extraction(_))));
    }
}
