//! Shared fixtures: source and template workbooks built with rust_xlsxwriter,
//! a template directory on disk, and calamine readers for the outputs.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use royalbit_sheetmap::engine::Converter;
use royalbit_sheetmap::excel::sheet::WorksheetEditor;
use royalbit_sheetmap::excel::XlsxPackage;
use royalbit_sheetmap::templates::TemplateCatalog;
use royalbit_sheetmap::{CellAddress, CellRange};
use rust_xlsxwriter::{Format, Workbook};
use tempfile::TempDir;

pub const SOURCE_SHEET: &str = "Report";
pub const TARGET_SHEET: &str = "Form";

/// A source workbook for one facility.
///
/// | cell | value          |
/// |------|----------------|
/// | F40  | `name`         |
/// | F44  | Tokyo          |
/// | F45  | 10             |
/// | F46  | Shibuya        |
/// | F47  | 32.5           |
/// | F48  | 1-2-3          |
/// | F63  | Tel            |
/// | F65  | 03             |
/// | F67  | 1234           |
pub fn source_workbook(name: &str) -> Vec<u8> {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SOURCE_SHEET).unwrap();
    sheet.write_string(39, 5, name).unwrap();
    sheet.write_string(43, 5, "Tokyo").unwrap();
    sheet.write_number(44, 5, 10).unwrap();
    sheet.write_string(45, 5, "Shibuya").unwrap();
    sheet.write_number(46, 5, 32.5).unwrap();
    sheet.write_string(47, 5, "1-2-3").unwrap();
    sheet.write_string(62, 5, "Tel").unwrap();
    sheet.write_string(64, 5, "03").unwrap();
    sheet.write_number(66, 5, 1234).unwrap();

    let other = workbook.add_worksheet();
    other.set_name("Notes").unwrap();
    other.write_string(0, 0, "unrelated").unwrap();

    workbook.save_to_buffer().unwrap()
}

/// A template workbook with a title, a styled input row 14, a merged
/// range I14:J14 and a formula in N14 that depends on K14.
pub fn template_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let boxed = Format::new().set_border(rust_xlsxwriter::FormatBorder::Thin);

    let sheet = workbook.add_worksheet();
    sheet.set_name(TARGET_SHEET).unwrap();
    sheet.write_string_with_format(0, 0, "Application", &bold).unwrap();
    sheet.write_blank(13, 4, &boxed).unwrap();
    sheet.merge_range(13, 8, 13, 9, "", &boxed).unwrap();
    sheet.write_number_with_format(13, 10, 0, &boxed).unwrap();
    sheet.write_formula(13, 13, "=K14*2").unwrap();

    let cover = workbook.add_worksheet();
    cover.set_name("Cover").unwrap();
    cover.write_string(1, 1, "keep me").unwrap();

    workbook.save_to_buffer().unwrap()
}

/// A template whose first data band spans two rows: B14:B15 is merged
/// vertically, I14:J14 horizontally.
pub fn banded_template_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let boxed = Format::new().set_border(rust_xlsxwriter::FormatBorder::Thin);

    let sheet = workbook.add_worksheet();
    sheet.set_name(TARGET_SHEET).unwrap();
    sheet.write_string(0, 0, "Roster").unwrap();
    sheet.merge_range(13, 1, 14, 1, "", &boxed).unwrap();
    sheet.merge_range(13, 8, 13, 9, "", &boxed).unwrap();

    workbook.save_to_buffer().unwrap()
}

/// Template configuration used across the integration tests.
pub const TEMPLATE_CONFIG: &str = r#"{
  "templates": [
    {
      "id": "form_a",
      "name": "Form A",
      "filename": "form_a.xlsx",
      "output_filename": "form_a_out.xlsx",
      "description": "Application form",
      "mapping": {
        "source_sheet": "Report",
        "target_sheet": "Form",
        "target_row": 14,
        "cell_mappings": [
          { "target": "E14", "source": "F40" },
          { "target": "I14", "source": "F44+F46+F48", "type": "concat", "separator": " " },
          { "target": "K14", "source": ["F45", "F47"], "type": "sum" },
          { "target": "M14", "source": "F63+F65+F67", "type": "concat", "format_rules": { "F67": "zenkaku_int" } }
        ]
      }
    },
    {
      "id": "form_b",
      "name": "Form B",
      "filename": "form_a.xlsx",
      "output_filename": "form_b_out.xlsx",
      "mapping": {
        "source_sheet": "Report",
        "target_sheet": "Form",
        "target_row": 20,
        "cell_mappings": [ { "target": "E20", "source": "F40" } ]
      }
    },
    {
      "id": "form_b_copy",
      "name": "Form B (copy)",
      "filename": "form_a.xlsx",
      "output_filename": "form_b_out.xlsx",
      "mapping": {
        "source_sheet": "Report",
        "target_sheet": "Form",
        "target_row": 20,
        "cell_mappings": [ { "target": "E20", "source": "F40" } ]
      }
    },
    {
      "id": "broken",
      "name": "Broken target sheet",
      "filename": "form_a.xlsx",
      "output_filename": "broken_out.xlsx",
      "mapping": {
        "source_sheet": "Report",
        "target_sheet": "Missing",
        "target_row": 14,
        "cell_mappings": [ { "target": "E14", "source": "F40" } ]
      }
    },
    {
      "id": "retired",
      "name": "Retired form",
      "filename": "form_a.xlsx",
      "output_filename": "retired_out.xlsx",
      "is_active": false,
      "mapping": {
        "source_sheet": "Report",
        "target_sheet": "Form",
        "target_row": 14,
        "cell_mappings": [ { "target": "E14", "source": "F40" } ]
      }
    },
    {
      "id": "unmapped",
      "name": "Not yet mapped",
      "filename": "form_a.xlsx",
      "output_filename": "unmapped_out.xlsx"
    },
    {
      "id": "roster",
      "name": "Facility roster",
      "filename": "form_a.xlsx",
      "output_filename": "roster.xlsx",
      "mapping": {
        "source_sheet": "Report",
        "target_sheet": "Form",
        "target_row": 10,
        "multi_file_start_row": 14,
        "cell_mappings": [
          { "target": "B10", "source": "F40" },
          { "target": "C10", "source": "F45+F47", "type": "sum" }
        ]
      }
    }
  ]
}"#;

/// A templates directory holding `form_a.xlsx` and the test configuration.
pub fn template_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("form_a.xlsx"), template_workbook()).unwrap();
    std::fs::write(dir.path().join("template_config.json"), TEMPLATE_CONFIG).unwrap();
    dir
}

pub fn catalog(dir: &Path) -> Arc<TemplateCatalog> {
    Arc::new(TemplateCatalog::load(dir, "template_config.json").unwrap())
}

pub fn converter(dir: &Path) -> Converter {
    Converter::new(catalog(dir))
}

pub fn date() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
}

/// Value of `cell` on `sheet`, read back with calamine.
pub fn cell(bytes: &[u8], sheet: &str, cell: &str) -> Data {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    let range = workbook.worksheet_range(sheet).unwrap();
    let address = CellAddress::parse(cell).unwrap();
    range
        .get_value(address.zero_based())
        .cloned()
        .unwrap_or(Data::Empty)
}

pub fn sheet_names(bytes: &[u8]) -> Vec<String> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    workbook.sheet_names()
}

/// Merged ranges of `sheet`, read from the package.
pub fn merged_ranges(bytes: &[u8], sheet: &str) -> Vec<CellRange> {
    let package = XlsxPackage::from_bytes(bytes).unwrap();
    let entry = package
        .workbook_sheets()
        .unwrap()
        .into_iter()
        .find(|s| s.name == sheet)
        .unwrap();
    let part = package.worksheet_part(&entry).unwrap();
    let editor = WorksheetEditor::from_xml(package.part(&part).unwrap()).unwrap();
    editor.merged_ranges().to_vec()
}

pub fn range(text: &str) -> CellRange {
    CellRange::parse(text).unwrap()
}
