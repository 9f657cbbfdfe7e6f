//! Workbook I/O
//!
//! - Extraction: source workbooks (xlsb / xlsx / xlsm / xls) → values, via calamine
//! - Writing: values → xlsx template, patched in place (zip + quick-xml)

pub mod extractor;
pub mod package;
pub mod sheet;
pub mod writer;

pub use extractor::{SourceExtractor, WorkbookExtractor};
pub use package::{PackageError, XlsxPackage};
pub use writer::{TemplateWorkbook, WriteSummary};
