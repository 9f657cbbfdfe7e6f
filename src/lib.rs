//! Sheetmap - template mapping engine for spreadsheets
//!
//! Copies cell values out of source workbooks (.xlsb, .xlsx, .xlsm, .xls)
//! into formatted .xlsx templates, driven by a declarative mapping per
//! template.
//!
//! # Modes
//!
//! - Single: one source into one template
//! - Batch: one source into several templates, delivered as one zip archive
//! - Multi-source: several sources folded into one template, one row each
//!
//! # Example
//!
//! ```no_run
//! use royalbit_sheetmap::engine::Converter;
//! use royalbit_sheetmap::templates::TemplateCatalog;
//! use royalbit_sheetmap::types::SourceFile;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let catalog = Arc::new(TemplateCatalog::load("templates", "template_config.json")?);
//! let converter = Converter::new(catalog);
//!
//! let source = SourceFile::from_path(Path::new("report.xlsb"))?;
//! let filled = converter.convert(&source, "application_form")?;
//! std::fs::write(&filled.output_filename, &filled.content)?;
//! # Ok::<(), royalbit_sheetmap::error::TransferError>(())
//! ```

pub mod address;
pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod excel;
pub mod format;
pub mod templates;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use address::{CellAddress, CellRange};
pub use engine::Converter;
pub use error::{ItemFailure, TransferError, TransferResult};
pub use templates::TemplateCatalog;
pub use types::{
    BatchOutput, CellMapping, CellReferenceSpec, MappingKind, MultiSourceOutput, ProcessedFile,
    SourceFile, TemplateInfo, TemplateMapping,
};
