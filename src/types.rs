use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::address::CellAddress;
use crate::error::{ItemFailure, TransferError, TransferResult};
use crate::format::FormatRule;

//==============================================================================
// Cell references
//==============================================================================

/// How the source cells of one mapping combine into a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    #[default]
    Single,
    #[serde(alias = "sum_cells")]
    Sum,
    #[serde(alias = "concat_cells")]
    Concat,
}

/// Describes how to derive one output value from the source workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct CellReferenceSpec {
    cells: Vec<CellAddress>,
    kind: MappingKind,
    separator: String,
    format_rules: HashMap<CellAddress, FormatRule>,
}

impl CellReferenceSpec {
    /// Build a spec, enforcing the cell-count invariant of its kind.
    pub fn new(
        kind: MappingKind,
        cells: Vec<CellAddress>,
        separator: impl Into<String>,
        format_rules: HashMap<CellAddress, FormatRule>,
    ) -> TransferResult<Self> {
        match kind {
            MappingKind::Single if cells.len() != 1 => {
                return Err(TransferError::Config(format!(
                    "single mapping needs exactly one source cell, got {}",
                    cells.len()
                )))
            }
            MappingKind::Sum | MappingKind::Concat if cells.is_empty() => {
                return Err(TransferError::Config(
                    "sum/concat mapping needs at least one source cell".to_string(),
                ))
            }
            _ => {}
        }

        Ok(Self {
            cells,
            kind,
            separator: separator.into(),
            format_rules,
        })
    }

    pub fn single(cell: CellAddress) -> Self {
        Self {
            cells: vec![cell],
            kind: MappingKind::Single,
            separator: String::new(),
            format_rules: HashMap::new(),
        }
    }

    pub fn sum(cells: Vec<CellAddress>) -> TransferResult<Self> {
        Self::new(MappingKind::Sum, cells, "", HashMap::new())
    }

    pub fn concat(
        cells: Vec<CellAddress>,
        separator: impl Into<String>,
        format_rules: HashMap<CellAddress, FormatRule>,
    ) -> TransferResult<Self> {
        Self::new(MappingKind::Concat, cells, separator, format_rules)
    }

    pub fn cells(&self) -> &[CellAddress] {
        &self.cells
    }

    pub fn kind(&self) -> MappingKind {
        self.kind
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Rule registered for one specific source cell (`None` when unset).
    pub fn format_rule(&self, cell: &CellAddress) -> FormatRule {
        self.format_rules.get(cell).copied().unwrap_or_default()
    }
}

/// One destination cell fed by one source spec.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMapping {
    pub target: CellAddress,
    pub source: CellReferenceSpec,
}

impl CellMapping {
    pub fn new(target: CellAddress, source: CellReferenceSpec) -> Self {
        Self { target, source }
    }

    /// The same mapping with its destination moved to `row`.
    pub fn retarget(&self, row: u32) -> TransferResult<Self> {
        Ok(Self {
            target: self.target.retarget(row)?,
            source: self.source.clone(),
        })
    }
}

//==============================================================================
// Templates
//==============================================================================

/// Binding between a source sheet and a destination sheet of one template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMapping {
    pub source_sheet: String,
    pub target_sheet: String,
    pub target_row: u32,
    pub cell_mappings: Vec<CellMapping>,
    /// First output row in multi-source mode (falls back to `target_row`)
    pub multi_file_start_row: Option<u32>,
}

impl TemplateMapping {
    pub fn source_specs(&self) -> Vec<CellReferenceSpec> {
        self.cell_mappings.iter().map(|m| m.source.clone()).collect()
    }

    pub fn multi_source_start_row(&self) -> u32 {
        self.multi_file_start_row.unwrap_or(self.target_row)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub output_filename: String,
    pub description: String,
    pub is_active: bool,
    pub mapping: Option<TemplateMapping>,
}

impl TemplateInfo {
    /// Active and carrying a mapping: eligible for conversion.
    pub fn is_usable(&self) -> bool {
        self.is_active && self.mapping.is_some()
    }
}

//==============================================================================
// Inputs
//==============================================================================

/// An uploaded workbook: opaque bytes plus the declared filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> TransferResult<Self> {
        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, content })
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Lower-cased extension including the dot (`".xlsb"`), or empty.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }
}

//==============================================================================
// Intermediate results
//==============================================================================

/// Values read from one source workbook, one per spec, in spec order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedData {
    pub values: Vec<String>,
    pub source_sheet: String,
    pub specs: Vec<CellReferenceSpec>,
}

impl ExtractedData {
    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One source's values bound to its destination row in multi-source mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RowData {
    pub row_number: u32,
    pub label: String,
    pub values: Vec<String>,
    pub source_filename: String,
}

impl RowData {
    pub fn new(
        row_number: u32,
        label: impl Into<String>,
        values: Vec<String>,
        source_filename: impl Into<String>,
    ) -> TransferResult<Self> {
        let label = label.into();
        if row_number == 0 {
            return Err(TransferError::InvalidRequest(
                "row numbers start at 1".to_string(),
            ));
        }
        if label.trim().is_empty() {
            return Err(TransferError::InvalidRequest(
                "source label must not be empty".to_string(),
            ));
        }
        Ok(Self {
            row_number,
            label,
            values,
            source_filename: source_filename.into(),
        })
    }
}

//==============================================================================
// Outputs
//==============================================================================

/// One filled template.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub output_filename: String,
    pub content: Vec<u8>,
    /// Number of values written
    pub count: usize,
}

/// Archive of every template that converted successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    pub archive_filename: String,
    pub content: Vec<u8>,
    /// Archive member names, in archive order
    pub processed_files: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl BatchOutput {
    pub fn count(&self) -> usize {
        self.processed_files.len()
    }
}

/// One workbook holding a row per successfully extracted source.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSourceOutput {
    pub output_filename: String,
    pub content: Vec<u8>,
    pub processed_count: usize,
    /// `(label, row)` of each written record
    pub rows: Vec<(String, u32)>,
    pub failures: Vec<ItemFailure>,
}
