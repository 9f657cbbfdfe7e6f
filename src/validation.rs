//! Upload checks applied before a file reaches the engine.

use crate::error::{TransferError, TransferResult};
use crate::types::SourceFile;

/// Files smaller than this cannot be a real workbook.
pub const MIN_FILE_SIZE: usize = 100;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

const SOURCE_EXTENSIONS: &[&str] = &[".xlsb", ".xlsx", ".xlsm", ".xls"];
const TEMPLATE_EXTENSIONS: &[&str] = &[".xlsx", ".xlsm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A submitted workbook to read from
    Source,
    /// An xlsx template to write into
    Template,
}

impl FileKind {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::Source => SOURCE_EXTENSIONS,
            FileKind::Template => TEMPLATE_EXTENSIONS,
        }
    }
}

/// Check extension, size bounds and (for templates) the zip signature.
pub fn validate_upload(file: &SourceFile, kind: FileKind, max_size: usize) -> TransferResult<()> {
    let ext = file.extension();
    if !kind.extensions().contains(&ext.as_str()) {
        return Err(TransferError::InvalidFile(format!(
            "{}: unsupported file type '{}' (expected {})",
            file.filename,
            ext,
            kind.extensions().join(", ")
        )));
    }

    if file.size() > max_size {
        return Err(TransferError::InvalidFile(format!(
            "{}: {} bytes exceeds the {} byte limit",
            file.filename,
            file.size(),
            max_size
        )));
    }

    if file.size() < MIN_FILE_SIZE {
        return Err(TransferError::InvalidFile(format!(
            "{}: file is too small to be a workbook ({} bytes)",
            file.filename,
            file.size()
        )));
    }

    if kind == FileKind::Template && !file.content.starts_with(ZIP_SIGNATURE) {
        return Err(TransferError::InvalidFile(format!(
            "{}: not an xlsx package",
            file.filename
        )));
    }

    Ok(())
}
