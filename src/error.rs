use thiserror::Error;

use crate::excel::PackageError;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid cell address: '{0}'")]
    InvalidAddress(String),

    #[error("Sheet not found: '{0}'")]
    SheetNotFound(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("All {count} {kind} failed")]
    AllItemsFailed { kind: &'static str, count: usize },

    #[error("Template not found: '{0}'")]
    TemplateNotFound(String),

    #[error("Template is inactive: '{0}'")]
    TemplateInactive(String),

    #[error("Template has no mapping: '{0}'")]
    MissingMapping(String),

    #[error("No active, mapped templates among the selection")]
    NoTemplatesSelected,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Template configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Workbook package error: {0}")]
    Package(#[from] PackageError),
}

/// A skipped template or source, kept alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_items_failed_message() {
        let err = TransferError::AllItemsFailed {
            kind: "templates",
            count: 3,
        };
        assert_eq!(err.to_string(), "All 3 templates failed");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TransferError = io.into();
        assert!(matches!(err, TransferError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}
