//! File-level operations shared by the CLI and the HTTP server: open the
//! catalog, validate inputs, run the engine and write outputs to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::Converter;
use crate::error::{ItemFailure, TransferError, TransferResult};
use crate::templates::TemplateCatalog;
use crate::types::{SourceFile, TemplateInfo};
use crate::validation::{validate_upload, FileKind};

/// One line of the template listing.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub filename: String,
    pub output_filename: String,
    pub is_active: bool,
    pub has_mapping: bool,
    pub cell_count: usize,
    /// Template file exists and looks like an xlsx package
    pub file_ok: bool,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ConvertReport {
    pub template_id: String,
    pub output_path: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct BatchReport {
    pub archive_path: String,
    pub processed_files: Vec<String>,
    pub count: usize,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct MergeRow {
    pub label: String,
    pub row: u32,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct MergeReport {
    pub output_path: String,
    pub processed_count: usize,
    pub rows: Vec<MergeRow>,
    pub failures: Vec<ItemFailure>,
}

/// A loaded catalog plus the limits of one process.
pub struct Session {
    converter: Converter,
    max_file_size: usize,
}

impl Session {
    pub fn open(config: &AppConfig) -> TransferResult<Self> {
        let catalog = TemplateCatalog::load(&config.templates_dir, &config.config_file)?;
        Ok(Self::with_converter(
            Converter::new(Arc::new(catalog)).with_limits(config.engine_limits()),
            config.max_file_size,
        ))
    }

    pub fn with_converter(converter: Converter, max_file_size: usize) -> Self {
        Self {
            converter,
            max_file_size,
        }
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        self.converter.catalog()
    }

    /// Active templates, or every template when `all` is set.
    pub fn list_templates(&self, all: bool) -> Vec<TemplateSummary> {
        let snapshot = self.catalog().snapshot();
        snapshot
            .all()
            .iter()
            .filter(|t| all || t.is_active)
            .map(|t| self.summarize(t))
            .collect()
    }

    /// Re-read the template configuration; returns the new template count.
    pub fn reload(&self) -> TransferResult<usize> {
        self.catalog().reload()
    }

    /// Read and validate one source workbook.
    pub fn load_source(&self, path: &Path) -> TransferResult<SourceFile> {
        let file = SourceFile::from_path(path)?;
        validate_upload(&file, FileKind::Source, self.max_file_size)?;
        Ok(file)
    }

    pub fn convert(
        &self,
        source: &Path,
        template_id: &str,
        output_dir: &Path,
    ) -> TransferResult<ConvertReport> {
        let source = self.load_source(source)?;
        let filled = self.converter.convert(&source, template_id)?;
        let output_path = write_output(output_dir, &filled.output_filename, &filled.content)?;

        Ok(ConvertReport {
            template_id: template_id.to_string(),
            output_path: output_path.display().to_string(),
            count: filled.count,
        })
    }

    pub fn batch(
        &self,
        source: &Path,
        template_ids: &[String],
        facility_label: &str,
        date: NaiveDate,
        output_dir: &Path,
    ) -> TransferResult<BatchReport> {
        let source = self.load_source(source)?;
        let output = self
            .converter
            .convert_batch(&source, template_ids, facility_label, date)?;
        let archive_path = write_output(output_dir, &output.archive_filename, &output.content)?;

        Ok(BatchReport {
            archive_path: archive_path.display().to_string(),
            count: output.count(),
            processed_files: output.processed_files,
            failures: output.failures,
        })
    }

    /// Fold `sources` into one template. An unreadable or invalid source is
    /// reported as a failure and does not take a row.
    pub fn merge(
        &self,
        sources: &[PathBuf],
        labels: &[String],
        template_id: &str,
        start_row: Option<u32>,
        date: NaiveDate,
        output_dir: &Path,
    ) -> TransferResult<MergeReport> {
        if labels.len() != sources.len() {
            return Err(TransferError::InvalidRequest(format!(
                "{} source files but {} labels",
                sources.len(),
                labels.len()
            )));
        }

        let mut files = Vec::with_capacity(sources.len());
        let mut kept_labels = Vec::with_capacity(labels.len());
        let mut failures = Vec::new();

        for (path, label) in sources.iter().zip(labels) {
            match self.load_source(path) {
                Ok(file) => {
                    files.push(file);
                    kept_labels.push(label.clone());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "source rejected");
                    failures.push(ItemFailure::new(path.display().to_string(), e.to_string()));
                }
            }
        }
        if files.is_empty() {
            return Err(TransferError::AllItemsFailed {
                kind: "sources",
                count: sources.len(),
            });
        }

        let output = self
            .converter
            .convert_multi(template_id, &files, &kept_labels, start_row, date)?;
        let output_path = write_output(output_dir, &output.output_filename, &output.content)?;
        failures.extend(output.failures);

        Ok(MergeReport {
            output_path: output_path.display().to_string(),
            processed_count: output.processed_count,
            rows: output
                .rows
                .into_iter()
                .map(|(label, row)| MergeRow { label, row })
                .collect(),
            failures,
        })
    }

    fn summarize(&self, template: &TemplateInfo) -> TemplateSummary {
        TemplateSummary {
            id: template.id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            filename: template.filename.clone(),
            output_filename: template.output_filename.clone(),
            is_active: template.is_active,
            has_mapping: template.mapping.is_some(),
            cell_count: template
                .mapping
                .as_ref()
                .map(|m| m.cell_mappings.len())
                .unwrap_or(0),
            file_ok: self.template_file_ok(template),
        }
    }

    fn template_file_ok(&self, template: &TemplateInfo) -> bool {
        self.catalog()
            .template_content(&template.id)
            .map(|content| SourceFile::new(template.filename.as_str(), content))
            .and_then(|file| validate_upload(&file, FileKind::Template, self.max_file_size))
            .is_ok()
    }
}

fn write_output(dir: &Path, filename: &str, content: &[u8]) -> TransferResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, content)?;
    info!(path = %path.display(), bytes = content.len(), "output written");
    Ok(path)
}
