use std::io::{Cursor, Write};

use chrono::NaiveDate;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::naming::{archive_filename, UniqueNames};
use super::Converter;
use crate::error::{ItemFailure, TransferError, TransferResult};
use crate::templates::TemplateSet;
use crate::types::{BatchOutput, ProcessedFile, SourceFile, TemplateInfo, TemplateMapping};

impl Converter {
    /// Fill every selected template from one source and zip the results.
    ///
    /// Unknown, inactive and unmapped ids are skipped. A template that fails
    /// is recorded in `failures` and the run moves on; the call only fails
    /// when nothing usable was selected or nothing succeeded.
    pub fn convert_batch(
        &self,
        source: &SourceFile,
        template_ids: &[String],
        facility_label: &str,
        date: NaiveDate,
    ) -> TransferResult<BatchOutput> {
        let set = self.catalog.snapshot();
        let mut failures = Vec::new();
        let selected = select_templates(&set, template_ids, &mut failures);
        if selected.is_empty() {
            return Err(TransferError::NoTemplatesSelected);
        }

        let mut outputs = Vec::with_capacity(selected.len());
        for &(template, mapping) in &selected {
            match self.fill_selected(source, template, mapping) {
                Ok(file) => outputs.push(file),
                Err(e) => {
                    warn!(template = %template.id, error = %e, "template skipped");
                    failures.push(ItemFailure::new(&template.id, e.to_string()));
                }
            }
        }

        if outputs.is_empty() {
            return Err(TransferError::AllItemsFailed {
                kind: "templates",
                count: selected.len(),
            });
        }

        let (content, processed_files) = build_archive(&outputs)?;
        let archive_filename = archive_filename(facility_label, date)?;

        info!(
            archive = %archive_filename,
            processed = processed_files.len(),
            skipped = failures.len(),
            "batch archive built"
        );

        Ok(BatchOutput {
            archive_filename,
            content,
            processed_files,
            failures,
        })
    }

    fn fill_selected(
        &self,
        source: &SourceFile,
        template: &TemplateInfo,
        mapping: &TemplateMapping,
    ) -> TransferResult<ProcessedFile> {
        let template_bytes = self.catalog.read_template(template)?;
        self.fill_template(source, template, mapping, &template_bytes)
    }
}

fn select_templates<'a>(
    set: &'a TemplateSet,
    template_ids: &[String],
    failures: &mut Vec<ItemFailure>,
) -> Vec<(&'a TemplateInfo, &'a TemplateMapping)> {
    let mut selected = Vec::with_capacity(template_ids.len());
    for id in template_ids {
        match set.resolve(id) {
            Ok(resolved) => selected.push(resolved),
            Err(e) => {
                warn!(template = %id, error = %e, "template not eligible");
                failures.push(ItemFailure::new(id, e.to_string()));
            }
        }
    }
    selected
}

/// Deflate every output into one zip, in order. Returns the bytes and the
/// member names actually used.
fn build_archive(files: &[ProcessedFile]) -> TransferResult<(Vec<u8>, Vec<String>)> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    let mut names = UniqueNames::new();
    let mut members = Vec::with_capacity(files.len());

    for file in files {
        let name = names.claim(&file.output_filename);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&file.content)?;
        members.push(name);
    }

    Ok((zip.finish()?.into_inner(), members))
}
