use tracing::{error, info};

use super::Converter;
use crate::error::TransferResult;
use crate::excel::TemplateWorkbook;
use crate::types::{ProcessedFile, SourceFile, TemplateInfo, TemplateMapping};

impl Converter {
    /// Fill one template from one source.
    ///
    /// The template must exist, be active and carry a mapping. Nothing is
    /// returned unless both extraction and writing succeed.
    pub fn convert(&self, source: &SourceFile, template_id: &str) -> TransferResult<ProcessedFile> {
        let set = self.catalog.snapshot();
        let (template, mapping) = set.resolve(template_id)?;
        let template_bytes = self.catalog.read_template(template)?;

        self.fill_template(source, template, mapping, &template_bytes)
            .inspect(|file| {
                info!(
                    template = %template.id,
                    source = %source.filename,
                    count = file.count,
                    "template filled"
                )
            })
            .inspect_err(|e| {
                error!(
                    template = %template.id,
                    source = %source.filename,
                    error = %e,
                    "template conversion failed"
                )
            })
    }

    /// Extract every mapped value, then write them into `template_bytes`.
    pub(crate) fn fill_template(
        &self,
        source: &SourceFile,
        template: &TemplateInfo,
        mapping: &TemplateMapping,
        template_bytes: &[u8],
    ) -> TransferResult<ProcessedFile> {
        let specs = mapping.source_specs();
        let data = self
            .extractor
            .extract(&source.content, &mapping.source_sheet, &specs)?;

        let pairs: Vec<(String, String)> = mapping
            .cell_mappings
            .iter()
            .zip(data.values)
            .map(|(m, value)| (m.target.to_string(), value))
            .collect();

        let mut workbook = TemplateWorkbook::open(template_bytes)?;
        let summary = workbook.write_pairs(&mapping.target_sheet, &pairs)?;
        let content = workbook.save()?;

        Ok(ProcessedFile {
            output_filename: template.output_filename.clone(),
            content,
            count: summary.written,
        })
    }
}
