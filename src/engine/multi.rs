use chrono::NaiveDate;
use tracing::{info, warn};

use super::naming::merged_filename;
use super::Converter;
use crate::address::CellAddress;
use crate::config::EngineLimits;
use crate::error::{ItemFailure, TransferError, TransferResult};
use crate::excel::TemplateWorkbook;
use crate::types::{MultiSourceOutput, RowData, SourceFile, TemplateMapping};

impl Converter {
    /// Fold several sources into one template, one row per source.
    ///
    /// Rows are handed out in source order starting at `start_row` (or the
    /// template's multi-source start row). A source that fails to extract
    /// is recorded in `failures` and does not take a row. The capacity
    /// check runs before any source is read.
    pub fn convert_multi(
        &self,
        template_id: &str,
        sources: &[SourceFile],
        labels: &[String],
        start_row: Option<u32>,
        date: NaiveDate,
    ) -> TransferResult<MultiSourceOutput> {
        self.check_request(sources, labels)?;

        let set = self.catalog.snapshot();
        let (template, mapping) = set.resolve(template_id)?;
        let start = start_row.unwrap_or_else(|| mapping.multi_source_start_row());
        if start == 0 {
            return Err(TransferError::InvalidRequest(
                "start row must be at least 1".to_string(),
            ));
        }
        check_capacity(start, sources.len(), &self.limits)?;

        let template_bytes = self.catalog.read_template(template)?;
        let (rows, failures) = self.extract_rows(mapping, sources, labels, start);

        if rows.is_empty() {
            return Err(TransferError::AllItemsFailed {
                kind: "sources",
                count: sources.len(),
            });
        }

        let mut workbook = TemplateWorkbook::open(&template_bytes)?;
        let mut skipped_cells = 0;
        for row in &rows {
            let cells = row_cells(mapping, row);
            skipped_cells += workbook.write_cells(&mapping.target_sheet, &cells)?.skipped;
        }
        let content = workbook.save()?;

        info!(
            template = %template.id,
            rows = rows.len(),
            skipped = failures.len(),
            skipped_cells,
            start_row = start,
            "sources consolidated"
        );

        Ok(MultiSourceOutput {
            output_filename: merged_filename(&template.output_filename, rows.len(), date),
            content,
            processed_count: rows.len(),
            rows: rows.into_iter().map(|r| (r.label, r.row_number)).collect(),
            failures,
        })
    }

    fn check_request(&self, sources: &[SourceFile], labels: &[String]) -> TransferResult<()> {
        if sources.is_empty() {
            return Err(TransferError::InvalidRequest(
                "at least one source file is required".to_string(),
            ));
        }
        if sources.len() != labels.len() {
            return Err(TransferError::InvalidRequest(format!(
                "{} source files but {} labels",
                sources.len(),
                labels.len()
            )));
        }
        if sources.len() > self.limits.max_sources_per_run {
            return Err(TransferError::InvalidRequest(format!(
                "{} source files exceeds the limit of {}",
                sources.len(),
                self.limits.max_sources_per_run
            )));
        }
        Ok(())
    }

    fn extract_rows(
        &self,
        mapping: &TemplateMapping,
        sources: &[SourceFile],
        labels: &[String],
        start: u32,
    ) -> (Vec<RowData>, Vec<ItemFailure>) {
        let specs = mapping.source_specs();
        let mut rows: Vec<RowData> = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();

        for (source, label) in sources.iter().zip(labels) {
            // Capacity was checked for every source, so this cannot overflow.
            let row_number = start + rows.len() as u32;
            let row = self
                .extractor
                .extract(&source.content, &mapping.source_sheet, &specs)
                .and_then(|data| RowData::new(row_number, label.as_str(), data.values, &source.filename));

            match row {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!(source = %source.filename, label = %label, error = %e, "source skipped");
                    failures.push(ItemFailure::new(&source.filename, e.to_string()));
                }
            }
        }

        (rows, failures)
    }
}

/// Reject a run that would produce too many rows or run past the last
/// sheet row.
pub fn check_capacity(start_row: u32, count: usize, limits: &EngineLimits) -> TransferResult<()> {
    if count > limits.max_rows_per_run {
        return Err(TransferError::CapacityExceeded(format!(
            "{} rows requested, at most {} per run",
            count, limits.max_rows_per_run
        )));
    }
    let last_row = u64::from(start_row) + count as u64 - 1;
    if count > 0 && last_row > u64::from(limits.max_sheet_rows) {
        return Err(TransferError::CapacityExceeded(format!(
            "rows {} to {} run past the sheet limit of {}",
            start_row, last_row, limits.max_sheet_rows
        )));
    }
    Ok(())
}

/// Every mapping of `row`, moved onto the row's number.
fn row_cells(mapping: &TemplateMapping, row: &RowData) -> Vec<(CellAddress, String)> {
    mapping
        .cell_mappings
        .iter()
        .zip(&row.values)
        .filter_map(|(m, value)| match m.retarget(row.row_number) {
            Ok(moved) => Some((moved.target, value.clone())),
            Err(e) => {
                warn!(target = %m.target, row = row.row_number, error = %e, "skipping write");
                None
            }
        })
        .collect()
}
