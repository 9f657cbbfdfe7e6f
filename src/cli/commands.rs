use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use colored::Colorize;

use super::session::Session;
use crate::config::AppConfig;
use crate::error::{ItemFailure, TransferResult};

/// Execute the templates command
pub fn templates(config: &AppConfig, all: bool) -> TransferResult<()> {
    let session = Session::open(config)?;

    println!("{}", "📋 Sheetmap - Templates".bold().green());
    println!("   Config: {}\n", session.catalog().config_path().display());

    let summaries = session.list_templates(all);
    if summaries.is_empty() {
        println!("{}", "⚠️  No templates configured".yellow());
        return Ok(());
    }

    for t in &summaries {
        let status = match (t.is_active, t.has_mapping) {
            (false, _) => "inactive".dimmed(),
            (true, false) => "no mapping".yellow(),
            (true, true) => format!("{} cells", t.cell_count).green(),
        };
        println!("   {} {} ({})", t.id.bright_blue().bold(), t.name, status);
        if !t.description.is_empty() {
            println!("      {}", t.description.dimmed());
        }
        if !t.file_ok {
            println!("      {} {} is missing or not an xlsx file", "❌".red(), t.filename);
        }
    }

    println!();
    println!(
        "{}",
        format!(
            "✅ {} templates (multi-source limit: {} rows per run)",
            summaries.len(),
            session.converter().limits().max_rows_per_run
        )
        .bold()
        .green()
    );
    Ok(())
}

/// Execute the convert command
pub fn convert(
    config: &AppConfig,
    source: PathBuf,
    template_id: String,
    output_dir: PathBuf,
) -> TransferResult<()> {
    println!("{}", "🔄 Sheetmap - Converting".bold().green());
    println!("   Source:   {}", source.display());
    println!("   Template: {}\n", template_id.bright_blue().bold());

    let session = Session::open(config)?;
    let report = session.convert(&source, &template_id, &output_dir)?;

    println!(
        "{}",
        format!("✅ {} cells written", report.count).bold().green()
    );
    println!("   Output: {}", report.output_path.bright_blue());
    Ok(())
}

/// Execute the batch command
pub fn batch(
    config: &AppConfig,
    source: PathBuf,
    template_ids: Vec<String>,
    facility: String,
    date: Option<NaiveDate>,
    output_dir: PathBuf,
) -> TransferResult<()> {
    println!("{}", "📦 Sheetmap - Batch conversion".bold().green());
    println!("   Source:    {}", source.display());
    println!("   Templates: {}", template_ids.join(", ").bright_blue());
    println!("   Facility:  {}\n", facility);

    let session = Session::open(config)?;
    let report = session.batch(
        &source,
        &template_ids,
        &facility,
        date.unwrap_or_else(today),
        &output_dir,
    )?;

    for name in &report.processed_files {
        println!("   {} {}", "✓".green(), name);
    }
    print_failures(&report.failures);

    println!();
    println!(
        "{}",
        format!(
            "✅ {} of {} templates filled",
            report.processed_files.len(),
            template_ids.len()
        )
        .bold()
        .green()
    );
    println!("   Archive: {}", report.archive_path.bright_blue());
    Ok(())
}

/// Execute the merge command
pub fn merge(
    config: &AppConfig,
    sources: Vec<PathBuf>,
    template_id: String,
    labels: Option<Vec<String>>,
    start_row: Option<u32>,
    date: Option<NaiveDate>,
    output_dir: PathBuf,
) -> TransferResult<()> {
    println!("{}", "🧩 Sheetmap - Multi-source merge".bold().green());
    println!("   Template: {}", template_id.bright_blue().bold());
    println!("   Sources:  {}\n", sources.len());

    let labels = labels.unwrap_or_else(|| default_labels(&sources));
    let session = Session::open(config)?;
    let report = session.merge(
        &sources,
        &labels,
        &template_id,
        start_row,
        date.unwrap_or_else(today),
        &output_dir,
    )?;

    for row in &report.rows {
        println!("   {} row {}: {}", "✓".green(), row.row, row.label);
    }
    print_failures(&report.failures);

    println!();
    println!(
        "{}",
        format!(
            "✅ {} of {} sources merged",
            report.processed_count,
            sources.len()
        )
        .bold()
        .green()
    );
    println!("   Output: {}", report.output_path.bright_blue());
    Ok(())
}

/// Parse a `YYYYMMDD` command-line date.
pub fn parse_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text, "%Y%m%d")
        .map_err(|e| format!("expected YYYYMMDD, got '{}': {}", text, e))
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// One label per source: the file name without its extension.
fn default_labels(sources: &[PathBuf]) -> Vec<String> {
    sources.iter().map(|p| file_stem(p)).collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_failures(failures: &[ItemFailure]) {
    for failure in failures {
        println!(
            "   {} {}: {}",
            "⚠️ ".yellow(),
            failure.item.bright_yellow(),
            failure.message
        );
    }
}
