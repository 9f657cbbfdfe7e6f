//! Output file naming: facility labels, archive names and consolidated
//! workbook names.

use std::collections::HashSet;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{TransferError, TransferResult};

/// Used when a label sanitizes down to nothing.
pub const PLACEHOLDER_LABEL: &str = "facility";

/// Maximum label length, in characters.
pub const MAX_LABEL_CHARS: usize = 30;

const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a facility label safe to use as a file name.
///
/// Forbidden path characters become `_`, control characters are removed,
/// whitespace runs collapse to one space, and the result is trimmed and capped
/// at [`MAX_LABEL_CHARS`] characters. A label with nothing meaningful left
/// (including one made only of forbidden characters) becomes
/// [`PLACEHOLDER_LABEL`].
pub fn sanitize_label(label: &str) -> TransferResult<String> {
    let control_chars = Regex::new(r"[\x00-\x1f\x7f-\x9f]")
        .map_err(|e| TransferError::InvalidRequest(format!("Regex error: {}", e)))?;
    let whitespace_runs = Regex::new(r"\s+")
        .map_err(|e| TransferError::InvalidRequest(format!("Regex error: {}", e)))?;

    let replaced: String = label
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect();
    let stripped = control_chars.replace_all(&replaced, "");
    let collapsed = whitespace_runs.replace_all(&stripped, " ");
    let trimmed = collapsed.trim();

    if trimmed.chars().all(|c| c == '_' || c == ' ') {
        return Ok(PLACEHOLDER_LABEL.to_string());
    }

    let capped: String = trimmed.chars().take(MAX_LABEL_CHARS).collect();
    Ok(capped.trim_end().to_string())
}

/// `{label}_{YYYYMMDD}.zip`
pub fn archive_filename(label: &str, date: NaiveDate) -> TransferResult<String> {
    Ok(format!(
        "{}_{}.zip",
        sanitize_label(label)?,
        date.format("%Y%m%d")
    ))
}

/// `{base}_merged_{count}_{YYYYMMDD}.xlsx`, where `base` is the template's
/// output name without its extension.
pub fn merged_filename(output_filename: &str, count: usize, date: NaiveDate) -> String {
    let (base, ext) = split_extension(output_filename);
    let ext = if ext.is_empty() { ".xlsx" } else { ext };
    format!("{}_merged_{}_{}{}", base, count, date.format("%Y%m%d"), ext)
}

/// Hand out archive member names, suffixing repeats with ` (2)`, ` (3)` …
#[derive(Debug, Default)]
pub struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, name: &str) -> String {
        if self.used.insert(name.to_string()) {
            return name.to_string();
        }
        let (base, ext) = split_extension(name);
        let mut n = 2;
        loop {
            let candidate = format!("{} ({}){}", base, n, ext);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// `("report", ".xlsx")` for `"report.xlsx"`; no extension → `(name, "")`.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    #[test]
    fn test_sanitize_replaces_and_trims() {
        assert_eq!(sanitize_label("  渋谷/店  ").unwrap(), "渋谷_店");
        assert_eq!(sanitize_label("a   b\u{3000} c").unwrap(), "a b c");
        assert_eq!(sanitize_label("a\tb\nc").unwrap(), "abc");
        assert_eq!(sanitize_label("a\u{0007}b").unwrap(), "ab");
        assert_eq!(sanitize_label(r#"x:y*z?"<>|\"#).unwrap(), "x_y_z______");
    }

    #[test]
    fn test_sanitize_caps_multibyte_length() {
        let long = "横浜みなとみらい総合医療センター附属第二クリニック分院";
        let label = format!(" {}/{} ", long, long);
        let sanitized = sanitize_label(&label).unwrap();
        assert_eq!(sanitized.chars().count(), 30);
        assert!(!sanitized.contains('/'));
        assert!(sanitized.starts_with("横浜"));
    }

    #[test]
    fn test_sanitize_fallback() {
        assert_eq!(sanitize_label("").unwrap(), PLACEHOLDER_LABEL);
        assert_eq!(sanitize_label("   ").unwrap(), PLACEHOLDER_LABEL);
        assert_eq!(sanitize_label("///").unwrap(), PLACEHOLDER_LABEL);
        assert_eq!(sanitize_label("\u{0001}\u{0002}").unwrap(), PLACEHOLDER_LABEL);
    }

    #[test]
    fn test_archive_filename() {
        assert_eq!(
            archive_filename("渋谷店", date()).unwrap(),
            "渋谷店_20250401.zip"
        );
    }

    #[test]
    fn test_merged_filename() {
        assert_eq!(
            merged_filename("application.xlsx", 3, date()),
            "application_merged_3_20250401.xlsx"
        );
        assert_eq!(
            merged_filename("noext", 1, date()),
            "noext_merged_1_20250401.xlsx"
        );
    }

    #[test]
    fn test_unique_names() {
        let mut names = UniqueNames::new();
        assert_eq!(names.claim("out.xlsx"), "out.xlsx");
        assert_eq!(names.claim("out.xlsx"), "out (2).xlsx");
        assert_eq!(names.claim("out.xlsx"), "out (3).xlsx");
        assert_eq!(names.claim("other.xlsx"), "other.xlsx");
    }
}
