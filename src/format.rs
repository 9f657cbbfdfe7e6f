//! Value coercion and per-cell format rules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TransferError;

/// A present cell value after coercion. Absence is modelled as `Option::None`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Number as-is, or the text coerced through [`parse_number`].
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_number(s),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => f.write_str(&render_number(*n)),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// Parse a finite float, retrying once with thousands separators removed.
pub fn parse_number(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let parsed = text
        .parse::<f64>()
        .ok()
        .or_else(|| text.replace(',', "").parse::<f64>().ok())?;
    parsed.is_finite().then_some(parsed)
}

/// Numeric if the text parses as a number (commas allowed), otherwise the
/// trimmed text; blank input is absent.
pub fn coerce_numeric_or_string(raw: &str) -> Option<CellValue> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    match parse_number(text) {
        Some(n) => Some(CellValue::Number(n)),
        None => Some(CellValue::Text(text.to_string())),
    }
}

/// Render a number the way a cell shows it: integral values without a
/// decimal point, everything else in shortest round-trip form.
pub fn render_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

/// Per-source-cell formatting applied inside concatenations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatRule {
    #[default]
    None,
    /// Digits only, rendered full-width (１２３)
    ZenkakuInt,
    /// Digits only, as a plain integer (leading zeros dropped)
    HankakuInt,
}

impl FromStr for FormatRule {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "none" => Ok(FormatRule::None),
            "zenkaku_int" => Ok(FormatRule::ZenkakuInt),
            "hankaku_int" => Ok(FormatRule::HankakuInt),
            other => Err(TransferError::Config(format!(
                "unknown format rule '{}'",
                other
            ))),
        }
    }
}

/// Apply a format rule to an already-stringified value.
pub fn apply_format_rule(value: &str, rule: FormatRule) -> String {
    match rule {
        FormatRule::None => value.to_string(),
        FormatRule::ZenkakuInt => to_zenkaku_digits(&extract_digits(value)),
        FormatRule::HankakuInt => {
            let digits = extract_digits(value);
            if digits.is_empty() {
                return String::new();
            }
            let trimmed = digits.trim_start_matches('0');
            if trimmed.is_empty() {
                "0".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

/// Keep decimal digits only, folding full-width digits to half-width.
fn extract_digits(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            _ => None,
        })
        .collect()
}

/// Map half-width digits to their full-width counterparts; other characters
/// pass through.
pub fn to_zenkaku_digits(digits: &str) -> String {
    digits
        .chars()
        .map(|c| match c {
            '0'..='9' => char::from_u32(c as u32 - '0' as u32 + '０' as u32).unwrap_or(c),
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_plain_number() {
        assert_eq!(coerce_numeric_or_string("42"), Some(CellValue::Number(42.0)));
        assert_eq!(
            coerce_numeric_or_string(" 3.5 "),
            Some(CellValue::Number(3.5))
        );
    }

    #[test]
    fn test_coerce_thousands_separator() {
        assert_eq!(
            coerce_numeric_or_string("1,234,567"),
            Some(CellValue::Number(1_234_567.0))
        );
    }

    #[test]
    fn test_coerce_text_and_blank() {
        assert_eq!(
            coerce_numeric_or_string("  株式会社 "),
            Some(CellValue::Text("株式会社".to_string()))
        );
        assert_eq!(coerce_numeric_or_string("   "), None);
        assert_eq!(coerce_numeric_or_string(""), None);
    }

    #[test]
    fn test_coerce_rejects_non_finite() {
        assert_eq!(
            coerce_numeric_or_string("NaN"),
            Some(CellValue::Text("NaN".to_string()))
        );
        assert_eq!(
            coerce_numeric_or_string("inf"),
            Some(CellValue::Text("inf".to_string()))
        );
    }

    #[test]
    fn test_full_width_digits_stay_text() {
        assert_eq!(
            coerce_numeric_or_string("１２３"),
            Some(CellValue::Text("１２３".to_string()))
        );
    }

    #[test]
    fn test_render_number() {
        assert_eq!(render_number(5.0), "5");
        assert_eq!(render_number(-3.0), "-3");
        assert_eq!(render_number(-0.0), "0");
        assert_eq!(render_number(2.5), "2.5");
        assert_eq!(render_number(7010901044955.0), "7010901044955");
    }

    #[test]
    fn test_zenkaku_int() {
        assert_eq!(apply_format_rule("No.1-2ab3", FormatRule::ZenkakuInt), "１２３");
        assert_eq!(apply_format_rule("none", FormatRule::ZenkakuInt), "");
    }

    #[test]
    fn test_hankaku_int() {
        assert_eq!(apply_format_rule("００７", FormatRule::HankakuInt), "7");
        assert_eq!(apply_format_rule("007", FormatRule::HankakuInt), "7");
        assert_eq!(apply_format_rule("000", FormatRule::HankakuInt), "0");
        assert_eq!(apply_format_rule("abc", FormatRule::HankakuInt), "");
    }

    #[test]
    fn test_none_rule_is_identity() {
        assert_eq!(apply_format_rule(" 12 a", FormatRule::None), " 12 a");
    }

    #[test]
    fn test_format_rule_from_str() {
        assert_eq!("zenkaku_int".parse::<FormatRule>().unwrap(), FormatRule::ZenkakuInt);
        assert_eq!("".parse::<FormatRule>().unwrap(), FormatRule::None);
        assert!("kanji".parse::<FormatRule>().is_err());
    }
}
