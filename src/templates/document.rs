//! On-disk template configuration document and its conversion into the
//! validated mapping model.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::address::CellAddress;
use crate::error::{TransferError, TransferResult};
use crate::format::FormatRule;
use crate::types::{CellMapping, CellReferenceSpec, MappingKind, TemplateInfo, TemplateMapping};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(default)]
    pub templates: Vec<TemplateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub output_filename: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub mapping: Option<MappingEntry>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_sheet: String,
    pub target_sheet: String,
    pub target_row: u32,
    #[serde(default)]
    pub multi_file_start_row: Option<u32>,
    #[serde(default)]
    pub cell_mappings: Vec<CellMappingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellMappingEntry {
    pub target: String,
    pub source: SourceCells,
    #[serde(rename = "type", default)]
    pub kind: MappingKind,
    #[serde(default)]
    pub separator: String,
    #[serde(default)]
    pub format_rules: HashMap<String, FormatRule>,
}

/// `"F44+F46+F48"` or `["F44", "F46", "F48"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceCells {
    Joined(String),
    List(Vec<String>),
}

impl SourceCells {
    fn addresses(&self) -> Vec<&str> {
        match self {
            SourceCells::Joined(s) => s.split('+').map(str::trim).collect(),
            SourceCells::List(v) => v.iter().map(|s| s.trim()).collect(),
        }
    }
}

impl TemplateDocument {
    /// Read a JSON or YAML document, chosen by file extension.
    pub fn from_path(path: &Path) -> TransferResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .map(|e| {
                let e = e.to_string_lossy().to_lowercase();
                e == "yaml" || e == "yml"
            })
            .unwrap_or(false);

        if is_yaml {
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(serde_json::from_str(&content)?)
        }
    }

    /// Validate every entry and build the template list, in document order.
    pub fn into_templates(self) -> TransferResult<Vec<TemplateInfo>> {
        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(self.templates.len());

        for entry in self.templates {
            if entry.id.trim().is_empty() {
                return Err(TransferError::Config("template id must not be empty".to_string()));
            }
            if !seen.insert(entry.id.clone()) {
                return Err(TransferError::Config(format!(
                    "duplicate template id '{}'",
                    entry.id
                )));
            }
            templates.push(entry.into_template()?);
        }

        Ok(templates)
    }
}

impl TemplateEntry {
    fn into_template(self) -> TransferResult<TemplateInfo> {
        let mapping = match self.mapping {
            Some(m) => Some(
                m.into_mapping()
                    .map_err(|e| TransferError::Config(format!("template '{}': {}", self.id, e)))?,
            ),
            None => None,
        };

        Ok(TemplateInfo {
            id: self.id,
            name: self.name,
            filename: self.filename,
            output_filename: self.output_filename,
            description: self.description,
            is_active: self.is_active,
            mapping,
        })
    }
}

impl MappingEntry {
    fn into_mapping(self) -> TransferResult<TemplateMapping> {
        if self.target_row == 0 {
            return Err(TransferError::Config("target_row must be at least 1".to_string()));
        }
        if self.multi_file_start_row == Some(0) {
            return Err(TransferError::Config(
                "multi_file_start_row must be at least 1".to_string(),
            ));
        }

        let cell_mappings = self
            .cell_mappings
            .into_iter()
            .map(CellMappingEntry::into_mapping)
            .collect::<TransferResult<Vec<_>>>()?;

        Ok(TemplateMapping {
            source_sheet: self.source_sheet,
            target_sheet: self.target_sheet,
            target_row: self.target_row,
            cell_mappings,
            multi_file_start_row: self.multi_file_start_row,
        })
    }
}

impl CellMappingEntry {
    fn into_mapping(self) -> TransferResult<CellMapping> {
        let target = CellAddress::parse(&self.target)?;
        let cells = self
            .source
            .addresses()
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(CellAddress::parse)
            .collect::<TransferResult<Vec<_>>>()?;

        let mut rules = HashMap::with_capacity(self.format_rules.len());
        for (cell, rule) in self.format_rules {
            rules.insert(CellAddress::parse(&cell)?, rule);
        }

        let spec = CellReferenceSpec::new(self.kind, cells, self.separator, rules)
            .map_err(|e| TransferError::Config(format!("target {}: {}", self.target, e)))?;

        Ok(CellMapping::new(target, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TransferResult<Vec<TemplateInfo>> {
        let doc: TemplateDocument = serde_json::from_str(json)?;
        doc.into_templates()
    }

    #[test]
    fn test_joined_and_list_sources() {
        let templates = parse(
            r#"{"templates": [{
                "id": "t1", "name": "T1", "filename": "t1.xlsx", "output_filename": "o.xlsx",
                "mapping": {
                    "source_sheet": "in", "target_sheet": "out", "target_row": 14,
                    "cell_mappings": [
                        {"target": "E14", "source": "F40"},
                        {"target": "I14", "source": "F44+F46+F48", "type": "concat_cells", "separator": " "},
                        {"target": "K14", "source": ["F45", "F47"], "type": "sum"}
                    ]
                }
            }]}"#,
        )
        .unwrap();

        let t = &templates[0];
        assert!(t.is_active);
        assert_eq!(t.description, "");
        let mapping = t.mapping.as_ref().unwrap();
        assert_eq!(mapping.cell_mappings.len(), 3);
        assert_eq!(mapping.cell_mappings[1].source.cells().len(), 3);
        assert_eq!(mapping.cell_mappings[1].source.kind(), MappingKind::Concat);
        assert_eq!(mapping.cell_mappings[1].source.separator(), " ");
        assert_eq!(mapping.cell_mappings[2].source.kind(), MappingKind::Sum);
    }

    #[test]
    fn test_format_rules_keyed_by_cell() {
        let templates = parse(
            r#"{"templates": [{
                "id": "t", "name": "T", "filename": "t.xlsx", "output_filename": "o.xlsx",
                "mapping": {
                    "source_sheet": "in", "target_sheet": "out", "target_row": 2,
                    "cell_mappings": [
                        {"target": "Z2", "source": "F63+F67", "type": "concat",
                         "format_rules": {"F67": "zenkaku_int"}}
                    ]
                }
            }]}"#,
        )
        .unwrap();
        let spec = &templates[0].mapping.as_ref().unwrap().cell_mappings[0].source;
        assert_eq!(
            spec.format_rule(&CellAddress::parse("F67").unwrap()),
            FormatRule::ZenkakuInt
        );
    }

    #[test]
    fn test_single_with_two_sources_fails_load() {
        let result = parse(
            r#"{"templates": [{
                "id": "bad", "name": "B", "filename": "b.xlsx", "output_filename": "o.xlsx",
                "mapping": {"source_sheet": "a", "target_sheet": "b", "target_row": 1,
                    "cell_mappings": [{"target": "A1", "source": "B1+B2"}]}
            }]}"#,
        );
        match result {
            Err(TransferError::Config(msg)) => assert!(msg.contains("bad")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_address_fails_load() {
        let result = parse(
            r#"{"templates": [{
                "id": "t", "name": "T", "filename": "t.xlsx", "output_filename": "o.xlsx",
                "mapping": {"source_sheet": "a", "target_sheet": "b", "target_row": 1,
                    "cell_mappings": [{"target": "14E", "source": "B1"}]}
            }]}"#,
        );
        assert!(matches!(result, Err(TransferError::Config(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = parse(
            r#"{"templates": [
                {"id": "x", "name": "X", "filename": "x.xlsx", "output_filename": "x.xlsx"},
                {"id": "x", "name": "Y", "filename": "y.xlsx", "output_filename": "y.xlsx"}
            ]}"#,
        );
        assert!(matches!(result, Err(TransferError::Config(_))));
    }

    #[test]
    fn test_missing_required_field_is_parse_error() {
        let result: Result<TemplateDocument, _> =
            serde_json::from_str(r#"{"templates": [{"id": "x", "name": "X"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_target_row_rejected() {
        let result = parse(
            r#"{"templates": [{
                "id": "t", "name": "T", "filename": "t.xlsx", "output_filename": "o.xlsx",
                "mapping": {"source_sheet": "a", "target_sheet": "b", "target_row": 0}
            }]}"#,
        );
        assert!(matches!(result, Err(TransferError::Config(_))));
    }
}
