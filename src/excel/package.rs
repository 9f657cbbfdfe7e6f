//! In-memory OOXML package: every zip part kept as raw bytes so a template
//! round-trips with only the edited worksheets rewritten.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
}

/// A `<sheet>` entry of `xl/workbook.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub rel_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = BTreeMap::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().to_string();
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            parts.insert(name, buf);
        }

        if !parts.contains_key(WORKBOOK_PART) {
            return Err(PackageError::MissingPart(WORKBOOK_PART.to_string()));
        }

        Ok(Self { parts })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        // [Content_Types].xml first, as spreadsheet applications expect
        let ordered = self
            .parts
            .iter()
            .filter(|(name, _)| name.as_str() == "[Content_Types].xml")
            .chain(
                self.parts
                    .iter()
                    .filter(|(name, _)| name.as_str() != "[Content_Types].xml"),
            );

        for (name, bytes) in ordered {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Sheets listed by the workbook, in tab order.
    pub fn workbook_sheets(&self) -> Result<Vec<SheetEntry>, PackageError> {
        let xml = self
            .part(WORKBOOK_PART)
            .ok_or_else(|| PackageError::MissingPart(WORKBOOK_PART.to_string()))?;
        parse_workbook_sheets(xml)
    }

    /// Part name of the worksheet behind `sheet`.
    pub fn worksheet_part(&self, sheet: &SheetEntry) -> Result<String, PackageError> {
        let rels_name = rels_part_name(WORKBOOK_PART);
        let rels = self
            .part(&rels_name)
            .ok_or_else(|| PackageError::MissingPart(rels_name.clone()))?;

        let target = parse_relationship_targets(rels)?
            .into_iter()
            .find(|(id, _)| *id == sheet.rel_id)
            .map(|(_, target)| target)
            .ok_or_else(|| {
                PackageError::Invalid(format!("missing worksheet relationship for {}", sheet.name))
            })?;

        let part = resolve_target(WORKBOOK_PART, &target);
        if self.part(&part).is_none() {
            return Err(PackageError::MissingPart(part));
        }
        Ok(part)
    }

    /// Drop the calculation chain and ask the application to recalculate on
    /// open. Needed once any formula cell has been overwritten.
    ///
    /// The workbook relationship and the content-type override go with the
    /// part, otherwise the saved package points at a missing part.
    pub fn invalidate_calc_chain(&mut self) -> Result<(), PackageError> {
        self.parts.remove(CALC_CHAIN_PART);

        let rels_name = rels_part_name(WORKBOOK_PART);
        if let Some(rels) = self.part(&rels_name) {
            let updated = remove_elements(rels, b"Relationship", |e| {
                Ok(attr_value(e, b"Type")?.as_deref() == Some(CALC_CHAIN_REL_TYPE)
                    || attr_value(e, b"Target")?
                        .is_some_and(|t| resolve_target(WORKBOOK_PART, &t) == CALC_CHAIN_PART))
            })?;
            self.set_part(rels_name, updated);
        }

        if let Some(content_types) = self.part(CONTENT_TYPES_PART) {
            let updated = remove_elements(content_types, b"Override", |e| {
                Ok(attr_value(e, b"PartName")?
                    .is_some_and(|p| p.trim_start_matches('/') == CALC_CHAIN_PART))
            })?;
            self.set_part(CONTENT_TYPES_PART, updated);
        }

        let Some(bytes) = self.part(WORKBOOK_PART) else {
            return Ok(());
        };
        let updated = set_full_calc_on_load(bytes)?;
        self.set_part(WORKBOOK_PART, updated);
        Ok(())
    }
}

fn parse_workbook_sheets(xml: &[u8]) -> Result<Vec<SheetEntry>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = attr.key.as_ref();
                    if key == b"name" {
                        name = Some(attr.unescape_value()?.into_owned());
                    } else if local_name(key) == b"id" {
                        rel_id = Some(attr.unescape_value()?.into_owned());
                    }
                }
                match (name, rel_id) {
                    (Some(name), Some(rel_id)) => sheets.push(SheetEntry { name, rel_id }),
                    _ => {
                        return Err(PackageError::Invalid(
                            "workbook sheet entry without name or r:id".to_string(),
                        ))
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// `(Id, Target)` of every internal relationship.
fn parse_relationship_targets(xml: &[u8]) -> Result<Vec<(String, String)>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                let mut external = false;
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?.into_owned();
                    match local_name(attr.key.as_ref()) {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        b"TargetMode" => external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target), false) = (id, target, external) {
                    out.push((id, target));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Resolve a relationship target against the part that owns the relationship.
fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map(|(t, _)| t).unwrap_or(target);
    let (target, base_dir) = match target.strip_prefix('/') {
        Some(absolute) => (absolute, ""),
        None => (
            target,
            base_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""),
        ),
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, PackageError> {
    for attr in e.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Copy `xml`, leaving out every `element` the predicate selects (with its
/// children when it is not self-closing).
fn remove_elements<F>(xml: &[u8], element: &[u8], selects: F) -> Result<Vec<u8>, PackageError>
where
    F: Fn(&BytesStart<'_>) -> Result<bool, PackageError>,
{
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(e) if depth > 0 => {
                if local_name(e.name().as_ref()) == element {
                    depth += 1;
                }
            }
            Event::End(e) if depth > 0 => {
                if local_name(e.name().as_ref()) == element {
                    depth -= 1;
                }
            }
            _ if depth > 0 => {}
            Event::Start(e) if local_name(e.name().as_ref()) == element && selects(&e)? => {
                depth = 1;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == element && selects(&e)? => {}
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn set_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>, PackageError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 32));
    let mut buf = Vec::new();
    let mut saw_calc_pr = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(with_full_calc(&e)?))?;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Start(with_full_calc(&e)?))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"workbook" => {
                if !saw_calc_pr {
                    let mut calc = BytesStart::new("calcPr");
                    calc.push_attribute(("fullCalcOnLoad", "1"));
                    writer.write_event(Event::Empty(calc))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn with_full_calc(start: &BytesStart<'_>) -> Result<BytesStart<'static>, PackageError> {
    let name = String::from_utf8(start.name().as_ref().to_vec())?;
    let mut out = BytesStart::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) != b"fullCalcOnLoad" {
            out.push_attribute(attr);
        }
    }
    out.push_attribute(("fullCalcOnLoad", "1"));
    Ok(out)
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}
