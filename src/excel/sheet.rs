//! Worksheet editing: merged-range bookkeeping and a streaming patch of
//! `<sheetData>` that rewrites only the touched cells.

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::package::{local_name, PackageError};
use crate::address::{CellAddress, CellRange};

/// Value stored by a patch. `Clear` keeps the cell (and its style) but drops
/// its contents.
#[derive(Debug, Clone, PartialEq)]
pub enum CellWrite {
    Number(f64),
    Text(String),
    Clear,
}

/// Pending edits for one worksheet part.
///
/// Merged ranges are read for lookup only. Writes never change the range
/// list, so the `<mergeCells>` block is carried over as it is.
#[derive(Debug, Clone)]
pub struct WorksheetEditor {
    merges: Vec<CellRange>,
    cells: BTreeMap<(u32, u32), CellWrite>,
}

impl WorksheetEditor {
    /// Read the merged ranges of an existing worksheet part.
    pub fn from_xml(xml: &[u8]) -> Result<Self, PackageError> {
        Ok(Self {
            merges: read_merge_cells(xml)?,
            cells: BTreeMap::new(),
        })
    }

    pub fn merged_ranges(&self) -> &[CellRange] {
        &self.merges
    }

    /// The merged range covering `cell`, if any.
    pub fn merged_range_at(&self, cell: &CellAddress) -> Option<CellRange> {
        self.merges.iter().copied().find(|r| r.contains(cell))
    }

    pub fn set_cell(&mut self, cell: CellAddress, value: CellWrite) {
        self.cells.insert((cell.row, cell.col), value);
    }

    pub fn pending_cells(&self) -> usize {
        self.cells.len()
    }

    /// Rewrite `original` with the pending edits. The flag reports whether a
    /// formula cell was overwritten.
    pub fn apply(&self, original: &[u8]) -> Result<(Vec<u8>, bool), PackageError> {
        if self.cells.is_empty() {
            return Ok((original.to_vec(), false));
        }
        patch_worksheet_xml(original, &self.by_row())
    }

    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &CellWrite)>> {
        let mut out: BTreeMap<u32, Vec<(u32, &CellWrite)>> = BTreeMap::new();
        for (&(row, col), value) in &self.cells {
            out.entry(row).or_default().push((col, value));
        }
        out
    }
}

//==============================================================================
// Merged ranges
//==============================================================================

fn read_merge_cells(xml: &[u8]) -> Result<Vec<CellRange>, PackageError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut merges = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"ref" {
                        let value = attr.unescape_value()?;
                        let range = CellRange::parse(&value).map_err(|_| {
                            PackageError::Invalid(format!("invalid merge reference: {value}"))
                        })?;
                        merges.push(range);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(merges)
}

//==============================================================================
// Cell patching
//==============================================================================

type RowPatches<'a> = BTreeMap<u32, Vec<(u32, &'a CellWrite)>>;

fn patch_worksheet_xml(
    original: &[u8],
    rows: &RowPatches<'_>,
) -> Result<(Vec<u8>, bool), PackageError> {
    let pending: Vec<u32> = rows.keys().copied().collect();
    let mut next = 0usize;
    let mut formula_changed = false;

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + pending.len() * 128));
    let mut buf = Vec::new();
    let mut saw_sheet_data = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                formula_changed |=
                    patch_sheet_data(&mut reader, &mut writer, rows, &pending, &mut next)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                writer.write_event(Event::Start(e.into_owned()))?;
                write_remaining_rows(&mut writer, rows, &pending, &mut next)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"worksheet" => {
                if !saw_sheet_data {
                    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                    write_remaining_rows(&mut writer, rows, &pending, &mut next)?;
                    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), formula_changed))
}

fn write_remaining_rows(
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches<'_>,
    pending: &[u32],
    next: &mut usize,
) -> Result<(), PackageError> {
    while *next < pending.len() {
        let row = pending[*next];
        write_new_row(writer, row, rows.get(&row).map(Vec::as_slice).unwrap_or_default())?;
        *next += 1;
    }
    Ok(())
}

fn write_rows_before(
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches<'_>,
    pending: &[u32],
    next: &mut usize,
    row_num: u32,
) -> Result<(), PackageError> {
    while *next < pending.len() && pending[*next] < row_num {
        let row = pending[*next];
        write_new_row(writer, row, rows.get(&row).map(Vec::as_slice).unwrap_or_default())?;
        *next += 1;
    }
    Ok(())
}

fn patch_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches<'_>,
    pending: &[u32],
    next: &mut usize,
) -> Result<bool, PackageError> {
    let mut buf = Vec::new();
    let mut formula_changed = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_start = e.into_owned();
                let Some(row_num) = attr_u32(&row_start, b"r")? else {
                    writer.write_event(Event::Start(row_start))?;
                    continue;
                };
                write_rows_before(writer, rows, pending, next, row_num)?;
                writer.write_event(Event::Start(row_start))?;

                match rows.get(&row_num) {
                    Some(cells) => {
                        if *next < pending.len() && pending[*next] == row_num {
                            *next += 1;
                        }
                        formula_changed |= patch_row(reader, writer, row_num, cells)?;
                    }
                    None => copy_until_row_end(reader, writer)?,
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                let row_empty = e.into_owned();
                let Some(row_num) = attr_u32(&row_empty, b"r")? else {
                    writer.write_event(Event::Empty(row_empty))?;
                    continue;
                };
                write_rows_before(writer, rows, pending, next, row_num)?;

                match rows.get(&row_num) {
                    Some(cells) => {
                        if *next < pending.len() && pending[*next] == row_num {
                            *next += 1;
                        }
                        writer.write_event(Event::Start(row_empty))?;
                        for (col, value) in cells {
                            write_cell(writer, row_num, *col, value, None)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new("row")))?;
                    }
                    None => writer.write_event(Event::Empty(row_empty))?,
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_remaining_rows(writer, rows, pending, next)?;
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(PackageError::Invalid(
                    "unexpected end of worksheet inside sheetData".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(formula_changed)
}

fn copy_until_row_end<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
) -> Result<(), PackageError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::Eof => {
                return Err(PackageError::Invalid(
                    "unexpected end of worksheet inside row".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn patch_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &CellWrite)],
) -> Result<bool, PackageError> {
    let mut buf = Vec::new();
    let mut idx = 0usize;
    let mut formula_changed = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell_start = e.into_owned();
                let Some((col, style)) = cell_column_and_style(&cell_start, row_num)? else {
                    writer.write_event(Event::Start(cell_start))?;
                    continue;
                };

                while idx < cells.len() && cells[idx].0 < col {
                    write_cell(writer, row_num, cells[idx].0, cells[idx].1, None)?;
                    idx += 1;
                }

                if idx < cells.len() && cells[idx].0 == col {
                    formula_changed |= skip_cell_body(reader)?;
                    write_cell(writer, row_num, col, cells[idx].1, style.as_deref())?;
                    idx += 1;
                } else {
                    writer.write_event(Event::Start(cell_start))?;
                }
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell_empty = e.into_owned();
                let Some((col, style)) = cell_column_and_style(&cell_empty, row_num)? else {
                    writer.write_event(Event::Empty(cell_empty))?;
                    continue;
                };

                while idx < cells.len() && cells[idx].0 < col {
                    write_cell(writer, row_num, cells[idx].0, cells[idx].1, None)?;
                    idx += 1;
                }

                if idx < cells.len() && cells[idx].0 == col {
                    write_cell(writer, row_num, col, cells[idx].1, style.as_deref())?;
                    idx += 1;
                } else {
                    writer.write_event(Event::Empty(cell_empty))?;
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                while idx < cells.len() {
                    write_cell(writer, row_num, cells[idx].0, cells[idx].1, None)?;
                    idx += 1;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => {
                return Err(PackageError::Invalid(
                    "unexpected end of worksheet inside row".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(formula_changed)
}

/// Consume the body of a `<c>` element. Returns true if it held a formula.
fn skip_cell_body<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<bool, PackageError> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    let mut had_formula = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
                depth += 1;
            }
            Event::Empty(inner) => {
                if depth == 1 && local_name(inner.name().as_ref()) == b"f" {
                    had_formula = true;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(had_formula);
                }
            }
            Event::Eof => {
                return Err(PackageError::Invalid(
                    "unexpected end of worksheet inside cell".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &CellWrite)],
) -> Result<(), PackageError> {
    let r = row_num.to_string();
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", r.as_str()));
    writer.write_event(Event::Start(row))?;
    for (col, value) in cells {
        write_cell(writer, row_num, *col, value, None)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    col: u32,
    value: &CellWrite,
    style: Option<&str>,
) -> Result<(), PackageError> {
    let reference = CellAddress { row: row_num, col }.to_string();

    let mut cell = String::with_capacity(64);
    cell.push_str(r#"<c r=""#);
    cell.push_str(&reference);
    cell.push('"');
    if let Some(s) = style.filter(|s| *s != "0") {
        cell.push_str(r#" s=""#);
        cell.push_str(&escape_text(s));
        cell.push('"');
    }

    match value {
        CellWrite::Clear => cell.push_str("/>"),
        CellWrite::Number(n) => {
            cell.push_str("><v>");
            cell.push_str(&n.to_string());
            cell.push_str("</v></c>");
        }
        CellWrite::Text(s) => {
            cell.push_str(r#" t="inlineStr"><is><t"#);
            if needs_space_preserve(s) {
                cell.push_str(r#" xml:space="preserve""#);
            }
            cell.push('>');
            cell.push_str(&escape_text(s));
            cell.push_str("</t></is></c>");
        }
    }

    writer.get_mut().extend_from_slice(cell.as_bytes());
    Ok(())
}

fn attr_u32(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<u32>, PackageError> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(attr.unescape_value()?.parse::<u32>().ok());
        }
    }
    Ok(None)
}

/// Column and `s` attribute of a `<c>` in `row_num`; `None` when the cell
/// has no usable reference (such cells are copied through untouched).
fn cell_column_and_style(
    cell: &BytesStart<'_>,
    row_num: u32,
) -> Result<Option<(u32, Option<String>)>, PackageError> {
    let mut reference = None;
    let mut style = None;
    for attr in cell.attributes() {
        let attr = attr?;
        match local_name(attr.key.as_ref()) {
            b"r" => reference = Some(attr.unescape_value()?.into_owned()),
            b"s" => style = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    let Some(address) = reference.and_then(|r| CellAddress::parse(&r).ok()) else {
        return Ok(None);
    };
    if address.row != row_num {
        return Ok(None);
    }
    Ok(Some((address.col, style)))
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// XML-escape `s`. Control characters XML 1.0 cannot carry are written as
/// `_xHHHH_`, and a literal `_xHHHH_` gets its underscore escaped so it reads
/// back as typed.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.char_indices() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '_' if is_escape_sequence(&s[i..]) => out.push_str("_x005F_"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 => out.push_str(&format!("_x{:04X}_", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// `_xHHHH_` at the start of `s`.
fn is_escape_sequence(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 7
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}
