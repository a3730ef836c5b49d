//! Minimal `.xlsx` reader: cached cell values plus each cell's fill colour.
//!
//! Only the first worksheet is read. Formulas are not evaluated; the value
//! cached by the spreadsheet application is used instead.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use super::ProgramError;

/// Fill code of a cell without a pattern-fill foreground colour
pub const NO_FILL: &str = "00000000";

/// Cached value of one cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// No value
    #[default]
    Empty,
    /// Numeric value
    Number(f64),
    /// Shared, inline or formula string
    Text(String),
    /// Boolean value
    Bool(bool),
}

impl CellValue {
    /// Numeric view of the cell; numeric text is accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Empty => None,
        }
    }

    /// Integer view of the cell: finite numbers truncated toward zero, or text
    /// that parses as an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// True for cells without a value
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// One cell: value and fill colour code
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Cached value
    pub value: CellValue,
    /// Foreground colour of the pattern fill: ARGB hex, or a decimal
    /// indexed/theme colour number; [`NO_FILL`] when unfilled
    pub fill: String,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            value: CellValue::Empty,
            fill: NO_FILL.to_string(),
        }
    }
}

impl Cell {
    /// Unfilled cell with a value
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            fill: NO_FILL.to_string(),
        }
    }

    /// Cell with a value and a fill colour code
    pub fn filled(value: CellValue, fill: impl Into<String>) -> Self {
        Self {
            value,
            fill: fill.into(),
        }
    }
}

/// A worksheet as a dense grid of rows (row 0 is sheet row 1)
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Build a sheet from rows of cells
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Sheet name as listed in the workbook
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All rows; trailing empty cells may be absent
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Cell at a 0-based row and column
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Value at a 0-based row and column, `Empty` when absent
    pub fn value(&self, row: usize, col: usize) -> CellValue {
        self.cell(row, col).map(|c| c.value.clone()).unwrap_or_default()
    }

    /// Number of rows, including empty ones below the last used row
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read the first worksheet of an `.xlsx` file
pub fn read_first_sheet<P: AsRef<Path>>(path: P) -> Result<Sheet, ProgramError> {
    let path = path.as_ref();
    debug!("Reading workbook {}", path.display());
    let file = File::open(path)?;
    read_first_sheet_from(BufReader::new(file))
}

/// Read the first worksheet of an `.xlsx` workbook from any seekable reader
pub fn read_first_sheet_from<R: Read + Seek>(reader: R) -> Result<Sheet, ProgramError> {
    let mut archive = ZipArchive::new(reader)?;

    let workbook = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| ProgramError::MissingPart("xl/workbook.xml".to_string()))?;
    let (name, rel_id) = first_sheet_entry(&workbook)?;

    let sheet_path = match (rel_id, read_part(&mut archive, "xl/_rels/workbook.xml.rels")?) {
        (Some(id), Some(rels)) => relationship_target(&rels, &id)?
            .map(|target| resolve_target(&target))
            .ok_or_else(|| ProgramError::InvalidWorkbook(format!("no relationship {}", id)))?,
        _ => "xl/worksheets/sheet1.xml".to_string(),
    };

    let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let fills = match read_part(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_style_fills(&xml)?,
        None => Vec::new(),
    };

    let sheet_xml = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| ProgramError::MissingPart(sheet_path.clone()))?;
    let rows = parse_sheet(&sheet_xml, &shared_strings, &fills)?;
    debug!("Sheet {:?} has {} rows", name, rows.len());

    Ok(Sheet { name, rows })
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ProgramError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>, ProgramError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = std::str::from_utf8(&attr.value)?.to_string();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Name and relationship id of the first `<sheet>` in `workbook.xml`
fn first_sheet_entry(xml: &[u8]) -> Result<(String, Option<String>), ProgramError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    let name = get_attribute(e, "name")?.unwrap_or_default();
                    let rel_id = get_attribute(e, "r:id")?;
                    return Ok((name, rel_id));
                }
            }
            Ok(Event::Eof) => {
                return Err(ProgramError::InvalidWorkbook(
                    "workbook lists no sheets".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
}

fn relationship_target(xml: &[u8], id: &str) -> Result<Option<String>, ProgramError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"Relationship"
                    && get_attribute(e, "Id")?.as_deref() == Some(id)
                {
                    return get_attribute(e, "Target");
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, ProgramError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    // phonetic runs are not part of the displayed text
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text && !in_phonetic {
                    if let Some(s) = current.as_mut() {
                        s.push_str(&e.unescape()?);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Colour code of a `<fgColor>` element: rgb, then indexed, then theme
fn color_code(e: &BytesStart) -> Result<String, ProgramError> {
    for attr in ["rgb", "indexed", "theme"] {
        if let Some(value) = get_attribute(e, attr)? {
            return Ok(value);
        }
    }
    Ok(NO_FILL.to_string())
}

/// Fill colour code for each cell format (`cellXfs` entry), by index
fn parse_style_fills(xml: &[u8]) -> Result<Vec<String>, ProgramError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut fills: Vec<String> = Vec::new();
    let mut xf_fill_ids: Vec<usize> = Vec::new();
    let mut in_fills = false;
    let mut in_cell_xfs = false;
    let mut current_fill: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf);
        match event {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"fills" => in_fills = true,
                b"fill" if in_fills => current_fill = Some(NO_FILL.to_string()),
                b"fgColor" if current_fill.is_some() => current_fill = Some(color_code(e)?),
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => xf_fill_ids.push(fill_id(e)?),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"fill" if in_fills => fills.push(NO_FILL.to_string()),
                b"fgColor" if current_fill.is_some() => current_fill = Some(color_code(e)?),
                b"xf" if in_cell_xfs => xf_fill_ids.push(fill_id(e)?),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"fill" => {
                    if let Some(fill) = current_fill.take() {
                        fills.push(fill);
                    }
                }
                b"fills" => in_fills = false,
                b"cellXfs" => in_cell_xfs = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(xf_fill_ids
        .into_iter()
        .map(|id| fills.get(id).cloned().unwrap_or_else(|| NO_FILL.to_string()))
        .collect())
}

fn fill_id(e: &BytesStart) -> Result<usize, ProgramError> {
    Ok(get_attribute(e, "fillId")?
        .and_then(|s| s.parse().ok())
        .unwrap_or(0))
}

/// Split an `A1`-style reference into 0-based (row, column)
pub fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

/// Cell being assembled while its children are read
struct PendingCell {
    row: usize,
    col: usize,
    kind: String,
    fill: String,
    raw: String,
}

impl PendingCell {
    fn finish(self, shared: &[String]) -> Result<(usize, usize, Cell), ProgramError> {
        let value = match self.kind.as_str() {
            _ if self.raw.is_empty() && self.kind != "inlineStr" => CellValue::Empty,
            "s" => {
                let index: usize = self.raw.trim().parse().map_err(|_| {
                    ProgramError::InvalidWorkbook(format!("bad shared string index {:?}", self.raw))
                })?;
                let text = shared.get(index).ok_or_else(|| {
                    ProgramError::InvalidWorkbook(format!("shared string {} out of range", index))
                })?;
                CellValue::Text(text.clone())
            }
            "str" | "inlineStr" | "e" => CellValue::Text(self.raw),
            "b" => CellValue::Bool(self.raw.trim() == "1"),
            _ => match self.raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(self.raw),
            },
        };
        Ok((
            self.row,
            self.col,
            Cell {
                value,
                fill: self.fill,
            },
        ))
    }
}

fn place(rows: &mut Vec<Vec<Cell>>, row: usize, col: usize, cell: Cell) {
    if rows.len() <= row {
        rows.resize_with(row + 1, Vec::new);
    }
    let cells = &mut rows[row];
    if cells.len() <= col {
        cells.resize_with(col + 1, Cell::default);
    }
    cells[col] = cell;
}

fn parse_sheet(
    xml: &[u8],
    shared: &[String],
    fills: &[String],
) -> Result<Vec<Vec<Cell>>, ProgramError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<Cell>> = Vec::new();

    let mut row = 0usize;
    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_index(e)?.unwrap_or(next_row);
                    next_row = row + 1;
                    next_col = 0;
                }
                b"c" => pending = Some(start_cell(e, row, next_col, fills)?),
                b"v" | b"t" => in_value = pending.is_some(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_index(e)?.unwrap_or(next_row);
                    next_row = row + 1;
                }
                b"c" => {
                    let (r, c, cell) = start_cell(e, row, next_col, fills)?.finish(shared)?;
                    next_col = c + 1;
                    place(&mut rows, r, c, cell);
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_value {
                    if let Some(cell) = pending.as_mut() {
                        cell.raw.push_str(&e.unescape()?);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let (r, c, cell) = cell.finish(shared)?;
                        next_col = c + 1;
                        place(&mut rows, r, c, cell);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn start_cell(
    e: &BytesStart,
    row: usize,
    next_col: usize,
    fills: &[String],
) -> Result<PendingCell, ProgramError> {
    let (row, col) = match get_attribute(e, "r")?.as_deref().and_then(parse_cell_ref) {
        Some(position) => position,
        None => (row, next_col),
    };
    let fill = get_attribute(e, "s")?
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|xf| fills.get(xf).cloned())
        .unwrap_or_else(|| NO_FILL.to_string());
    Ok(PendingCell {
        row,
        col,
        kind: get_attribute(e, "t")?.unwrap_or_default(),
        fill,
        raw: String::new(),
    })
}

fn row_index(e: &BytesStart) -> Result<Option<usize>, ProgramError> {
    Ok(get_attribute(e, "r")?
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|r| *r > 0)
        .map(|r| r - 1))
}
