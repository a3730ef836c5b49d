//! Builds small `.xlsx` workbooks for the integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Cell format indices defined by [`STYLES_XML`]
pub mod style {
    /// No fill
    pub const PLAIN: usize = 0;
    /// Yellow, `rgb="FFFFFF00"`
    pub const YELLOW: usize = 1;
    /// `indexed="5"`
    pub const INDEXED_5: usize = 2;
    /// `theme="4"`
    pub const THEME_4: usize = 3;
    /// `indexed="43"`, allowlisted by default
    pub const INDEXED_43: usize = 4;
}

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fills count="6">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="gray125"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill>
    <fill><patternFill patternType="solid"><fgColor indexed="5"/><bgColor indexed="64"/></patternFill></fill>
    <fill><patternFill patternType="solid"><fgColor theme="4" tint="0.59999389629810485"/><bgColor indexed="64"/></patternFill></fill>
    <fill><patternFill patternType="solid"><fgColor indexed="43"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="5">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="0" fontId="0" fillId="2" borderId="0" xfId="0" applyFill="1"/>
    <xf numFmtId="0" fontId="0" fillId="3" borderId="0" xfId="0" applyFill="1"/>
    <xf numFmtId="0" fontId="0" fillId="4" borderId="0" xfId="0" applyFill="1"/>
    <xf numFmtId="0" fontId="0" fillId="5" borderId="0" xfId="0" applyFill="1"/>
  </cellXfs>
</styleSheet>"#;

/// Content of one test cell
#[derive(Debug, Clone)]
pub enum TestCell {
    /// Nothing written
    Blank,
    /// Numeric value
    Num(f64),
    /// Shared string
    Str(&'static str),
    /// Inline string
    Inline(&'static str),
    /// Empty cell with a fill
    Marked(usize),
}

fn column_letter(col: usize) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Write a workbook whose first sheet holds `rows`
pub fn write_workbook(path: &Path, rows: &[Vec<TestCell>]) {
    let mut shared: Vec<&str> = Vec::new();
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_letter(c), r + 1);
            match cell {
                TestCell::Blank => {}
                TestCell::Num(n) => {
                    sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, n))
                }
                TestCell::Str(s) => {
                    let index = match shared.iter().position(|x| x == s) {
                        Some(i) => i,
                        None => {
                            shared.push(s);
                            shared.len() - 1
                        }
                    };
                    sheet.push_str(&format!(r#"<c r="{}" t="s"><v>{}</v></c>"#, reference, index))
                }
                TestCell::Inline(s) => sheet.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    reference,
                    escape(s)
                )),
                TestCell::Marked(style) => {
                    sheet.push_str(&format!(r#"<c r="{}" s="{}"/>"#, reference, style))
                }
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let mut strings = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
        shared.len()
    );
    for s in &shared {
        strings.push_str(&format!(r#"<si><t xml:space="preserve">{}</t></si>"#, escape(s)));
    }
    strings.push_str("</sst>");

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#
                .to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Program" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
                .to_string(),
        ),
        ("xl/styles.xml", STYLES_XML.to_string()),
        ("xl/sharedStrings.xml", strings),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// The SO2 programme workbook used across the integration tests
///
/// | Row | Liniaritet   | Span    | Inds v skift af ref |
/// |-----|--------------|---------|---------------------|
/// | 1   | yellow       |         |                     |
/// | 2   | indexed 5    | idx 43  | theme 4             |
/// | 3   |              | yellow  |                     |
/// | 4   | theme 4      |         |                     |
///
/// A note row ends the data region; the yellow mark below it is ignored.
pub fn programme_rows() -> Vec<Vec<TestCell>> {
    use TestCell::*;
    vec![
        vec![
            Str("Nr"),
            Str("Fd %"),
            Str("ml/min"),
            Str("Fso2"),
            Str("ml/min "),
            Str("SO2 ppb"),
            Str("Liniaritet"),
            Str("Span"),
            Str("Inds v skift af ref"),
        ],
        vec![
            Num(1.0),
            Num(90.0),
            Num(4.5),
            Num(0.0),
            Num(0.0),
            Num(0.0),
            Marked(style::YELLOW),
            Blank,
            Marked(style::PLAIN),
        ],
        vec![
            Num(2.0),
            Num(80.0),
            Num(4.0),
            Num(20.0),
            Num(20.0),
            Num(50.0),
            Marked(style::INDEXED_5),
            Marked(style::INDEXED_43),
            Marked(style::THEME_4),
        ],
        vec![
            Num(3.0),
            Num(60.0),
            Num(3.0),
            Num(40.0),
            Num(40.0),
            Inline("100.5"),
            Blank,
            Marked(style::YELLOW),
            Blank,
        ],
        vec![
            Str("4"),
            Num(50.0),
            Num(2.5),
            Num(50.0),
            Num(50.0),
            Num(150.0),
            Marked(style::THEME_4),
            Blank,
            Blank,
        ],
        vec![Inline("Note: flows in ml/min"), Blank, Blank, Blank, Blank, Blank, Marked(style::YELLOW)],
    ]
}
