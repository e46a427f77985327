//! Builds small xlsx packages in memory for tests.
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use quick_xml::escape::escape;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

pub(crate) struct SheetFixture {
    name: String,
    /// 1-based row -> 1-based column -> (value, style)
    cells: BTreeMap<usize, BTreeMap<usize, (CellValue, Option<usize>)>>,
    merges: Vec<String>,
}

impl SheetFixture {
    pub(crate) fn new(name: &str) -> Self {
        SheetFixture {
            name: name.to_owned(),
            cells: BTreeMap::new(),
            merges: Vec::new(),
        }
    }

    /// Text cells from column A; empty strings leave the cell out.
    pub(crate) fn text_row(mut self, row: usize, values: &[&str]) -> Self {
        for (index, value) in values.iter().enumerate() {
            if !value.is_empty() {
                self = self.cell(row, index + 1, *value);
            }
        }
        self
    }

    pub(crate) fn cell(mut self, row: usize, col: usize, value: impl Into<CellValue>) -> Self {
        self.cells.entry(row).or_default().insert(col, (value.into(), None));
        self
    }

    pub(crate) fn styled_cell(mut self, row: usize, col: usize, value: impl Into<CellValue>, style: usize) -> Self {
        self.cells.entry(row).or_default().insert(col, (value.into(), Some(style)));
        self
    }

    pub(crate) fn merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_owned());
        self
    }
}

#[derive(Default)]
pub(crate) struct WorkbookFixture {
    sheets: Vec<SheetFixture>,
    shared_strings: bool,
}

impl WorkbookFixture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sheet(mut self, sheet: SheetFixture) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Store text through the shared string table instead of inline strings.
    pub(crate) fn with_shared_strings(mut self) -> Self {
        self.shared_strings = true;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut strings = Vec::<String>::new();
        let mut parts = Vec::<(String, String)>::new();

        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut relationships = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );

        for (index, sheet) in self.sheets.iter().enumerate() {
            let id = index + 1;
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{id}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
            workbook.push_str(&format!(r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#, escape(sheet.name.as_str())));
            relationships.push_str(&format!(
                r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{id}.xml"/>"#
            ));
            parts.push((format!("xl/worksheets/sheet{id}.xml"), self.sheet_xml(sheet, &mut strings)));
        }

        if self.shared_strings {
            let id = self.sheets.len() + 1;
            content_types.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
            relationships.push_str(&format!(
                r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#
            ));
            let items: String = strings
                .iter()
                .map(|text| format!("<si><t>{}</t></si>", escape(text.as_str())))
                .collect();
            parts.push((
                "xl/sharedStrings.xml".to_owned(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">{1}</sst>"#,
                    strings.len(),
                    items
                ),
            ));
        }

        content_types.push_str("</Types>");
        workbook.push_str("</sheets></workbook>");
        relationships.push_str("</Relationships>");

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let root_relationships = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
        let mut entries = vec![
            ("[Content_Types].xml".to_owned(), content_types),
            ("_rels/.rels".to_owned(), root_relationships.to_owned()),
            ("xl/workbook.xml".to_owned(), workbook),
            ("xl/_rels/workbook.xml.rels".to_owned(), relationships),
        ];
        entries.extend(parts);
        for (name, content) in entries {
            zip.start_file(name, options).expect("start fixture entry");
            zip.write_all(content.as_bytes()).expect("write fixture entry");
        }
        zip.finish().expect("finish fixture package").into_inner()
    }

    fn sheet_xml(&self, sheet: &SheetFixture, strings: &mut Vec<String>) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (row, cells) in &sheet.cells {
            let first = cells.keys().next().copied().unwrap_or(1);
            let last = cells.keys().last().copied().unwrap_or(1);
            xml.push_str(&format!(r#"<row r="{row}" spans="{first}:{last}">"#));
            for (col, (value, style)) in cells {
                let reference = index_to_reference(row - 1, col - 1);
                let style = style.map(|style| format!(r#" s="{style}""#)).unwrap_or_default();
                let cell = match value {
                    CellValue::Empty => format!(r#"<c r="{reference}"{style}/>"#),
                    CellValue::Bool(value) => format!(r#"<c r="{reference}"{style} t="b"><v>{}</v></c>"#, u8::from(*value)),
                    CellValue::Number(value) => format!(r#"<c r="{reference}"{style}><v>{value}</v></c>"#),
                    CellValue::Text(text) if self.shared_strings => {
                        strings.push(text.to_owned());
                        format!(r#"<c r="{reference}"{style} t="s"><v>{}</v></c>"#, strings.len() - 1)
                    }
                    CellValue::Text(text) => {
                        format!(r#"<c r="{reference}"{style} t="inlineStr"><is><t>{}</t></is></c>"#, escape(text.as_str()))
                    }
                };
                xml.push_str(&cell);
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
        if !sheet.merges.is_empty() {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, sheet.merges.len()));
            for range in &sheet.merges {
                xml.push_str(&format!(r#"<mergeCell ref="{range}"/>"#));
            }
            xml.push_str("</mergeCells>");
        }
        xml.push_str("</worksheet>");
        xml
    }
}
