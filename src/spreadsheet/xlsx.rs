use crate::error::SovError;
use crate::helpers::reader::WorkbookBytes;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::MergedRange;
use crate::spreadsheet::sheet::RawSheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use tracing::debug;
use zip::ZipArchive;

// XML local names for parsing SpreadsheetML parts
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts";       // Custom number formats container
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt";         // Individual custom number format
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs";       // Cell format indexes container
const TAG_FORMAT_INDEX: &[u8] = b"xf";              // Individual cell format index
const TAG_SHARED_STRING_ITEM: &[u8] = b"si";        // Shared string table item
const TAG_PHONETIC_TEXT: &[u8] = b"rPh";            // Phonetic text for Asian languages
const TAG_TEXT: &[u8] = b"t";                       // Text content within strings
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr"; // Workbook properties
const TAG_SHEET: &[u8] = b"sheet";                  // Worksheet definition
const TAG_ROW: &[u8] = b"row";                      // Row in worksheet
const TAG_CELL: &[u8] = b"c";                       // Cell in worksheet
const TAG_INLINE_STRING: &[u8] = b"is";             // Inline string value
const TAG_VALUE: &[u8] = b"v";                      // Cell value content
const TAG_MERGE_CELL: &[u8] = b"mergeCell";         // Merged cell range

/// An xlsx workbook opened over an immutable in-memory buffer.
///
/// Workbook metadata is parsed once; every sheet read opens a fresh archive
/// over the buffer, so scans never share a stream position.
pub(crate) struct XlsxWorkbook<'a> {
    bytes: WorkbookBytes<'a>,
    /// Parsed number formats for cell type detection, indexed by style id
    number_formats: Vec<CellType>,
    /// Worksheets as (name, zip_path) pairs in workbook order
    sheets: Vec<(String, String)>,
    shared_strings: Vec<String>,
}

impl<'a> XlsxWorkbook<'a> {
    /// Opens an xlsx workbook and parses its structure
    ///
    /// # Arguments
    /// * `data` - Complete workbook file contents
    ///
    /// # Returns
    /// The opened workbook, or an error for compound documents, broken packages and workbooks without sheets
    pub(crate) fn open(data: &'a [u8]) -> Result<XlsxWorkbook<'a>, SovError> {
        let bytes = WorkbookBytes::new(data);
        if bytes.is_compound_document() {
            Err(SpreadsheetError::CompoundDocument)?;
        }

        let mut zip = bytes.archive()?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbook)?;
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        debug!("Opened workbook with {} sheets and {} shared strings", sheets.len(), shared_strings.len());

        Ok(XlsxWorkbook {
            bytes,
            number_formats,
            sheets,
            shared_strings,
        })
    }

    /// Sheet names in workbook order
    pub(crate) fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Path of the worksheet part inside the package
    pub(crate) fn sheet_path(&self, name: &str) -> Option<&str> {
        self.sheets
            .iter()
            .find(|(sheet_name, _)| sheet_name == name)
            .map(|(_, path)| path.as_str())
    }

    /// Reads a worksheet into a raw grid
    ///
    /// # Arguments
    /// * `name` - Sheet name, matched exactly
    /// * `row_limit` - Read at most this many leading rows; merged ranges are only collected for full reads
    pub(crate) fn read_sheet(&self, name: &str, row_limit: Option<usize>) -> Result<RawSheet, SovError> {
        let zip_path = self.sheet_path(name).ok_or_else(|| SpreadsheetError::SheetNotFound {
            name: name.to_owned(),
            available: self.sheet_names(),
        })?;

        let mut zip = self.bytes.archive()?;
        let mut reader = zip
            .xml_reader(zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;

        let mut sheet = RawSheet::new(name);
        let mut next_row = 0usize;
        let mut next_col = 0usize;
        let mut cell = None::<Cell>;
        match_xml_events!(reader => {
            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                let row = event
                    .parse_attribute_value::<usize>("r")?
                    .and_then(|row| row.checked_sub(1))
                    .unwrap_or(next_row);
                if row_limit.map(|limit| row >= limit).unwrap_or(false) {
                    break;
                }
                next_row = row + 1;
                next_col = 0;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                let row = next_row.saturating_sub(1);
                let (row, col) = event
                    .get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row, next_col));
                next_col = col + 1;
                let mut kind = event
                    .get_attribute_value("t")?
                    .map(|t| match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    })
                    .unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
                cell = Some(Cell { row, col, kind, value: String::new() });
            }
            Event::Start(event) if cell.is_some() && event.local_name().as_ref() == TAG_INLINE_STRING => {
                let value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
                if let Some(cell) = cell.as_mut() {
                    cell.value = value;
                }
            }
            Event::Start(event) if cell.is_some() && event.local_name().as_ref() == TAG_VALUE => {
                let value = read_string_value(&mut reader, TAG_VALUE, true)?;
                if let Some(cell) = cell.as_mut() {
                    cell.value = value;
                }
            }
            Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
                if let Some(mut cell) = cell.take() {
                    if cell.kind == CellType::SharedString {
                        let index = cell.value.trim().parse::<usize>()?;
                        cell.value = self.shared_strings.get(index).cloned().unwrap_or_default();
                    }
                    sheet.push(cell.row, cell.col, cell.to_value());
                }
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_MERGE_CELL => {
                if let Some(reference) = event.get_attribute_value("ref")? {
                    match MergedRange::try_from(reference.as_ref()) {
                        Ok(range) => sheet.push_merge(range),
                        Err(error) => debug!("Skip merged range in '{}': {}", name, error),
                    }
                }
            }
        });

        debug!("Read sheet '{}': {} rows, {} merged ranges", name, sheet.height(), sheet.merges().len());
        Ok(sheet)
    }
}

/// Loads workbook structure and worksheet information
///
/// Parses workbook.xml for worksheet names and their part paths, and determines
/// the date system (1900 vs 1904) used in the file.
///
/// # Returns
/// Tuple of (worksheets, is_1904_date_system) where worksheets are (name, zip_path) pairs
fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), SovError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.xml".to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event
                .get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads number formats and cell styles from styles.xml
///
/// Custom number formats and cell style indexes decide which numeric cells are dates.
///
/// # Returns
/// Vector of CellType values indexed by style ID
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>, is_1904: bool) -> Result<Vec<CellType>, SovError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();

    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => {
            format_indexes_context = false;
            break;
        }
        Event::Start(event) if format_indexes_context && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_indexes.push(id.map(|id| id.to_string()).unwrap_or_else(|| "0".to_owned()));
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Loads the shared string table; a package without one has no shared strings
fn load_shared_strings<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<String>, SovError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Phonetic annotations are skipped. Rich text runs are concatenated.
///
/// # Arguments
/// * `reader` - XML reader positioned just after the start tag
/// * `end_tag` - Local name of the element that ends the string content
/// * `is_text_content` - Whether bare text counts without a `<t>` wrapper
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: &[u8],
    is_text_content: bool,
) -> Result<String, SovError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
