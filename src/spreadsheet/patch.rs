//! Streaming worksheet patcher.
//!
//! Copies a worksheet part event by event, replacing or inserting the `<c>`
//! elements named in the patch set. Everything else in the package is raw-copied.
use crate::error::SovError;
use crate::helpers::reader::WorkbookBytes;
use crate::helpers::xml::element_prefix;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

/// Cell values to write, keyed by 1-based row then 1-based column.
pub(crate) type CellPatches = BTreeMap<usize, BTreeMap<usize, CellValue>>;

/// Rewrites the package with the patched worksheet; every other entry is copied untouched.
pub(crate) fn patch_package(data: &[u8], sheet_path: &str, patches: &CellPatches) -> Result<Vec<u8>, SovError> {
    let mut archive = WorkbookBytes::new(data).archive()?;
    let target = archive
        .entry_name(sheet_path)
        .ok_or_else(|| SpreadsheetError::FileError(sheet_path.to_owned()))?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(data.len())));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        if file.name() == target {
            zip.start_file(target.as_str(), options)?;
            patch_worksheet(BufReader::new(file), &mut zip, sheet_path, patches)?;
        } else {
            zip.raw_copy_file(file)?;
        }
    }
    Ok(zip.finish()?.into_inner())
}

/// Per-row state while copying a row that has pending patches.
struct RowState {
    row: usize,
    pending: BTreeMap<usize, CellValue>,
    next_col: usize,
    prefix: Option<String>,
}

/// Streams one worksheet part from `input` to `output`, applying `patches`.
///
/// Existing cells keep their style index; missing cells and rows are inserted in
/// order. Empty values clear existing cells and never create new ones.
pub(crate) fn patch_worksheet<R: BufRead, W: Write>(
    input: R,
    output: W,
    part_name: &str,
    patches: &CellPatches,
) -> Result<(), SovError> {
    let mut pending = patches.clone();
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(output);

    let mut buffer = Vec::new();
    let mut skip_buffer = Vec::new();
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;
    let mut sheet_prefix = None::<String>;
    let mut row_state = None::<RowState>;
    let mut in_cell = false;
    let mut next_row = 1usize;

    loop {
        let event = reader.read_event_into(&mut buffer)?;
        match event {
            Event::Eof => break,

            Event::Start(ref e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                in_sheet_data = true;
                sheet_prefix = owned_prefix(e);
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => {
                saw_sheet_data = true;
                sheet_prefix = owned_prefix(e);
                if has_writable(&pending) {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e.to_owned()))?;
                    write_pending_rows(&mut writer, &mut pending, usize::MAX, sheet_prefix.as_deref())?;
                    writer.write_event(Event::End(BytesEnd::new(tag)))?;
                } else {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => {
                write_pending_rows(&mut writer, &mut pending, usize::MAX, sheet_prefix.as_deref())?;
                in_sheet_data = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = row_number(e, next_row)?;
                next_row = row + 1;
                in_cell = false;
                write_pending_rows(&mut writer, &mut pending, row, sheet_prefix.as_deref())?;
                match pending.remove(&row) {
                    Some(cells) => {
                        writer.write_event(Event::Start(without_spans(e)))?;
                        row_state = Some(RowState {
                            row,
                            pending: cells,
                            next_col: 1,
                            prefix: owned_prefix(e).or_else(|| sheet_prefix.clone()),
                        });
                    }
                    None => writer.write_event(Event::Start(e.to_owned()))?,
                }
            }
            Event::Empty(ref e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                let row = row_number(e, next_row)?;
                next_row = row + 1;
                write_pending_rows(&mut writer, &mut pending, row, sheet_prefix.as_deref())?;
                match pending.remove(&row) {
                    Some(cells) => {
                        // Expand `<row/>` to hold the inserted cells
                        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        let prefix = owned_prefix(e).or_else(|| sheet_prefix.clone());
                        writer.write_event(Event::Start(without_spans(e)))?;
                        for (col, value) in cells.iter().filter(|(_, value)| **value != CellValue::Empty) {
                            write_cell(&mut writer, prefix.as_deref(), row, *col, None, value)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(tag)))?;
                    }
                    None => writer.write_event(Event::Empty(e.to_owned()))?,
                }
            }
            Event::End(ref e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some(mut state) = row_state.take() {
                    flush_row_cells(&mut writer, &mut state, usize::MAX)?;
                }
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if row_state.is_some() && !in_cell && e.local_name().as_ref() == b"c" => {
                if let Some(state) = row_state.as_mut() {
                    let col = cell_column(e, state.next_col)?;
                    state.next_col = col + 1;
                    flush_row_cells(&mut writer, state, col)?;
                    match state.pending.remove(&col) {
                        Some(value) => {
                            let prefix = owned_prefix(e);
                            let style = cell_style(e)?;
                            write_cell(&mut writer, prefix.as_deref(), state.row, col, style.as_deref(), &value)?;
                            let name = e.name().as_ref().to_vec();
                            reader.read_to_end_into(QName(&name), &mut skip_buffer)?;
                            skip_buffer.clear();
                        }
                        None => {
                            in_cell = true;
                            writer.write_event(Event::Start(e.to_owned()))?;
                        }
                    }
                }
            }
            Event::Empty(ref e) if row_state.is_some() && !in_cell && e.local_name().as_ref() == b"c" => {
                if let Some(state) = row_state.as_mut() {
                    let col = cell_column(e, state.next_col)?;
                    state.next_col = col + 1;
                    flush_row_cells(&mut writer, state, col)?;
                    match state.pending.remove(&col) {
                        Some(value) => {
                            let prefix = owned_prefix(e);
                            let style = cell_style(e)?;
                            write_cell(&mut writer, prefix.as_deref(), state.row, col, style.as_deref(), &value)?;
                        }
                        None => writer.write_event(Event::Empty(e.to_owned()))?,
                    }
                }
            }
            Event::End(ref e) if in_cell && e.local_name().as_ref() == b"c" => {
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }
            // Cells must precede any other row child such as extLst
            Event::Start(ref e) if row_state.is_some() && !in_cell => {
                if let Some(state) = row_state.as_mut() {
                    flush_row_cells(&mut writer, state, usize::MAX)?;
                }
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if row_state.is_some() && !in_cell => {
                if let Some(state) = row_state.as_mut() {
                    flush_row_cells(&mut writer, state, usize::MAX)?;
                }
                writer.write_event(Event::Empty(e.to_owned()))?;
            }

            event => writer.write_event(event.into_owned())?,
        }
        buffer.clear();
    }

    if !saw_sheet_data {
        Err(SpreadsheetError::MissingSheetData(part_name.to_owned()))?;
    }
    Ok(())
}

fn owned_prefix(e: &BytesStart<'_>) -> Option<String> {
    element_prefix(e.name().into_inner())
        .and_then(|prefix| std::str::from_utf8(prefix).ok())
        .map(str::to_owned)
}

fn prefixed(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_owned(),
    }
}

fn has_writable(pending: &CellPatches) -> bool {
    pending
        .values()
        .any(|cells| cells.values().any(|value| *value != CellValue::Empty))
}

fn row_number(e: &BytesStart<'_>, default: usize) -> Result<usize, SovError> {
    match e.try_get_attribute("r")? {
        Some(attribute) => Ok(attribute.get_value()?.trim().parse::<usize>()?),
        None => Ok(default),
    }
}

fn cell_column(e: &BytesStart<'_>, default: usize) -> Result<usize, SovError> {
    match e.try_get_attribute("r")? {
        Some(attribute) => {
            let reference = attribute.get_value()?;
            Ok(reference_to_index(&reference).map(|(_, col)| col + 1).unwrap_or(default))
        }
        None => Ok(default),
    }
}

fn cell_style(e: &BytesStart<'_>) -> Result<Option<String>, SovError> {
    match e.try_get_attribute("s")? {
        Some(attribute) => Ok(Some(attribute.get_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Copies the row start tag without `spans`, which would go stale once cells are added.
fn without_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut row = e.to_owned();
    row.clear_attributes();
    for attribute in e.attributes().flatten() {
        if attribute.key.as_ref() != b"spans" {
            row.push_attribute(attribute);
        }
    }
    row.into_owned()
}

/// Writes pending rows numbered below `before` (all rows for `usize::MAX`).
fn write_pending_rows<W: Write>(
    writer: &mut Writer<W>,
    pending: &mut CellPatches,
    before: usize,
    prefix: Option<&str>,
) -> Result<(), SovError> {
    while let Some(row) = pending.keys().next().copied().filter(|row| *row < before) {
        let cells = pending.remove(&row).unwrap_or_default();
        let cells: Vec<_> = cells.into_iter().filter(|(_, value)| *value != CellValue::Empty).collect();
        if cells.is_empty() {
            continue;
        }
        let tag = prefixed(prefix, "row");
        let mut start = BytesStart::new(tag.as_str());
        start.push_attribute(("r", row.to_string().as_str()));
        writer.write_event(Event::Start(start))?;
        for (col, value) in &cells {
            write_cell(writer, prefix, row, *col, None, value)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    }
    Ok(())
}

/// Writes the row's pending cells with columns below `before`.
fn flush_row_cells<W: Write>(writer: &mut Writer<W>, state: &mut RowState, before: usize) -> Result<(), SovError> {
    while let Some(col) = state.pending.keys().next().copied().filter(|col| *col < before) {
        if let Some(value) = state.pending.remove(&col) {
            if value != CellValue::Empty {
                write_cell(writer, state.prefix.as_deref(), state.row, col, None, &value)?;
            }
        }
    }
    Ok(())
}

fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    row: usize,
    col: usize,
    style: Option<&str>,
    value: &CellValue,
) -> Result<(), SovError> {
    let tag = prefixed(prefix, "c");
    let reference = index_to_reference(row - 1, col - 1);
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = style {
        start.push_attribute(("s", style));
    }

    match value {
        CellValue::Empty => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        CellValue::Bool(value) => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, prefix, "v", if *value { "1" } else { "0" }, false)?;
        }
        CellValue::Number(value) if value.is_finite() => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, prefix, "v", &value.to_string(), false)?;
        }
        CellValue::Number(value) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            write_inline_string(writer, prefix, &value.to_string())?;
        }
        CellValue::Text(text) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            write_inline_string(writer, prefix, text)?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

fn write_inline_string<W: Write>(writer: &mut Writer<W>, prefix: Option<&str>, text: &str) -> Result<(), SovError> {
    let tag = prefixed(prefix, "is");
    writer.write_event(Event::Start(BytesStart::new(tag.as_str())))?;
    let preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) || text.contains('\n');
    write_text_element(writer, prefix, "t", text, preserve)?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    local: &str,
    text: &str,
    preserve_space: bool,
) -> Result<(), SovError> {
    let tag = prefixed(prefix, local);
    let mut start = BytesStart::new(tag.as_str());
    if preserve_space {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(xml: &str, patches: &CellPatches) -> String {
        let mut output = Vec::new();
        patch_worksheet(xml.as_bytes(), &mut output, "sheet1.xml", patches).unwrap();
        String::from_utf8(output).unwrap()
    }

    fn patches(cells: &[(usize, usize, CellValue)]) -> CellPatches {
        let mut patches = CellPatches::new();
        for (row, col, value) in cells {
            patches.entry(*row).or_default().insert(*col, value.clone());
        }
        patches
    }

    #[test]
    fn replace_existing_cell_keeps_style() {
        let xml = r#"<worksheet><sheetData><row r="3" spans="1:2"><c r="A3" s="4" t="s"><v>7</v></c><c r="B3"><v>1</v></c></row></sheetData></worksheet>"#;
        let output = patch(xml, &patches(&[(3, 1, CellValue::from("12 Main St"))]));
        assert_eq!(
            output,
            r#"<worksheet><sheetData><row r="3"><c r="A3" s="4" t="inlineStr"><is><t>12 Main St</t></is></c><c r="B3"><v>1</v></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn insert_cells_and_rows_in_order() {
        let xml = r#"<worksheet><sheetData><row r="2"><c r="B2"><v>1</v></c></row><row r="5"/></sheetData></worksheet>"#;
        let output = patch(
            xml,
            &patches(&[
                (2, 1, CellValue::Number(10.0)),
                (2, 3, CellValue::Bool(true)),
                (3, 2, CellValue::from("x")),
                (5, 1, CellValue::Number(2.5)),
                (7, 1, CellValue::from("tail")),
            ]),
        );
        assert_eq!(
            output,
            concat!(
                r#"<worksheet><sheetData>"#,
                r#"<row r="2"><c r="A2"><v>10</v></c><c r="B2"><v>1</v></c><c r="C2" t="b"><v>1</v></c></row>"#,
                r#"<row r="3"><c r="B3" t="inlineStr"><is><t>x</t></is></c></row>"#,
                r#"<row r="5"><c r="A5"><v>2.5</v></c></row>"#,
                r#"<row r="7"><c r="A7" t="inlineStr"><is><t>tail</t></is></c></row>"#,
                r#"</sheetData></worksheet>"#
            )
        );
    }

    #[test]
    fn empty_values_clear_but_never_create() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1" s="2"><v>5</v></c></row></sheetData></worksheet>"#;
        let output = patch(
            xml,
            &patches(&[(1, 1, CellValue::Empty), (1, 2, CellValue::Empty), (4, 1, CellValue::Empty)]),
        );
        assert_eq!(output, r#"<worksheet><sheetData><row r="1"><c r="A1" s="2"/></row></sheetData></worksheet>"#);
    }

    #[test]
    fn expand_empty_sheet_data_with_prefix() {
        let xml = r#"<x:worksheet xmlns:x="urn:main"><x:sheetData/></x:worksheet>"#;
        let output = patch(xml, &patches(&[(1, 1, CellValue::from(" padded "))]));
        assert_eq!(
            output,
            r#"<x:worksheet xmlns:x="urn:main"><x:sheetData><x:row r="1"><x:c r="A1" t="inlineStr"><x:is><x:t xml:space="preserve"> padded </x:t></x:is></x:c></x:row></x:sheetData></x:worksheet>"#
        );
    }

    #[test]
    fn escape_text() {
        let xml = r#"<worksheet><sheetData></sheetData></worksheet>"#;
        let output = patch(xml, &patches(&[(1, 1, CellValue::from("Machinery & Equip. <M&E>"))]));
        assert!(output.contains("<t>Machinery &amp; Equip. &lt;M&amp;E&gt;</t>"));
    }

    #[test]
    fn missing_sheet_data_is_an_error() {
        let mut output = Vec::new();
        let result = patch_worksheet(&b"<worksheet/>"[..], &mut output, "sheet1.xml", &CellPatches::new());
        assert!(matches!(
            result,
            Err(SovError::SpreadsheetError(SpreadsheetError::MissingSheetData(_)))
        ));
    }
}
