use crate::error::SovError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::EMPTY_VALUE;
use crate::spreadsheet::patch::patch_package;
use crate::spreadsheet::patch::CellPatches;
use crate::spreadsheet::reference::MAX_COLS;
use crate::spreadsheet::reference::MAX_ROWS;
use crate::spreadsheet::sheet::RawSheet;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use crate::spreadsheet::SpreadsheetError;
use tracing::debug;

/// A destination workbook held in memory with one writable sheet.
///
/// Reads see the template's original values overlaid with pending writes.
/// `save` serializes the package once, consuming the handle.
pub struct TemplateWorkbook {
    data: Vec<u8>,
    sheet_path: String,
    sheet: RawSheet,
    patches: CellPatches,
}

impl TemplateWorkbook {
    /// Opens the template and selects the sheet to write into.
    ///
    /// Fails with `SheetNotFound` (listing the available sheets) when the name does not match exactly.
    pub fn open(data: Vec<u8>, sheet_name: &str) -> Result<TemplateWorkbook, SovError> {
        let (sheet_path, sheet) = {
            let workbook = XlsxWorkbook::open(&data)?;
            let path = workbook
                .sheet_path(sheet_name)
                .ok_or_else(|| SpreadsheetError::SheetNotFound {
                    name: sheet_name.to_owned(),
                    available: workbook.sheet_names(),
                })?
                .to_owned();
            (path, workbook.read_sheet(sheet_name, None)?)
        };
        debug!("Template sheet '{}' at '{}'", sheet_name, sheet_path);
        Ok(TemplateWorkbook {
            data,
            sheet_path,
            sheet,
            patches: CellPatches::new(),
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet.name
    }

    /// The template sheet as originally read, merged ranges included.
    pub fn sheet(&self) -> &RawSheet {
        &self.sheet
    }

    /// Current value at 1-based (row, col), pending writes included.
    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        if let Some(value) = self.patches.get(&row).and_then(|cells| cells.get(&col)) {
            return value;
        }
        match (row.checked_sub(1), col.checked_sub(1)) {
            (Some(row), Some(col)) => self.sheet.get(row, col),
            _ => &EMPTY_VALUE,
        }
    }

    /// Writes a value at 1-based (row, col).
    ///
    /// A target inside a merged range lands on the range's top-left anchor cell.
    /// Returns the 1-based cell actually written.
    pub fn set_value(&mut self, row: usize, col: usize, value: CellValue) -> Result<(usize, usize), SovError> {
        if row == 0 || col == 0 || row > MAX_ROWS || col > MAX_COLS {
            Err(SpreadsheetError::CellOutOfRange { row, col })?;
        }
        let (row, col) = match self.sheet.merge_containing(row - 1, col - 1) {
            Some(range) => {
                let (anchor_row, anchor_col) = range.anchor();
                (anchor_row + 1, anchor_col + 1)
            }
            None => (row, col),
        };
        self.patches.entry(row).or_default().insert(col, value);
        Ok((row, col))
    }

    /// Serializes the workbook with every pending write applied.
    pub fn save(self) -> Result<Vec<u8>, SovError> {
        let cells: usize = self.patches.values().map(|cells| cells.len()).sum();
        debug!("Patching {} cells into '{}'", cells, self.sheet_path);
        patch_package(&self.data, &self.sheet_path, &self.patches)
    }
}
