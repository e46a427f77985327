//! # Spreadsheet Module
//!
//! Reads Office Open XML workbooks (.xlsx, .xlsm) from an in-memory buffer and
//! writes cell values back into a template package without touching any other part.
//!
//! Reading is a streaming `quick-xml` pass over the workbook, styles, shared strings
//! and worksheet parts. Writing patches the worksheet XML of the destination sheet
//! and raw-copies every other entry of the package.
pub(crate) mod cell;
pub(crate) mod excel;
pub(crate) mod patch;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod template;
pub(crate) mod xlsx;

#[cfg(test)]
pub(crate) mod fixture;

pub use cell::CellValue;
pub use sheet::MergedRange;
pub use sheet::RawSheet;
pub use template::TemplateWorkbook;

use thiserror::Error;

/// Errors raised while reading or patching a workbook.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// A required part is missing from the package
    #[error("Missing '{0}' in workbook package")]
    FileError(String),

    /// Legacy or encrypted compound documents are not xlsx packages
    #[error("Workbook is an OLE compound document (password protected or legacy .xls); save it as .xlsx first")]
    CompoundDocument,

    #[error("Workbook contains no worksheets")]
    EmptyWorkbook,

    /// The requested sheet does not exist; the available ones are listed for the operator
    #[error("Sheet '{name}' not found. Sheets available: {}", available.join(", "))]
    SheetNotFound { name: String, available: Vec<String> },

    /// Write target outside the worksheet grid
    #[error("Cell at row {row}, column {col} is outside the worksheet grid")]
    CellOutOfRange { row: usize, col: usize },

    #[error("Worksheet part '{0}' has no sheetData element")]
    MissingSheetData(String),
}
