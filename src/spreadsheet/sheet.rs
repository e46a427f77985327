use crate::error::SovError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::EMPTY_VALUE;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;
use std::sync::LazyLock;

static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?([A-Z]+)\$?(\d+)(?::\$?([A-Z]+)\$?(\d+))?$").expect("Hardcode regex pattern")
});

/// A rectangular merged region. Bounds are 0-based and inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MergedRange {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl MergedRange {
    /// Checks if the 0-based cell lies inside the range.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.first_row..=self.last_row).contains(&row) && (self.first_col..=self.last_col).contains(&col)
    }

    /// The top-left cell, the only writable member of the range.
    pub fn anchor(&self) -> (usize, usize) {
        (self.first_row, self.first_col)
    }
}

impl TryFrom<&str> for MergedRange {
    type Error = SovError;

    /// Parses a merge reference such as "B3:D4" (a single cell "B3" is a 1x1 range).
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim().to_ascii_uppercase();
        let invalid = || SovError::WithContextError(format!("Invalid merged range '{}'", value));
        let captures = RANGE_PATTERN.captures(&value).ok_or_else(invalid)?;
        let first_col = captures.get(1).and_then(|it| col_to_index(it.as_str())).ok_or_else(invalid)?;
        let first_row = captures.get(2).and_then(|it| row_to_index(it.as_str())).ok_or_else(invalid)?;
        let last_col = captures.get(3).and_then(|it| col_to_index(it.as_str())).unwrap_or(first_col);
        let last_row = captures.get(4).and_then(|it| row_to_index(it.as_str())).unwrap_or(first_row);
        Ok(MergedRange {
            first_row: first_row.min(last_row),
            first_col: first_col.min(last_col),
            last_row: first_row.max(last_row),
            last_col: first_col.max(last_col),
        })
    }
}

/// A row-major grid of cell values with no assumed header, plus the sheet's merged ranges.
#[derive(Clone, Debug, Default)]
pub struct RawSheet {
    pub name: String,
    rows: Vec<Vec<CellValue>>,
    merges: Vec<MergedRange>,
}

impl RawSheet {
    pub(crate) fn new(name: &str) -> Self {
        RawSheet {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    /// Stores a value at the 0-based position, growing the grid as needed.
    pub(crate) fn push(&mut self, row: usize, col: usize, value: CellValue) {
        if value == CellValue::Empty {
            return;
        }
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = value;
    }

    pub(crate) fn push_merge(&mut self, range: MergedRange) {
        self.merges.push(range);
    }

    /// Value at the 0-based position; cells outside the grid are empty.
    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&EMPTY_VALUE)
    }

    /// The populated prefix of a 0-based row.
    pub fn row(&self, row: usize) -> &[CellValue] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of rows up to the last populated one.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Widest populated row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn merges(&self) -> &[MergedRange] {
        &self.merges
    }

    /// The merged range covering the 0-based cell, if any.
    pub fn merge_containing(&self, row: usize, col: usize) -> Option<&MergedRange> {
        self.merges.iter().find(|range| range.contains(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_range_parse() -> Result<(), SovError> {
        let range = MergedRange::try_from("b3:D4")?;
        assert_eq!(range, MergedRange { first_row: 2, first_col: 1, last_row: 3, last_col: 3 });
        assert!(range.contains(3, 2));
        assert!(!range.contains(4, 2));
        assert_eq!(range.anchor(), (2, 1));

        let single = MergedRange::try_from("$A$1")?;
        assert_eq!(single.anchor(), (0, 0));
        assert!(MergedRange::try_from("A0:B2").is_err());
        assert!(MergedRange::try_from("1:4").is_err());
        Ok(())
    }

    #[test]
    fn sheet_grid() {
        let mut sheet = RawSheet::new("Data");
        sheet.push(2, 3, CellValue::from("x"));
        sheet.push(0, 0, CellValue::Number(1.0));
        sheet.push(5, 5, CellValue::Empty);

        assert_eq!(sheet.height(), 3);
        assert_eq!(sheet.width(), 4);
        assert_eq!(sheet.get(2, 3), &CellValue::from("x"));
        assert_eq!(sheet.get(1, 0), &CellValue::Empty);
        assert_eq!(sheet.get(99, 99), &CellValue::Empty);
        assert_eq!(sheet.row(0), &[CellValue::Number(1.0)]);
        assert!(sheet.row(10).is_empty());
    }
}
