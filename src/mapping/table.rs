use crate::mapping::normalize::normalize;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::RawSheet;

/// A labelled column of source data.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceColumn {
    pub header: String,
    pub values: Vec<CellValue>,
}

/// Source records below a located header, stored column by column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceTable {
    columns: Vec<SourceColumn>,
    rows: usize,
}

impl SourceTable {
    /// Builds a table from a sheet, using the 0-based `header_index` row as labels.
    /// Rows with no value at all are dropped.
    pub fn from_sheet(sheet: &RawSheet, header_index: usize) -> Self {
        let width = sheet.width();
        let mut columns: Vec<SourceColumn> = (0..width)
            .map(|col| SourceColumn {
                header: sheet.get(header_index, col).to_string().trim().to_owned(),
                values: Vec::new(),
            })
            .collect();

        let mut rows = 0;
        for index in header_index + 1..sheet.height() {
            let cells = sheet.row(index);
            if cells.iter().all(CellValue::is_blank) {
                continue;
            }
            for (col, column) in columns.iter_mut().enumerate() {
                column.values.push(cells.get(col).cloned().unwrap_or_default());
            }
            rows += 1;
        }
        SourceTable { columns, rows }
    }

    /// Builds a table from labelled columns of equal length.
    pub fn from_columns(columns: Vec<SourceColumn>) -> Self {
        let rows = columns.iter().map(|column| column.values.len()).max().unwrap_or(0);
        let mut table = SourceTable { columns: Vec::new(), rows };
        for column in columns {
            table.push_column(&column.header, column.values);
        }
        table
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.header.as_str())
    }

    pub fn column(&self, index: usize) -> &SourceColumn {
        &self.columns[index]
    }

    pub fn values_mut(&mut self, index: usize) -> &mut Vec<CellValue> {
        &mut self.columns[index].values
    }

    /// First column whose header matches the predicate.
    pub fn position(&self, predicate: impl Fn(&str) -> bool) -> Option<usize> {
        self.columns.iter().position(|column| predicate(&column.header))
    }

    /// First column whose normalized header equals the key.
    pub fn column_by_key(&self, key: &str) -> Option<usize> {
        self.position(|header| normalize(header) == key)
    }

    /// Last column whose normalized header equals the key.
    pub fn last_column_by_key(&self, key: &str) -> Option<usize> {
        self.columns.iter().rposition(|column| normalize(&column.header) == key)
    }

    /// Appends a column, padding or truncating its values to the table height.
    pub fn push_column(&mut self, header: &str, mut values: Vec<CellValue>) -> usize {
        values.resize(self.rows, CellValue::Empty);
        self.columns.push(SourceColumn {
            header: header.to_owned(),
            values,
        });
        self.columns.len() - 1
    }

    /// Keeps the rows whose flag is set.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in self.columns.iter_mut() {
            let mut flags = keep.iter();
            column.values.retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.rows = keep.iter().take(self.rows).filter(|flag| **flag).count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> RawSheet {
        let mut sheet = RawSheet::new("Locations");
        sheet.push(0, 0, CellValue::from("Acme Holdings"));
        for (col, header) in ["Loc #", " Address ", "City"].iter().enumerate() {
            sheet.push(2, col, CellValue::from(*header));
        }
        sheet.push(3, 0, CellValue::Number(1.0));
        sheet.push(3, 1, CellValue::from("12 Main St"));
        sheet.push(5, 2, CellValue::from("Boston"));
        sheet.push(6, 3, CellValue::from("stray"));
        sheet
    }

    #[test]
    fn rows_below_header() {
        let table = SourceTable::from_sheet(&sheet(), 2);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.headers().collect::<Vec<_>>(), vec!["Loc #", "Address", "City", ""]);
        assert_eq!(table.column(1).values, vec![CellValue::from("12 Main St"), CellValue::Empty, CellValue::Empty]);
        assert_eq!(table.column(2).values[1], CellValue::from("Boston"));
        assert_eq!(table.column_by_key("address"), Some(1));
        assert_eq!(table.column_by_key("zip"), None);
        assert_eq!(table.last_column_by_key("address"), Some(1));
    }

    #[test]
    fn push_and_retain() {
        let mut table = SourceTable::from_sheet(&sheet(), 2);
        let zip = table.push_column("Zip", vec![CellValue::from("02110")]);
        assert_eq!(table.column(zip).values.len(), 3);

        table.retain_rows(&[true, false, true]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column(zip).values, vec![CellValue::from("02110"), CellValue::Empty]);
        assert_eq!(table.column(3).values, vec![CellValue::Empty, CellValue::from("stray")]);
    }
}
