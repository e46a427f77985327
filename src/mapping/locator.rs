use crate::error::SovError;
use crate::mapping::normalize::normalize;
use crate::mapping::normalize::normalize_value;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;
use tracing::info;

/// Errors raised while looking for the data header of a source workbook.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("No header row with at least {min_groups} address fields found in the first {rows} rows of sheets {sheets:?}")]
    NoHeaderFound {
        sheets: Vec<String>,
        rows: usize,
        min_groups: usize,
    },
}

/// Sets of equivalent header tokens used to recognise a header row.
#[derive(Clone, Debug)]
pub struct SynonymGroups {
    groups: Vec<HashSet<String>>,
    min_groups: usize,
}

impl SynonymGroups {
    /// Builds the groups, normalizing every member.
    ///
    /// # Arguments
    /// * `groups` - Raw member labels per group
    /// * `min_groups` - Number of distinct groups a row must hit to qualify
    pub fn new<S: AsRef<str>>(groups: &[Vec<S>], min_groups: usize) -> Self {
        let groups = groups
            .iter()
            .map(|members| {
                members
                    .iter()
                    .map(|member| normalize(member.as_ref()))
                    .filter(|key| !key.is_empty())
                    .collect()
            })
            .collect();
        SynonymGroups { groups, min_groups }
    }

    pub fn min_groups(&self) -> usize {
        self.min_groups
    }

    /// Number of groups with at least one member among the tokens.
    pub fn score(&self, tokens: &HashSet<String>) -> usize {
        self.groups
            .iter()
            .filter(|group| group.iter().any(|member| tokens.contains(member)))
            .count()
    }

    /// Checks if a row of cells looks like a header.
    pub fn qualifies(&self, row: &[CellValue]) -> bool {
        self.score(&row_tokens(row)) >= self.min_groups
    }
}

/// Where the data header of a source workbook sits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderLocation {
    pub sheet_name: String,
    /// 0-based row index of the header within the sheet
    pub header_row_index: usize,
}

/// Normalized, non-empty keys of a row.
pub(crate) fn row_tokens(row: &[CellValue]) -> HashSet<String> {
    row.iter()
        .map(normalize_value)
        .filter(|key| !key.is_empty())
        .collect()
}

/// Finds the first sheet and row that look like an address header.
///
/// Sheets are visited in workbook order and at most `search_rows` leading rows of each
/// are read. The first qualifying row wins; later rows and sheets are never scanned.
///
/// # Returns
/// The located sheet and 0-based header row, or `DetectionError::NoHeaderFound`.
pub(crate) fn locate(
    workbook: &XlsxWorkbook,
    groups: &SynonymGroups,
    search_rows: usize,
) -> Result<HeaderLocation, SovError> {
    let sheet_names = workbook.sheet_names();
    for sheet_name in &sheet_names {
        let sheet = workbook.read_sheet(sheet_name, Some(search_rows))?;
        let rows = sheet.height().min(search_rows);
        for index in 0..rows {
            let score = groups.score(&row_tokens(sheet.row(index)));
            if score >= groups.min_groups() {
                info!("Header found in sheet '{}' at row {} ({} address fields)", sheet_name, index + 1, score);
                return Ok(HeaderLocation {
                    sheet_name: sheet_name.to_owned(),
                    header_row_index: index,
                });
            }
        }
        debug!("No header in the first {} rows of sheet '{}'", rows, sheet_name);
    }
    Err(DetectionError::NoHeaderFound {
        sheets: sheet_names,
        rows: search_rows,
        min_groups: groups.min_groups(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::fixture::SheetFixture;
    use crate::spreadsheet::fixture::WorkbookFixture;

    fn address_groups() -> SynonymGroups {
        SynonymGroups::new(
            &[
                vec!["Street Address", "street", "address", "street id"],
                vec!["city", "town"],
                vec!["state", "State/Prov", "province"],
                vec!["zip", "zip code", "postal", "postal code"],
            ],
            3,
        )
    }

    #[test]
    fn members_are_normalized() {
        let groups = address_groups();
        let row = [CellValue::from("*STREET ADDRESS"), CellValue::from("Town"), CellValue::from("State / Prov")];
        assert!(groups.qualifies(&row));
        assert_eq!(groups.score(&row_tokens(&row)), 3);
    }

    #[test]
    fn two_groups_do_not_qualify() -> Result<(), SovError> {
        let data = WorkbookFixture::new()
            .sheet(SheetFixture::new("Data").text_row(1, &["Loc", "Street", "City", "Building Value"]))
            .build();
        let workbook = XlsxWorkbook::open(&data)?;
        match locate(&workbook, &address_groups(), 40) {
            Err(SovError::DetectionError(DetectionError::NoHeaderFound { sheets, rows, .. })) => {
                assert_eq!(sheets, vec!["Data".to_owned()]);
                assert_eq!(rows, 40);
            }
            other => panic!("unexpected result {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn first_qualifying_row_wins() -> Result<(), SovError> {
        let data = WorkbookFixture::new()
            .sheet(SheetFixture::new("Cover").text_row(1, &["Statement of Values"]))
            .sheet(
                SheetFixture::new("Locations")
                    .text_row(1, &["Acme Holdings"])
                    .text_row(4, &["#", "Address", "City", "Zip"])
                    .text_row(5, &["1", "12 Main St", "Boston", "02110"])
                    .text_row(7, &["Street", "City", "State", "Zip"]),
            )
            .build();
        let workbook = XlsxWorkbook::open(&data)?;
        let location = locate(&workbook, &address_groups(), 40)?;
        assert_eq!(
            location,
            HeaderLocation {
                sheet_name: "Locations".to_owned(),
                header_row_index: 3,
            }
        );
        Ok(())
    }

    #[test]
    fn rows_past_the_search_window_are_ignored() -> Result<(), SovError> {
        let data = WorkbookFixture::new()
            .sheet(SheetFixture::new("Data").text_row(12, &["Street", "City", "State", "Zip"]))
            .build();
        let workbook = XlsxWorkbook::open(&data)?;
        assert!(locate(&workbook, &address_groups(), 10).is_err());
        assert_eq!(locate(&workbook, &address_groups(), 12)?.header_row_index, 11);
        Ok(())
    }
}
