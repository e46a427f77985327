use crate::error::SovError;
use crate::mapping::mapper::FieldRoles;
use crate::mapping::mapper::MappedRecord;
use crate::mapping::mapper::MappedTable;
use crate::mapping::template::ResolvedHeader;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::template::TemplateWorkbook;
use tracing::debug;
use tracing::info;

/// Where the first mapped record lands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// First empty cell of the street column at or below `baseline`
    AppendAtFirstEmpty { baseline: usize },
    /// The given row, never above the header
    FixedStart { row: usize },
}

/// Counts from one write pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// 1-based row of the first written record
    pub start_row: usize,
    pub written: usize,
    pub skipped: usize,
}

fn is_empty_cell(value: &CellValue) -> bool {
    matches!(value, CellValue::Empty) || value.as_text() == Some("")
}

/// Resolves the 1-based row the first record is written to.
///
/// Both policies start no earlier than one row below the header. Appending walks down the
/// street column until it meets an empty cell; without a street column it starts at the baseline.
pub fn resolve_start_row(
    workbook: &TemplateWorkbook,
    header: &ResolvedHeader,
    policy: PlacementPolicy,
    street: &str,
) -> usize {
    let below_header = header.header_row + 1;
    match policy {
        PlacementPolicy::FixedStart { row } => row.max(below_header),
        PlacementPolicy::AppendAtFirstEmpty { baseline } => {
            let mut row = baseline.max(below_header);
            if let Some(col) = header.column_of(street) {
                while !is_empty_cell(workbook.value(row, col)) {
                    row += 1;
                }
            }
            row
        }
    }
}

/// A record is written when it has a street, or both a city and a state.
pub fn should_write(record: &MappedRecord, roles: &FieldRoles) -> bool {
    let filled = |label: &str| !record.get(label).is_blank();
    filled(&roles.street) || (filled(&roles.city) && filled(&roles.state))
}

/// Writes mapped records into the template below its header.
///
/// # Arguments
/// * `workbook` - Destination template, written in memory
/// * `header` - Resolved header giving each field's column
/// * `table` - Mapped records; fields without a column are not written
/// * `policy` - Where the first record lands
/// * `roles` - Street, city and state fields used for placement and skipping
///
/// # Returns
/// The start row with written and skipped counts. Skipped records do not consume a row.
pub fn write(
    workbook: &mut TemplateWorkbook,
    header: &ResolvedHeader,
    table: &MappedTable,
    policy: PlacementPolicy,
    roles: &FieldRoles,
) -> Result<WriteSummary, SovError> {
    let start_row = resolve_start_row(workbook, header, policy, &roles.street);
    info!("Writing will start at row {}", start_row);

    let columns: Vec<(&str, usize)> = table
        .schema()
        .fields()
        .iter()
        .filter_map(|label| header.column_of(label).map(|col| (label.as_str(), col)))
        .collect();

    let mut summary = WriteSummary {
        start_row,
        ..Default::default()
    };
    for record in table.records() {
        if !should_write(&record, roles) {
            summary.skipped += 1;
            continue;
        }
        let row = start_row + summary.written;
        for (label, col) in &columns {
            let (written_row, written_col) = workbook.set_value(row, *col, record.get(label).clone())?;
            if (written_row, written_col) != (row, *col) {
                debug!("'{}' at ({}, {}) redirected to merged anchor ({}, {})", label, row, col, written_row, written_col);
            }
        }
        summary.written += 1;
    }
    info!("Rows written: {}, skipped: {}", summary.written, summary.skipped);
    Ok(summary)
}
