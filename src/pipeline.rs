//! One build: detect the source layout, map its records and write them into the template.
use crate::config::RunOptions;
use crate::error::ResultMessage;
use crate::error::SovError;
use crate::mapping::locator::locate;
use crate::mapping::table::SourceTable;
use crate::mapping::template::resolve;
use crate::mapping::template::FieldMatch;
use crate::mapping::writer::write;
use crate::mapping::writer::PlacementPolicy;
use crate::mapping::writer::WriteSummary;
use crate::profile::TemplateProfile;
use crate::spreadsheet::template::TemplateWorkbook;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

/// Diagnostics collected during a build.
#[derive(Clone, Debug, Default)]
pub struct BuildReport {
    pub profile: String,
    pub source_sheet: String,
    /// 0-based header row of the source sheet
    pub source_header_row_index: usize,
    pub combined_column: Option<String>,
    pub sprinkler_column: Option<String>,
    pub rows_dropped: usize,
    pub template_sheet: String,
    /// 1-based header row of the template sheet
    pub template_header_row: usize,
    pub raw_headers: Vec<(usize, String)>,
    pub field_matches: Vec<FieldMatch>,
    pub unmatched: Vec<String>,
    pub summary: WriteSummary,
    pub warnings: Vec<String>,
}

impl Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Profile: {}", self.profile)?;
        writeln!(
            f,
            "Source: sheet '{}', header row {}",
            self.source_sheet,
            self.source_header_row_index + 1
        )?;
        match &self.combined_column {
            Some(column) => writeln!(f, "Split combined column '{}' into City / State / Zip", column)?,
            None => writeln!(f, "No combined 'City, State, Zip' column detected")?,
        }
        if let Some(column) = &self.sprinkler_column {
            writeln!(f, "Sprinkler fields from '{}'", column)?;
        }
        writeln!(f, "Rows dropped without a street: {}", self.rows_dropped)?;
        writeln!(f, "Template: sheet '{}', header row {}", self.template_sheet, self.template_header_row)?;
        writeln!(f, "Template header match report:")?;
        for field in &self.field_matches {
            match field.column {
                Some(column) => writeln!(f, "  {:<40} {:<40} {}", field.label, field.key, column)?,
                None => writeln!(f, "  {:<40} {:<40} NOT FOUND", field.label, field.key)?,
            }
        }
        if !self.unmatched.is_empty() {
            writeln!(f, "Targets not found in template header: {}", self.unmatched.join(", "))?;
        }
        writeln!(
            f,
            "Writing started at row {}. Rows written: {}, skipped: {}",
            self.summary.start_row, self.summary.written, self.summary.skipped
        )?;
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}

/// A finished destination workbook.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub report: BuildReport,
}

/// Maps a source workbook into a destination template.
///
/// # Arguments
/// * `source` - Source workbook bytes
/// * `template` - Destination template bytes, consumed
/// * `profile` - Schema, alias table and layout of the template
/// * `options` - Run options; a failed secondary save only adds a warning
///
/// # Returns
/// The serialized workbook, its file name and the build report.
pub fn build(
    source: &[u8],
    template: Vec<u8>,
    profile: &TemplateProfile,
    options: &RunOptions,
) -> Result<BuildOutput, SovError> {
    options.validate()?;
    let mut report = BuildReport {
        profile: profile.name.to_owned(),
        ..Default::default()
    };

    let workbook = XlsxWorkbook::open(source).with_prefix("Source workbook")?;
    let location = locate(&workbook, &profile.synonym_groups(), profile.detection.search_rows)?;
    let sheet = workbook.read_sheet(&location.sheet_name, None)?;
    let table = SourceTable::from_sheet(&sheet, location.header_row_index);
    info!("Source columns: {:?}", table.headers().collect::<Vec<_>>());
    let outcome = profile.column_mapper().map(table);
    report.source_sheet = location.sheet_name;
    report.source_header_row_index = location.header_row_index;
    report.combined_column = outcome.combined_column;
    report.sprinkler_column = outcome.sprinkler_column;
    report.rows_dropped = outcome.rows_dropped;

    let sheet_name = options.sheet.as_deref().unwrap_or(&profile.sheet);
    let mut destination = TemplateWorkbook::open(template, sheet_name)?;
    let header = resolve(destination.sheet(), &profile.header, &profile.schema);
    report.template_sheet = destination.sheet_name().to_owned();
    report.template_header_row = header.header_row;
    report.field_matches = header.field_matches(&profile.schema);
    report.unmatched = header.unmatched(&profile.schema);
    report.raw_headers = header.raw_headers.clone();

    let policy = if options.append {
        PlacementPolicy::AppendAtFirstEmpty {
            baseline: header.header_row + 1,
        }
    } else {
        PlacementPolicy::FixedStart {
            row: options.start_row.unwrap_or(profile.default_start_row),
        }
    };
    report.summary = write(&mut destination, &header, &outcome.table, policy, &profile.fields)?;
    let bytes = destination.save()?;

    let named = options.named_insured.as_deref().map(str::trim).unwrap_or("");
    if named.is_empty() {
        report.warnings.push("No named insured given; the output uses a generic file name".to_owned());
    }
    let file_name = profile.output_file_name(options.named_insured.as_deref());

    if let Some(path) = &options.save_to {
        match persist(&bytes, path, &file_name) {
            Ok(saved) => info!("Saved a copy to '{}'", saved.display()),
            Err(error) => {
                warn!("Could not save a copy to '{}': {}", path.display(), error);
                report.warnings.push(format!("Could not save a copy to '{}': {}", path.display(), error));
            }
        }
    }

    Ok(BuildOutput {
        bytes,
        file_name,
        report,
    })
}

/// Writes the workbook to a path; a directory receives `file_name`.
pub fn persist(bytes: &[u8], path: &Path, file_name: &str) -> Result<PathBuf, SovError> {
    let target = if path.is_dir() {
        path.join(file_name)
    } else {
        path.to_path_buf()
    };
    std::fs::write(&target, bytes)
        .map_err(SovError::from)
        .with_prefix(&target.display().to_string())?;
    Ok(target)
}
