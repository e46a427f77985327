use crate::mapping::locator::row_tokens;
use crate::mapping::normalize::normalize;
use crate::mapping::normalize::normalize_value;
use crate::mapping::mapper::TargetSchema;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::RawSheet;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use tracing::warn;

/// How the header row of a destination template is found.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum HeaderStrategy {
    /// The header is always the given 1-based row.
    FixedRow { row: usize },
    /// The row within `1..=scan_rows` containing the most schema labels.
    BestScore { scan_rows: usize },
}

/// Normalized header alias -> 1-based column. The first column registered for a key keeps it.
#[derive(Clone, Debug, Default)]
pub struct AliasIndex {
    columns: HashMap<String, usize>,
}

impl AliasIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a normalized key. Returns false when the key is empty or already taken.
    pub fn register(&mut self, key: String, column: usize) -> bool {
        if key.is_empty() || self.columns.contains_key(&key) {
            return false;
        }
        self.columns.insert(key, column);
        true
    }

    /// Column for a label, normalizing it first.
    pub fn column_of(&self, label: &str) -> Option<usize> {
        self.columns.get(&normalize(label)).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One line of the header match report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMatch {
    pub label: String,
    pub key: String,
    pub column: Option<usize>,
}

/// The resolved header of a destination sheet.
#[derive(Clone, Debug)]
pub struct ResolvedHeader {
    /// 1-based header row
    pub header_row: usize,
    pub aliases: AliasIndex,
    /// Display text of the non-empty header cells with their 1-based column
    pub raw_headers: Vec<(usize, String)>,
}

impl ResolvedHeader {
    pub fn column_of(&self, label: &str) -> Option<usize> {
        self.aliases.column_of(label)
    }

    /// Match status for every schema field, in schema order.
    pub fn field_matches(&self, schema: &TargetSchema) -> Vec<FieldMatch> {
        schema
            .fields()
            .iter()
            .map(|label| FieldMatch {
                label: label.to_owned(),
                key: normalize(label),
                column: self.column_of(label),
            })
            .collect()
    }

    /// Schema fields with no column in the template.
    pub fn unmatched(&self, schema: &TargetSchema) -> Vec<String> {
        schema
            .fields()
            .iter()
            .filter(|label| self.column_of(label).is_none())
            .cloned()
            .collect()
    }
}

/// Text variants a header cell is known by.
/// Wrapped headers register as a whole and line by line.
fn header_variants(text: &str) -> Vec<&str> {
    let mut variants = vec![text];
    let lines: Vec<&str> = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() > 1 {
        variants.extend(lines);
    }
    variants
}

/// Builds the alias index for a 1-based header row.
pub fn build_alias_index(sheet: &RawSheet, header_row: usize) -> (AliasIndex, Vec<(usize, String)>) {
    let mut aliases = AliasIndex::new();
    let mut raw_headers = Vec::new();
    let cells = header_row.checked_sub(1).map(|index| sheet.row(index)).unwrap_or(&[]);
    for (index, cell) in cells.iter().enumerate() {
        let column = index + 1;
        match cell {
            CellValue::Empty => continue,
            CellValue::Text(text) => {
                for variant in header_variants(text) {
                    aliases.register(normalize(variant), column);
                }
            }
            other => {
                aliases.register(normalize_value(other), column);
            }
        }
        raw_headers.push((column, cell.to_string()));
    }
    (aliases, raw_headers)
}

/// Picks the row in `1..=scan_rows` with the most schema labels; ties keep the earliest row.
/// Falls back to row 1 when nothing matches.
pub fn best_header_row(sheet: &RawSheet, scan_rows: usize, schema: &TargetSchema) -> usize {
    let keys: Vec<String> = schema.fields().iter().map(|label| normalize(label)).collect();
    let mut best_row = 1;
    let mut best_score = 0;
    for row in 1..=scan_rows.min(sheet.height()) {
        let tokens = row_tokens(sheet.row(row - 1));
        let score = keys.iter().filter(|key| tokens.contains(*key)).count();
        if score > best_score {
            best_row = row;
            best_score = score;
        }
    }
    debug!("Best template header row {} with {} labels", best_row, best_score);
    best_row
}

/// Resolves the header row and alias index of a template sheet.
///
/// # Arguments
/// * `sheet` - The destination sheet as read from the template
/// * `strategy` - Where to look for the header
/// * `schema` - Target labels used for scoring and the match report
pub fn resolve(sheet: &RawSheet, strategy: &HeaderStrategy, schema: &TargetSchema) -> ResolvedHeader {
    let header_row = match strategy {
        HeaderStrategy::FixedRow { row } => (*row).max(1),
        HeaderStrategy::BestScore { scan_rows } => best_header_row(sheet, *scan_rows, schema),
    };
    let (aliases, raw_headers) = build_alias_index(sheet, header_row);
    let header = ResolvedHeader {
        header_row,
        aliases,
        raw_headers,
    };
    let unmatched = header.unmatched(schema);
    if !unmatched.is_empty() {
        warn!("Template header row {} has no column for {:?}", header_row, unmatched);
    }
    header
}
