use crate::mapping::derive::address_number;
use crate::mapping::derive::format_zip;
use crate::mapping::derive::split_location;
use crate::mapping::derive::state_code;
use crate::mapping::derive::LocationSplitter;
use crate::mapping::derive::Sprinkler;
use crate::mapping::normalize::normalize;
use crate::mapping::table::SourceTable;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::EMPTY_VALUE;
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::debug;
use tracing::info;

/// Ordered canonical field labels of a destination template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TargetSchema {
    fields: Vec<String>,
}

impl TargetSchema {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TargetSchema {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.fields.iter().position(|field| field == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.position(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One declared source alias and the field it feeds.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MappingEntry {
    pub source: String,
    pub target: String,
}

/// Normalized source alias -> target field, in declaration order.
///
/// Declaring a key twice keeps its first position and its last target.
#[derive(Clone, Debug, Default)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new<'a>(entries: impl IntoIterator<Item = &'a MappingEntry>) -> Self {
        let mut mapping = ColumnMapping::default();
        let mut positions = HashMap::<String, usize>::new();
        for entry in entries {
            let key = normalize(&entry.source);
            if key.is_empty() {
                continue;
            }
            match positions.get(&key) {
                Some(position) => mapping.entries[*position].1 = entry.target.to_owned(),
                None => {
                    positions.insert(key.clone(), mapping.entries.len());
                    mapping.entries.push((key, entry.target.to_owned()));
                }
            }
        }
        mapping
    }

    /// Entries as (normalized key, target) in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(key, target)| (key.as_str(), target.as_str()))
    }

    pub fn target_of(&self, label: &str) -> Option<&str> {
        let key = normalize(label);
        self.entries
            .iter()
            .find(|(source, _)| *source == key)
            .map(|(_, target)| target.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Schema fields with a fixed meaning to the mapper and writer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FieldRoles {
    /// Primary address field; also drives append placement
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Yes/no and percentage fields fed from a sprinkler column.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SprinklerFields {
    pub yes_no: String,
    pub percent: String,
    /// Lowercase fragments identifying a sprinkler header
    #[serde(default = "default_sprinkler_markers")]
    pub markers: Vec<String>,
}

fn default_sprinkler_markers() -> Vec<String> {
    vec!["sprink".to_owned(), "sprnkl".to_owned()]
}

/// Optional passes run after static relabeling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Derivations {
    /// Split a combined "City, State, Zip" source column
    pub split_combined_location: bool,
    /// Field filled with the street number when no source column feeds it
    pub address_number: Option<String>,
    /// Reduce the state field to a 2 letter uppercase code
    pub state_code: bool,
    /// Rewrite the zip field as 5 digit or ZIP+4 text
    pub zip_format: bool,
    pub sprinkler: Option<SprinklerFields>,
}

/// Records in target schema order, stored column by column.
#[derive(Clone, Debug, PartialEq)]
pub struct MappedTable {
    schema: TargetSchema,
    columns: Vec<Vec<CellValue>>,
    rows: usize,
}

/// One row of a `MappedTable`, exposing every schema field.
#[derive(Copy, Clone, Debug)]
pub struct MappedRecord<'a> {
    table: &'a MappedTable,
    row: usize,
}

impl MappedTable {
    /// An all-empty table with `rows` records.
    pub fn new(schema: &TargetSchema, rows: usize) -> Self {
        MappedTable {
            schema: schema.clone(),
            columns: vec![vec![CellValue::Empty; rows]; schema.len()],
            rows,
        }
    }

    pub fn schema(&self) -> &TargetSchema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column(&self, label: &str) -> Option<&[CellValue]> {
        self.schema.position(label).map(|index| self.columns[index].as_slice())
    }

    /// Replaces a field's values, padded or truncated to the table height.
    /// Returns false when the label is not in the schema.
    pub fn set_column(&mut self, label: &str, mut values: Vec<CellValue>) -> bool {
        let Some(index) = self.schema.position(label) else {
            return false;
        };
        values.resize(self.rows, CellValue::Empty);
        self.columns[index] = values;
        true
    }

    /// Rewrites every value of a field in place.
    pub fn update_column(&mut self, label: &str, update: impl Fn(&CellValue) -> CellValue) {
        if let Some(index) = self.schema.position(label) {
            for value in self.columns[index].iter_mut() {
                *value = update(value);
            }
        }
    }

    pub fn record(&self, row: usize) -> MappedRecord<'_> {
        MappedRecord { table: self, row }
    }

    pub fn records(&self) -> impl Iterator<Item = MappedRecord<'_>> {
        (0..self.rows).map(|row| self.record(row))
    }
}

impl<'a> MappedRecord<'a> {
    /// Value of a field; labels outside the schema read as empty.
    pub fn get(&self, label: &str) -> &'a CellValue {
        match self.table.schema.position(label) {
            Some(index) => &self.table.columns[index][self.row],
            None => &EMPTY_VALUE,
        }
    }

    /// Every schema field with its value, in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a CellValue)> + 'a {
        let table = self.table;
        let row = self.row;
        table
            .schema
            .fields()
            .iter()
            .zip(table.columns.iter())
            .map(move |(label, values)| (label.as_str(), &values[row]))
    }
}

/// Result of mapping a source table.
#[derive(Clone, Debug)]
pub struct MappingOutcome {
    pub table: MappedTable,
    /// Header of the combined "City, State, Zip" column that was split
    pub combined_column: Option<String>,
    /// Header of the column the sprinkler fields came from
    pub sprinkler_column: Option<String>,
    /// Source rows dropped for having no street
    pub rows_dropped: usize,
}

/// Maps source records onto a target schema.
#[derive(Clone, Debug)]
pub struct ColumnMapper {
    pub schema: TargetSchema,
    pub mapping: ColumnMapping,
    pub roles: FieldRoles,
    pub derivations: Derivations,
    /// Normalized headers that identify the source street column
    pub street_aliases: HashSet<String>,
    pub splitter: LocationSplitter,
}

impl ColumnMapper {
    /// Runs every mapping pass over the source table.
    ///
    /// Passes run in order: combined location split, street row filter, static relabeling,
    /// address number, state code, zip format, sprinkler classification.
    pub fn map(&self, mut source: SourceTable) -> MappingOutcome {
        let combined_column = if self.derivations.split_combined_location {
            self.split_combined_location(&mut source)
        } else {
            None
        };
        let rows_dropped = self.drop_rows_without_street(&mut source);

        let mut table = MappedTable::new(&self.schema, source.row_count());
        self.relabel(&source, &mut table);

        if let Some(field) = &self.derivations.address_number {
            derive_address_numbers(&mut table, field, &self.roles.street);
        }
        if self.derivations.state_code {
            table.update_column(&self.roles.state, state_code);
        }
        if self.derivations.zip_format {
            table.update_column(&self.roles.zip, format_zip);
        }
        let sprinkler_column = self
            .derivations
            .sprinkler
            .as_ref()
            .and_then(|fields| classify_sprinklers(&source, &mut table, fields));

        info!("Mapped {} records ({} dropped without a street)", table.row_count(), rows_dropped);
        MappingOutcome {
            table,
            combined_column,
            sprinkler_column,
            rows_dropped,
        }
    }

    /// Splits a combined location column, backfilling only blank city, state and zip cells.
    fn split_combined_location(&self, source: &mut SourceTable) -> Option<String> {
        let combined = self.splitter.detect(source)?;
        let header = source.column(combined).header.to_owned();
        let parts: Vec<_> = source.column(combined).values.iter().map(split_location).collect();

        let targets = [("City", "city"), ("State", "state"), ("Zip", "zip")];
        for (part, (label, key)) in targets.iter().enumerate() {
            let split: Vec<CellValue> = parts
                .iter()
                .map(|location| match (location, part) {
                    (Some(location), 0) => CellValue::from(location.city.as_str()),
                    (Some(location), 1) => CellValue::from(location.state.as_str()),
                    (Some(location), _) => CellValue::from(location.zip.as_str()),
                    (None, _) => CellValue::Empty,
                })
                .collect();
            match source.column_by_key(key) {
                Some(index) => {
                    for (value, split) in source.values_mut(index).iter_mut().zip(split) {
                        if value.is_blank() && split != CellValue::Empty {
                            *value = split;
                        }
                    }
                }
                None => {
                    source.push_column(label, split);
                }
            }
        }
        info!("Split combined column '{}' into City / State / Zip", header);
        Some(header)
    }

    /// Drops rows with a blank street. Returns the number of rows dropped.
    fn drop_rows_without_street(&self, source: &mut SourceTable) -> usize {
        let Some(street) = source.position(|header| self.street_aliases.contains(&normalize(header))) else {
            debug!("No street column in source; keeping every row");
            return 0;
        };
        let keep: Vec<bool> = source.column(street).values.iter().map(|value| !value.is_blank()).collect();
        let before = source.row_count();
        source.retain_rows(&keep);
        before - source.row_count()
    }

    /// Copies source columns into their target fields in mapping order; later entries win.
    /// Among source columns sharing a normalized header, the rightmost one is read.
    fn relabel(&self, source: &SourceTable, table: &mut MappedTable) {
        for (key, target) in self.mapping.entries() {
            if !self.schema.contains(target) {
                continue;
            }
            if let Some(index) = source.last_column_by_key(key) {
                debug!("'{}' -> '{}'", source.column(index).header, target);
                table.set_column(target, source.column(index).values.clone());
            }
        }
    }
}

fn derive_address_numbers(table: &mut MappedTable, field: &str, street: &str) {
    let Some(current) = table.column(field) else {
        return;
    };
    if !current.iter().all(CellValue::is_blank) {
        return;
    }
    let numbers: Option<Vec<CellValue>> = table.column(street).map(|values| values.iter().map(address_number).collect());
    if let Some(numbers) = numbers {
        table.set_column(field, numbers);
    }
}

fn classify_sprinklers(source: &SourceTable, table: &mut MappedTable, fields: &SprinklerFields) -> Option<String> {
    let index = source.position(|header| {
        let header = header.trim().to_lowercase();
        fields.markers.iter().any(|marker| header.contains(marker.as_str()))
    })?;
    let column = source.column(index);
    let classes: Vec<Sprinkler> = column.values.iter().map(Sprinkler::classify).collect();
    table.set_column(&fields.yes_no, classes.iter().map(Sprinkler::yes_no).collect());
    table.set_column(&fields.percent, classes.iter().map(Sprinkler::percent).collect());
    debug!("Sprinkler fields from '{}'", column.header);
    Some(column.header.to_owned())
}
