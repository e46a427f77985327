//! Template profiles: the target schema, alias table and layout rules of one carrier template.
use crate::error::ResultMessage;
use crate::error::SovError;
use crate::mapping::derive::LocationSplitter;
use crate::mapping::locator::SynonymGroups;
use crate::mapping::mapper::ColumnMapper;
use crate::mapping::mapper::ColumnMapping;
use crate::mapping::mapper::Derivations;
use crate::mapping::mapper::FieldRoles;
use crate::mapping::mapper::MappingEntry;
use crate::mapping::mapper::TargetSchema;
use crate::mapping::normalize::normalize;
use crate::mapping::template::HeaderStrategy;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const CROSSCOVER: &str = include_str!("../../profiles/crosscover.toml");
const AMRISC: &str = include_str!("../../profiles/amrisc.toml");

/// Names of the profiles compiled into the crate.
pub const BUILTIN_PROFILES: [&str; 2] = ["crosscover", "amrisc"];

const DEFAULT_NAMED_INSURED: &str = "Named Insured";

/// Errors in profile selection and content.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Unknown profile '{name}', expected one of {available:?}")]
    UnknownProfile { name: String, available: Vec<String> },

    #[error("Profile '{profile}' has an empty schema")]
    EmptySchema { profile: String },

    #[error("Profile '{profile}' uses field '{field}' which is not in its schema")]
    UnknownField { profile: String, field: String },

    #[error("Profile '{profile}' needs at least one detection group and min_groups between 1 and {groups}")]
    InvalidDetection { profile: String, groups: usize },
}

fn default_street_aliases() -> Vec<String> {
    ["street", "streetaddress", "address"].iter().map(|alias| alias.to_string()).collect()
}

fn default_min_groups() -> usize {
    3
}

fn default_search_rows() -> usize {
    40
}

/// How a source header row is recognised.
#[derive(Clone, Debug, Deserialize)]
pub struct DetectionSettings {
    #[serde(default = "default_min_groups")]
    pub min_groups: usize,
    #[serde(default = "default_search_rows")]
    pub search_rows: usize,
    pub groups: Vec<Vec<String>>,
}

/// Everything the engine needs to know about one destination template.
#[derive(Clone, Debug, Deserialize)]
pub struct TemplateProfile {
    pub name: String,
    /// Output file names read "{named insured} - {output_suffix}.xlsx"
    pub output_suffix: String,
    /// Destination sheet
    pub sheet: String,
    /// Fixed start row used when not appending
    pub default_start_row: usize,
    /// Source headers identifying the street column used to drop empty rows
    #[serde(default = "default_street_aliases")]
    pub street_aliases: Vec<String>,
    pub schema: TargetSchema,
    pub header: HeaderStrategy,
    pub detection: DetectionSettings,
    pub fields: FieldRoles,
    #[serde(default)]
    pub derivations: Derivations,
    #[serde(default)]
    pub mapping: Vec<MappingEntry>,
}

impl TemplateProfile {
    /// Looks up a built-in profile by case-insensitive name.
    pub fn builtin(name: &str) -> Result<TemplateProfile, SovError> {
        let source = match name.trim().to_ascii_lowercase().as_str() {
            "crosscover" | "cc" => CROSSCOVER,
            "amrisc" => AMRISC,
            _ => Err(ProfileError::UnknownProfile {
                name: name.to_owned(),
                available: BUILTIN_PROFILES.iter().map(|name| name.to_string()).collect(),
            })?,
        };
        Self::from_toml(source).with_prefix(name)
    }

    /// Parses and validates a profile written in TOML.
    pub fn from_toml(source: &str) -> Result<TemplateProfile, SovError> {
        let profile: TemplateProfile = toml::from_str(source)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Reads a profile file.
    pub fn load(path: &Path) -> Result<TemplateProfile, SovError> {
        let prefix = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(SovError::from).with_prefix(&prefix)?;
        Self::from_toml(&source).with_prefix(&prefix)
    }

    /// Checks that every role field is part of the schema.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.schema.is_empty() {
            return Err(ProfileError::EmptySchema {
                profile: self.name.to_owned(),
            });
        }
        let groups = self.detection.groups.len();
        if groups == 0 || self.detection.min_groups == 0 || self.detection.min_groups > groups {
            return Err(ProfileError::InvalidDetection {
                profile: self.name.to_owned(),
                groups,
            });
        }

        let mut fields = vec![&self.fields.street, &self.fields.city, &self.fields.state, &self.fields.zip];
        fields.extend(self.derivations.address_number.iter());
        if let Some(sprinkler) = &self.derivations.sprinkler {
            fields.push(&sprinkler.yes_no);
            fields.push(&sprinkler.percent);
        }
        match fields.into_iter().find(|field| !self.schema.contains(field)) {
            Some(field) => Err(ProfileError::UnknownField {
                profile: self.name.to_owned(),
                field: field.to_owned(),
            }),
            None => Ok(()),
        }
    }

    pub fn synonym_groups(&self) -> SynonymGroups {
        SynonymGroups::new(&self.detection.groups, self.detection.min_groups)
    }

    pub fn column_mapping(&self) -> ColumnMapping {
        ColumnMapping::new(&self.mapping)
    }

    /// A mapper configured with this profile's tables and passes.
    pub fn column_mapper(&self) -> ColumnMapper {
        ColumnMapper {
            schema: self.schema.clone(),
            mapping: self.column_mapping(),
            roles: self.fields.clone(),
            derivations: self.derivations.clone(),
            street_aliases: self.street_aliases.iter().map(|alias| normalize(alias)).collect(),
            splitter: LocationSplitter::default(),
        }
    }

    /// Output file name for a named insured; blank names fall back to a generic label.
    /// Path separators and characters Windows rejects become `_`.
    pub fn output_file_name(&self, named_insured: Option<&str>) -> String {
        let name = named_insured
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_NAMED_INSURED);
        let name: String = name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        format!("{} - {}.xlsx", name, self.output_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_load() -> Result<(), SovError> {
        let crosscover = TemplateProfile::builtin("CrossCover")?;
        assert_eq!(crosscover.sheet, "III. New Locations");
        assert_eq!(crosscover.header, HeaderStrategy::FixedRow { row: 2 });
        assert_eq!(crosscover.detection.search_rows, 40);
        assert_eq!(crosscover.schema.len(), 22);
        assert!(!crosscover.derivations.split_combined_location);

        let amrisc = TemplateProfile::builtin("amrisc")?;
        assert_eq!(amrisc.sheet, "SOV-APP");
        assert_eq!(amrisc.header, HeaderStrategy::BestScore { scan_rows: 100 });
        assert_eq!(amrisc.detection.search_rows, 50);
        assert_eq!(amrisc.schema.len(), 32);
        assert_eq!(amrisc.derivations.address_number.as_deref(), Some("AddressNum"));
        assert!(amrisc.derivations.sprinkler.is_some());
        Ok(())
    }

    #[test]
    fn builtin_mappings() -> Result<(), SovError> {
        let crosscover = TemplateProfile::builtin("crosscover")?.column_mapping();
        assert_eq!(crosscover.target_of("LOCATION / ADDRESS"), Some("Street Address"));
        assert_eq!(crosscover.target_of("Bldg Value"), Some("Building"));
        assert_eq!(crosscover.target_of("Sprinkler (Y/N)"), Some("% Sprinklered"));
        assert_eq!(crosscover.target_of("Roof Year"), Some("Year Roof Replaced"));

        let amrisc = TemplateProfile::builtin("amrisc")?.column_mapping();
        assert_eq!(amrisc.target_of("Zip Code"), Some("*Zip"));
        assert_eq!(amrisc.target_of("Construction Type"), Some("*ISO Const"));
        assert_eq!(amrisc.target_of("EDP"), Some("M&E (Complete M&E Tech Summary Sheet)"));
        Ok(())
    }

    #[test]
    fn unknown_profile() {
        match TemplateProfile::builtin("lloyds") {
            Err(SovError::ProfileError(ProfileError::UnknownProfile { available, .. })) => {
                assert_eq!(available, vec!["crosscover".to_owned(), "amrisc".to_owned()]);
            }
            other => panic!("unexpected result {:?}", other.map(|profile| profile.name)),
        }
    }

    #[test]
    fn role_fields_must_be_in_schema() {
        let source = r#"
            name = "broken"
            output_suffix = "Broken SOV"
            sheet = "Sheet1"
            default_start_row = 2
            schema = ["Address", "City", "State"]

            [header]
            strategy = "fixed_row"
            row = 1

            [detection]
            groups = [["address"], ["city"], ["state"]]

            [fields]
            street = "Address"
            city = "City"
            state = "State"
            zip = "Zip"
        "#;
        match TemplateProfile::from_toml(source) {
            Err(SovError::ProfileError(ProfileError::UnknownField { field, .. })) => assert_eq!(field, "Zip"),
            other => panic!("unexpected result {:?}", other.map(|profile| profile.name)),
        }
    }

    #[test]
    fn file_names() -> Result<(), SovError> {
        let profile = TemplateProfile::builtin("amrisc")?;
        assert_eq!(profile.output_file_name(Some(" Acme LLC ")), "Acme LLC - Amrisc SOV.xlsx");
        assert_eq!(profile.output_file_name(Some("  ")), "Named Insured - Amrisc SOV.xlsx");
        assert_eq!(profile.output_file_name(None), "Named Insured - Amrisc SOV.xlsx");
        assert_eq!(profile.output_file_name(Some("A/B: Co")), "A_B_ Co - Amrisc SOV.xlsx");
        Ok(())
    }
}
