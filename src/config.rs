//! Run options shared by the library and the command line.
use crate::error::ResultMessage;
use crate::error::SovError;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Errors in run options.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Start row must be 1 or greater")]
    InvalidStartRow,

    #[error("Sheet name must not be blank")]
    BlankSheetName,
}

/// Options for one build. Every field can come from a TOML file and be overridden on the command line.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunOptions {
    /// Built-in profile name
    pub profile: Option<String>,
    /// Label used in the output file name
    pub named_insured: Option<String>,
    /// Destination sheet, overriding the profile's
    pub sheet: Option<String>,
    /// Append below existing rows instead of writing from a fixed row
    pub append: bool,
    /// Fixed start row, overriding the profile's default
    pub start_row: Option<usize>,
    /// Secondary copy of the output; a directory receives the generated file name
    pub save_to: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            profile: None,
            named_insured: None,
            sheet: None,
            append: true,
            start_row: None,
            save_to: None,
        }
    }
}

impl RunOptions {
    /// Reads options from a TOML file.
    pub fn load(path: &Path) -> Result<RunOptions, SovError> {
        let prefix = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(SovError::from).with_prefix(&prefix)?;
        let options: RunOptions = toml::from_str(&source).map_err(SovError::from).with_prefix(&prefix)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_row == Some(0) {
            Err(ConfigError::InvalidStartRow)?;
        }
        if self.sheet.as_deref().map(|sheet| sheet.trim().is_empty()).unwrap_or(false) {
            Err(ConfigError::BlankSheetName)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_append() -> Result<(), toml::de::Error> {
        let options: RunOptions = toml::from_str("named_insured = \"Acme\"")?;
        assert!(options.append);
        assert_eq!(options.named_insured.as_deref(), Some("Acme"));
        assert_eq!(options, RunOptions { named_insured: Some("Acme".to_owned()), ..Default::default() });
        Ok(())
    }

    #[test]
    fn load_from_file() -> Result<(), SovError> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "profile = \"amrisc\"\nappend = false\nstart_row = 7\nsave_to = \"out\"")?;
        let options = RunOptions::load(file.path())?;
        assert_eq!(options.profile.as_deref(), Some("amrisc"));
        assert!(!options.append);
        assert_eq!(options.start_row, Some(7));
        assert_eq!(options.save_to, Some(PathBuf::from("out")));
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        let zero = RunOptions { start_row: Some(0), ..Default::default() };
        assert!(matches!(zero.validate(), Err(ConfigError::InvalidStartRow)));
        let blank = RunOptions { sheet: Some(" ".to_owned()), ..Default::default() };
        assert!(matches!(blank.validate(), Err(ConfigError::BlankSheetName)));
        assert!(RunOptions::default().validate().is_ok());
    }
}
