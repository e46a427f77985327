//! # SOV Builder
//!
//! Normalizes insurance Statement-of-Values spreadsheets from arbitrary client layouts into
//! a fixed carrier template.
//!
//! ## Features
//!
//! - **Header detection**: Finds the data sheet and header row of a source workbook by looking
//!   for street, city, state and zip columns
//! - **Alias normalization**: Folds header labels into canonical keys so `*Street Address`,
//!   `STREET ADDRESS` and `street_address` match
//! - **Column mapping**: Many-to-one synonym tables, combined "City, State, Zip" splitting,
//!   address numbers, state codes, ZIP formatting and sprinkler classification
//! - **Template resolution**: Fixed or best-scoring header rows, wrapped header labels,
//!   a per-field match report
//! - **Placement**: Appends below existing rows or writes from a fixed row; merged cells
//!   receive values at their anchor
//! - **Faithful output**: Only the written cells of the destination sheet change; every other
//!   part of the template package is copied byte for byte
//!
//! ## Profiles
//!
//! Each carrier template is described by a TOML profile. Two are built in:
//!
//! - `crosscover`: sheet `III. New Locations`, header on row 2
//! - `amrisc`: sheet `SOV-APP`, header detected within the first 100 rows
pub mod config;
pub mod error;
mod helpers;
pub mod mapping;
pub mod pipeline;
pub mod profile;
pub mod spreadsheet;

pub use config::RunOptions;
pub use error::SovError;
pub use pipeline::build;
pub use pipeline::BuildOutput;
pub use pipeline::BuildReport;
pub use profile::TemplateProfile;
