//! Header detection and column mapping from arbitrary source layouts onto a template schema.
pub mod derive;
pub mod locator;
pub mod mapper;
pub mod normalize;
pub mod table;
pub mod template;
pub mod writer;

pub use locator::DetectionError;
pub use locator::HeaderLocation;
pub use locator::SynonymGroups;
pub use mapper::ColumnMapper;
pub use mapper::ColumnMapping;
pub use mapper::MappedTable;
pub use mapper::MappingOutcome;
pub use mapper::TargetSchema;
pub use normalize::normalize;
pub use template::HeaderStrategy;
pub use template::ResolvedHeader;
pub use writer::PlacementPolicy;
pub use writer::WriteSummary;
