mod checkpoints;
mod devices;
mod pending;
mod repository;
mod schema;
mod stats;

pub use devices::HighRiskKeywordRow;
pub use repository::{RecordFilter, Repository};
pub use stats::{CountryRiskRow, StatsWriteSummary};
