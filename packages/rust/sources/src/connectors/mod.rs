//! Built-in discovery connectors.

mod dataset;
mod directory;
mod org_search;
mod people_search;
mod search_api;

pub use dataset::{Categories, DatasetConnector, DatasetRecord};
pub use directory::{DirectoryCandidate, DirectoryConnector, fill_template, parse_listings};
pub use org_search::OrganizationSearch;
pub use people_search::PeopleSearch;
