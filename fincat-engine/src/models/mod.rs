//! Data models for the categorization engine

pub mod decision;
pub mod record;
pub mod taxonomy;

pub use decision::Decision;
pub use record::{CanonicalRecord, CategorizedRecord, Provenance};
pub use taxonomy::TaxonomyEntry;
