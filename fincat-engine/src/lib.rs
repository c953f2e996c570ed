//! Financial transaction categorization engine
//!
//! Groups canonical transactions by normalized merchant identity,
//! resolves duplicates against prior categorizations, classifies one
//! exemplar per group through an LLM endpoint behind a content-
//! addressed page cache, and routes the results by confidence into
//! auto-apply and needs-review streams.

pub mod config;
pub mod error;
pub mod models;
pub mod review;
pub mod services;
pub mod types;
pub mod utils;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use types::Scope;
pub use workflow::{Engine, RunReport};
