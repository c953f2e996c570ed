//! Run orchestration

pub mod orchestrator;

pub use orchestrator::{Engine, PageFailure, RunReport};
