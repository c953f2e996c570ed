//! # Fincat Common Library
//!
//! Shared code for the fincat workspace:
//! - Common error type and `Result` alias
//! - TOML configuration file loading and atomic write-back
//! - Logging (tracing) initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
