//! Centralized tracing initialization
//!
//! Library crates only emit `tracing` events; binaries call
//! [`init_tracing`] exactly once at startup. The filter honors
//! `FINCAT_LOG` (falling back to `RUST_LOG`, then the provided
//! default directive).

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let filter = std::env::var("FINCAT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_directive.to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .finish();

    // Ignore the error if a subscriber is already installed (tests).
    let _ = tracing::subscriber::set_global_default(subscriber);
}
