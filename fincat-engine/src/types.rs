//! Shared types and collaborator traits
//!
//! The engine talks to the outside world through three seams: a
//! classifier transport (the model endpoint), a persistence store
//! (prior categories and apply-back), and a taxonomy source. Each is a
//! trait so tests run against in-memory fakes with no network or
//! database.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;
use crate::models::{CategorizedRecord, Provenance, TaxonomyEntry};

/// Account scope a run operates within
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub provider: String,
    pub account: String,
}

impl Scope {
    pub fn new(provider: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            account: account.into(),
        }
    }
}

/// Identity of one stored transaction for duplicate lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub external_id: String,
    pub fingerprint: String,
}

/// A previously categorized transaction matching an identity key
#[derive(Debug, Clone)]
pub struct PriorMatch {
    pub category: Option<String>,
    pub verified: bool,
}

/// Fully assembled request handed to the transport
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub model: String,
    pub system_instructions: String,
    pub user_prompt: String,
    /// JSON schema constraining the response shape
    pub response_schema: serde_json::Value,
}

/// Model endpoint seam
///
/// Implementations return the raw response body text; parsing and
/// validation happen upstream so transport fakes stay trivial.
#[async_trait::async_trait]
pub trait ClassifierTransport: Send + Sync {
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError>;
}

/// Prior-category lookup and apply-back seam
#[async_trait::async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Look up prior matches for each identity key within the scope
    ///
    /// Keys with no stored matches may be absent from the returned map.
    async fn lookup_prior_categories(
        &self,
        scope: &Scope,
        keys: &[IdentityKey],
    ) -> anyhow::Result<HashMap<IdentityKey, Vec<PriorMatch>>>;

    /// Apply categorized records back to storage
    ///
    /// When `only_if_unverified` is set, rows a human already verified
    /// are left untouched. Returns the number of rows updated.
    async fn apply_categories(
        &self,
        scope: &Scope,
        records: &[CategorizedRecord],
        provenance: Provenance,
        only_if_unverified: bool,
    ) -> anyhow::Result<usize>;
}

/// Taxonomy lookup seam
#[async_trait::async_trait]
pub trait TaxonomySource: Send + Sync {
    async fn load_taxonomy(&self, scope: &Scope) -> anyhow::Result<Vec<TaxonomyEntry>>;
}

/// Store that holds nothing and applies nothing
///
/// Used by the CLI when running without a backing database: every
/// group is treated as unseen and apply-back is a no-op.
#[derive(Debug, Default, Clone)]
pub struct NullStore;

#[async_trait::async_trait]
impl PersistenceStore for NullStore {
    async fn lookup_prior_categories(
        &self,
        _scope: &Scope,
        _keys: &[IdentityKey],
    ) -> anyhow::Result<HashMap<IdentityKey, Vec<PriorMatch>>> {
        Ok(HashMap::new())
    }

    async fn apply_categories(
        &self,
        _scope: &Scope,
        _records: &[CategorizedRecord],
        _provenance: Provenance,
        _only_if_unverified: bool,
    ) -> anyhow::Result<usize> {
        Ok(0)
    }
}
