//! Canonical transaction records and categorized results
//!
//! A [`CanonicalRecord`] is a normalized transaction row produced by an
//! upstream import step (CSV normalization is out of scope here). All
//! fields are optional strings to keep the view portable; `amount` is a
//! normalized 2-decimal string and `date` is `YYYY-MM-DD`. Records are
//! immutable once handed to the engine; their position in the input
//! slice is their identity within a run.

use crate::models::Decision;
use serde::{Deserialize, Serialize};

/// A single canonicalized transaction row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Provider-assigned external id, when the export carries one
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Normalized amount string (2 decimals, ASCII dot, leading sign)
    #[serde(default)]
    pub amount: Option<String>,
    /// Normalized date string (YYYY-MM-DD)
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// How a category assignment was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Assigned by the LLM classifier
    Llm,
    /// Prefilled from unanimous prior duplicates
    Rule,
    /// Accepted by a human reviewer
    Manual,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Llm => "llm",
            Provenance::Rule => "rule",
            Provenance::Manual => "manual",
        }
    }
}

/// Terminal engine output for one input record
///
/// Carries the original record, the effective decision details, the
/// record's content fingerprint (so persistence can key idempotent
/// writes), and the provenance of the assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedRecord {
    /// Position of the record in the original input sequence
    pub position: usize,
    pub record: CanonicalRecord,
    /// Content fingerprint (SHA-256 hex) used for idempotent persistence
    pub fingerprint: String,
    pub category: String,
    pub rationale: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
    pub provenance: Provenance,
}

impl CategorizedRecord {
    /// Build a categorized record from a model decision
    pub fn from_decision(
        position: usize,
        record: CanonicalRecord,
        fingerprint: String,
        decision: &Decision,
    ) -> Self {
        Self {
            position,
            record,
            fingerprint,
            category: decision.effective_category().to_string(),
            rationale: decision.rationale.clone(),
            score: decision.score,
            revised_category: decision.revised_category.clone(),
            revised_rationale: decision.revised_rationale.clone(),
            revised_score: decision.revised_score,
            citations: decision.citations.clone(),
            provenance: Provenance::Llm,
        }
    }

    /// Build a categorized record for a prefilled (rule) assignment
    pub fn from_rule(
        position: usize,
        record: CanonicalRecord,
        fingerprint: String,
        category: String,
    ) -> Self {
        Self {
            position,
            record,
            fingerprint,
            category,
            rationale: "rule: unanimous duplicate".to_string(),
            score: 1.0,
            revised_category: None,
            revised_rationale: None,
            revised_score: None,
            citations: None,
            provenance: Provenance::Rule,
        }
    }

    /// Effective confidence: revised score when present, else base score
    pub fn effective_score(&self) -> f64 {
        self.revised_score.unwrap_or(self.score)
    }
}
