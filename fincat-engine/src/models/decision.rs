//! Typed model decisions
//!
//! A [`Decision`] is the validated unit produced by the classifier for
//! one exemplar. The same shape is written to the page cache, so the
//! serde representation here is the on-disk cache format for decision
//! details.

use serde::{Deserialize, Serialize};

/// A single validated categorization decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub category: String,
    pub rationale: String,
    /// Confidence in [0, 1]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
}

impl Decision {
    /// The category to act on: revised when present, else base
    pub fn effective_category(&self) -> &str {
        self.revised_category.as_deref().unwrap_or(&self.category)
    }

    /// The confidence to gate on: revised score when present, else base
    pub fn effective_score(&self) -> f64 {
        self.revised_score.unwrap_or(self.score)
    }
}
