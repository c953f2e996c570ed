//! Strict validation of model output against its page
//!
//! The model's reply must be a JSON object with a `decisions` array
//! covering the page's exemplars 1:1: same count, each 1-based idx
//! present exactly once (any order, realigned here), finite scores in
//! [0, 1], a non-empty rationale, and every category inside the
//! taxonomy code set. An out-of-set category is substituted with the
//! taxonomy's fallback code when one exists; otherwise it fails the
//! page. Validation failures are terminal for the page and never
//! produce a cache entry.

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::debug;

use crate::error::ValidationError;
use crate::models::{taxonomy, Decision, TaxonomyEntry};

#[derive(Deserialize)]
struct WireResponse {
    decisions: Vec<WireDecision>,
}

#[derive(Deserialize)]
struct WireDecision {
    idx: Option<i64>,
    category: Option<String>,
    rationale: Option<String>,
    score: Option<f64>,
    #[serde(default)]
    revised_category: Option<String>,
    #[serde(default)]
    revised_rationale: Option<String>,
    #[serde(default)]
    revised_score: Option<f64>,
    #[serde(default)]
    citations: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResponseValidator {
    codes: BTreeSet<String>,
    fallback: Option<String>,
}

impl ResponseValidator {
    pub fn new(entries: &[TaxonomyEntry]) -> Self {
        Self {
            codes: taxonomy::code_set(entries),
            fallback: taxonomy::fallback_code(entries),
        }
    }

    /// Resolve a category against the allow-set, substituting fallback
    fn resolve_category(&self, index: usize, raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        if self.codes.contains(trimmed) {
            return Ok(trimmed.to_string());
        }
        match &self.fallback {
            Some(code) => {
                debug!(index, category = trimmed, fallback = %code, "unknown category, substituting fallback");
                Ok(code.clone())
            }
            None => Err(ValidationError::UnknownCategory {
                index,
                category: trimmed.to_string(),
            }),
        }
    }

    /// Parse and validate raw model output for a page of `expected` exemplars
    ///
    /// Decisions may arrive in any order; they are realigned by their
    /// 1-based idx. Returned decisions are in page order, idx stripped.
    pub fn validate(&self, raw: &str, expected: usize) -> Result<Vec<Decision>, ValidationError> {
        let wire: WireResponse =
            serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if wire.decisions.len() != expected {
            return Err(ValidationError::CountMismatch {
                expected,
                actual: wire.decisions.len(),
            });
        }

        // bucket by idx; with the count equal and every idx in range
        // and unique, all slots end up filled (no gaps possible)
        let mut slots: Vec<Option<WireDecision>> = (0..expected).map(|_| None).collect();
        for (i, wd) in wire.decisions.into_iter().enumerate() {
            let idx = wd.idx.ok_or(ValidationError::MissingField {
                index: i,
                field: "idx",
            })?;
            if idx < 1 || idx as usize > expected {
                return Err(ValidationError::IdxOutOfRange { idx, expected });
            }
            let slot = &mut slots[(idx - 1) as usize];
            if slot.is_some() {
                return Err(ValidationError::DuplicateIdx { idx });
            }
            *slot = Some(wd);
        }

        let mut decisions = Vec::with_capacity(expected);
        for (i, slot) in slots.into_iter().enumerate() {
            let wd = slot.ok_or(ValidationError::MissingField {
                index: i,
                field: "idx",
            })?;

            let category_raw = wd.category.ok_or(ValidationError::MissingField {
                index: i,
                field: "category",
            })?;
            let category = self.resolve_category(i, &category_raw)?;

            let rationale = wd
                .rationale
                .filter(|r| !r.trim().is_empty())
                .ok_or(ValidationError::MissingField {
                    index: i,
                    field: "rationale",
                })?;

            let score = wd.score.ok_or(ValidationError::MissingField {
                index: i,
                field: "score",
            })?;
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(ValidationError::ScoreOutOfRange { index: i, score });
            }
            if let Some(rs) = wd.revised_score {
                if !rs.is_finite() || !(0.0..=1.0).contains(&rs) {
                    return Err(ValidationError::ScoreOutOfRange { index: i, score: rs });
                }
            }

            let revised_category = match wd.revised_category {
                Some(rc) => Some(self.resolve_category(i, &rc)?),
                None => None,
            };

            decisions.push(Decision {
                category,
                rationale,
                score,
                revised_category,
                revised_rationale: wd.revised_rationale,
                revised_score: wd.revised_score,
                citations: wd.citations,
            });
        }

        Ok(decisions)
    }
}
