//! Two-level category taxonomy
//!
//! The taxonomy is read-only input for one categorization run. It
//! drives both the prompt (hierarchy text) and the response schema
//! (category enum), so its normalized form participates in the
//! settings fingerprint.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One taxonomy row: a category code with optional parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub code: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl TaxonomyEntry {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            parent_code: None,
            display_name: None,
        }
    }

    pub fn child(code: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            parent_code: Some(parent.into()),
            display_name: None,
        }
    }

    /// Display label: display_name when present, else the code
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.code)
    }
}

/// Trimmed, deterministic copy of the taxonomy sorted by (parent, code)
///
/// Used by the settings fingerprint so keys roll when codes, names, or
/// parent relationships change, regardless of input ordering.
pub fn normalized_sorted(taxonomy: &[TaxonomyEntry]) -> Vec<TaxonomyEntry> {
    let mut out: Vec<TaxonomyEntry> = taxonomy
        .iter()
        .map(|e| TaxonomyEntry {
            code: e.code.trim().to_string(),
            parent_code: e
                .parent_code
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            display_name: e
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
        .collect();
    out.sort_by(|a, b| {
        (a.parent_code.as_deref().unwrap_or(""), a.code.as_str())
            .cmp(&(b.parent_code.as_deref().unwrap_or(""), b.code.as_str()))
    });
    out
}

/// Deduplicated, non-blank category codes in first-seen order
pub fn code_list(taxonomy: &[TaxonomyEntry]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut codes = Vec::new();
    for entry in taxonomy {
        let code = entry.code.trim();
        if !code.is_empty() && seen.insert(code.to_string()) {
            codes.push(code.to_string());
        }
    }
    codes
}

/// The allow-set of category codes
pub fn code_set(taxonomy: &[TaxonomyEntry]) -> BTreeSet<String> {
    code_list(taxonomy).into_iter().collect()
}

/// The in-taxonomy fallback code for unknown categories, when one exists
///
/// Prefers "Other", then "Unknown". The fallback stays within the
/// supplied taxonomy; when neither code is present there is no
/// fallback and unknown categories are hard validation errors.
pub fn fallback_code(taxonomy: &[TaxonomyEntry]) -> Option<String> {
    let set = code_set(taxonomy);
    for candidate in ["Other", "Unknown"] {
        if set.contains(candidate) {
            return Some(candidate.to_string());
        }
    }
    None
}
