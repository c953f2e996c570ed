//! Applying human review outcomes
//!
//! The engine hands the needs-review list to an interactive
//! collaborator and gets back, per accepted entry, a final category
//! and optional display-name override. Accepted entries are persisted
//! with provenance "manual", overwriting any prior assignment
//! (verified rows included, since the human just verified them).
//! Entries with no outcome are left untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{CategorizedRecord, Provenance};
use crate::types::{PersistenceStore, Scope};

/// One accepted review decision from the interactive collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    /// Input position of the reviewed record
    pub position: usize,
    /// Final category chosen by the reviewer
    pub category: String,
    /// Optional human-facing name override for the merchant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Persist accepted review outcomes; returns the number of rows updated
///
/// `needs_review` is the list the engine emitted; outcomes referencing
/// positions outside it are logged and skipped.
pub async fn apply_review_outcomes(
    store: &dyn PersistenceStore,
    scope: &Scope,
    needs_review: &[CategorizedRecord],
    outcomes: &[ReviewOutcome],
) -> anyhow::Result<usize> {
    let by_position: HashMap<usize, &CategorizedRecord> =
        needs_review.iter().map(|r| (r.position, r)).collect();

    let mut accepted = Vec::new();
    for outcome in outcomes {
        let Some(&reviewed) = by_position.get(&outcome.position) else {
            warn!(position = outcome.position, "review outcome for unknown position, skipping");
            continue;
        };
        let mut record = reviewed.clone();
        record.category = outcome.category.clone();
        record.revised_category = None;
        record.revised_score = None;
        record.score = 1.0;
        record.provenance = Provenance::Manual;
        if let Some(name) = &outcome.display_name {
            record.record.merchant = Some(name.clone());
        }
        accepted.push(record);
    }

    if accepted.is_empty() {
        return Ok(0);
    }
    let updated = store
        .apply_categories(scope, &accepted, Provenance::Manual, false)
        .await?;
    debug!(accepted = accepted.len(), updated, "applied review outcomes");
    Ok(updated)
}
