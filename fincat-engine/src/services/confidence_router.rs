//! Confidence-gated routing of categorized records
//!
//! Records with effective score strictly above the threshold are
//! auto-applied; scores at or below the threshold go to the review
//! queue. The boundary is exclusive: a score exactly at the threshold
//! is reviewed, not applied.

use tracing::debug;

use crate::models::CategorizedRecord;

/// Records split by confidence, each side in original input order
#[derive(Debug, Default)]
pub struct RoutedRecords {
    pub auto_apply: Vec<CategorizedRecord>,
    pub needs_review: Vec<CategorizedRecord>,
}

pub fn route(records: Vec<CategorizedRecord>, threshold: f64) -> RoutedRecords {
    let mut routed = RoutedRecords::default();
    for record in records {
        if record.effective_score() > threshold {
            routed.auto_apply.push(record);
        } else {
            routed.needs_review.push(record);
        }
    }
    debug!(
        auto_apply = routed.auto_apply.len(),
        needs_review = routed.needs_review.len(),
        threshold,
        "routed records by confidence"
    );
    routed
}
