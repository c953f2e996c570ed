//! Prefill groups from previously categorized duplicates
//!
//! Before any model call, each group's members are looked up in the
//! persistence store by identity key (external id + content
//! fingerprint) within the run's scope. When at least one prior match
//! exists and every match carrying a category agrees on it, the whole
//! group is prefilled with that category and never reaches the model.
//! Disagreement, absence of matches, or matches with only null
//! categories leave the group unresolved.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::models::CanonicalRecord;
use crate::services::group_indexer::Group;
use crate::types::{IdentityKey, PersistenceStore, PriorMatch, Scope};

/// A group resolved without the model, with its agreed category
#[derive(Debug, Clone)]
pub struct PrefilledGroup {
    pub group: Group,
    pub category: String,
}

/// Outcome of duplicate resolution over all groups
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub prefilled: Vec<PrefilledGroup>,
    pub unresolved: Vec<Group>,
}

fn member_keys(group: &Group, records: &[CanonicalRecord], fingerprints: &[String]) -> Vec<IdentityKey> {
    group
        .members
        .iter()
        .map(|&pos| IdentityKey {
            external_id: records[pos].id.clone().unwrap_or_default(),
            fingerprint: fingerprints[pos].clone(),
        })
        .collect()
}

/// The unanimous category across matches, when one exists
///
/// Returns `None` when there are no matches, when every match has a
/// null category, or when two non-null categories disagree.
fn unanimous_category(matches: &[&PriorMatch]) -> Option<String> {
    let mut agreed: Option<&str> = None;
    for m in matches {
        if let Some(category) = m.category.as_deref() {
            match agreed {
                None => agreed = Some(category),
                Some(existing) if existing != category => return None,
                Some(_) => {}
            }
        }
    }
    agreed.map(String::from)
}

/// Split groups into prefilled and unresolved via prior-category lookup
///
/// `fingerprints` must be aligned with `records` by position.
#[instrument(skip_all, fields(groups = groups.len()))]
pub async fn resolve_duplicates(
    store: &dyn PersistenceStore,
    scope: &Scope,
    records: &[CanonicalRecord],
    fingerprints: &[String],
    groups: Vec<Group>,
) -> anyhow::Result<ResolutionOutcome> {
    let all_keys: Vec<IdentityKey> = groups
        .iter()
        .flat_map(|g| member_keys(g, records, fingerprints))
        .collect();
    let prior: HashMap<IdentityKey, Vec<PriorMatch>> =
        store.lookup_prior_categories(scope, &all_keys).await?;

    let mut outcome = ResolutionOutcome::default();
    for group in groups {
        let keys = member_keys(&group, records, fingerprints);
        let matches: Vec<&PriorMatch> = keys
            .iter()
            .filter_map(|k| prior.get(k))
            .flatten()
            .collect();

        if matches.is_empty() {
            outcome.unresolved.push(group);
            continue;
        }
        match unanimous_category(&matches) {
            Some(category) => {
                debug!(key = %group.key, members = group.members.len(), %category, "group prefilled from duplicates");
                outcome.prefilled.push(PrefilledGroup { group, category });
            }
            None => outcome.unresolved.push(group),
        }
    }

    debug!(
        prefilled = outcome.prefilled.len(),
        unresolved = outcome.unresolved.len(),
        "duplicate resolution complete"
    );
    Ok(outcome)
}
