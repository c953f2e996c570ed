//! Grouping by normalized merchant identity
//!
//! Records sharing a normalized identity key form one group; the model
//! only ever sees the group's exemplar (first occurrence) and the
//! decision fans out to every member. Grouping is pure and
//! deterministic: equal inputs always yield equal groups.

use std::collections::HashMap;

use tracing::debug;

use crate::models::CanonicalRecord;

/// Positions sharing one normalized identity key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Normalized identity key, empty for forced singletons
    pub key: String,
    /// Member positions in input order; always contains the exemplar
    pub members: Vec<usize>,
    /// First occurrence, the position sent to the model
    pub exemplar: usize,
}

/// Case-fold and collapse whitespace in an identity field
///
/// Unicode case folding uses `str::to_lowercase`, which covers the
/// full Unicode simple case mapping from the standard library.
pub fn normalize_identity(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn identity_key(record: &CanonicalRecord) -> String {
    // merchant is the primary identity field, description the fallback
    let primary = record.merchant.as_deref().map(normalize_identity);
    match primary {
        Some(key) if !key.is_empty() => key,
        _ => record
            .description
            .as_deref()
            .map(normalize_identity)
            .unwrap_or_default(),
    }
}

/// Partition records into groups, exemplar = first occurrence
///
/// Records whose normalized key ends up empty never merge with each
/// other; each forms a singleton group. Group order follows first
/// occurrence in the input.
pub fn index_groups(records: &[CanonicalRecord]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (position, record) in records.iter().enumerate() {
        let key = identity_key(record);
        if key.is_empty() {
            groups.push(Group {
                key,
                members: vec![position],
                exemplar: position,
            });
            continue;
        }
        match by_key.get(&key) {
            Some(&group_index) => groups[group_index].members.push(position),
            None => {
                by_key.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    members: vec![position],
                    exemplar: position,
                });
            }
        }
    }

    debug!(
        records = records.len(),
        groups = groups.len(),
        "indexed identity groups"
    );
    groups
}
