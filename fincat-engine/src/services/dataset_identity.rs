//! Content-addressed identity for records, settings, and datasets
//!
//! Three hashes key the page cache:
//!
//! - record fingerprint: SHA-256 of a canonical JSON view of one
//!   transaction, scoped by provider
//! - settings hash: SHA-256 of everything that shapes a model answer
//!   (model id, response format, instructions, field order, taxonomy)
//! - dataset id: SHA-256 of the exemplar fingerprint sequence plus the
//!   settings hash
//!
//! Any change to a record, the taxonomy, or the prompt shape rolls the
//! relevant key, so stale cache entries are simply never addressed
//! again rather than invalidated in place.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::models::{taxonomy, CanonicalRecord, TaxonomyEntry};
use crate::services::prompt_builder::{CTV_FIELDS, RESPONSE_FORMAT_NAME};

/// SHA-256 hex digest of a byte slice
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn field(value: Option<&str>) -> String {
    value.unwrap_or("").trim().to_string()
}

/// Content fingerprint of one record within a provider's namespace
///
/// The fingerprint hashes a compact JSON object with sorted keys, so
/// it is stable across field ordering and struct layout changes.
pub fn record_fingerprint(provider: &str, record: &CanonicalRecord) -> String {
    let mut view = BTreeMap::new();
    view.insert("provider", provider.trim().to_lowercase());
    view.insert("id", field(record.id.as_deref()));
    view.insert("amount", field(record.amount.as_deref()));
    view.insert("date", field(record.date.as_deref()));
    view.insert("merchant", field(record.merchant.as_deref()));
    view.insert("description", field(record.description.as_deref()));
    // BTreeMap keys serialize sorted; serde_json::to_string is compact
    let json = serde_json::to_string(&view).unwrap_or_default();
    sha256_hex(json.as_bytes())
}

/// Hash of every setting that can change a model answer
pub fn settings_hash(
    model: &str,
    system_instructions: &str,
    taxonomy_entries: &[TaxonomyEntry],
) -> String {
    let normalized = taxonomy::normalized_sorted(taxonomy_entries);
    let taxonomy_rows: Vec<serde_json::Value> = normalized
        .iter()
        .map(|e| {
            serde_json::json!([
                e.code,
                e.parent_code.as_deref().unwrap_or(""),
                e.display_name.as_deref().unwrap_or(""),
            ])
        })
        .collect();

    let mut view: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    view.insert("model", serde_json::Value::String(model.to_string()));
    view.insert(
        "response_format",
        serde_json::Value::String(RESPONSE_FORMAT_NAME.to_string()),
    );
    view.insert(
        "system_instructions",
        serde_json::Value::String(system_instructions.to_string()),
    );
    view.insert(
        "ctv_fields",
        serde_json::json!(CTV_FIELDS.iter().collect::<Vec<_>>()),
    );
    view.insert("taxonomy", serde_json::Value::Array(taxonomy_rows));

    let json = serde_json::to_string(&view).unwrap_or_default();
    sha256_hex(json.as_bytes())
}

/// Dataset id over the exemplar fingerprint sequence and settings
///
/// The exemplar order feeding this hash is the page order, so the
/// same exemplars in the same order under the same settings always
/// address the same cache directory.
pub fn dataset_id(exemplar_fingerprints: &[String], settings: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(settings.as_bytes());
    for fp in exemplar_fingerprints {
        hasher.update(b"\n");
        hasher.update(fp.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
