//! Request assembly for the classifier endpoint
//!
//! A request is three parts: system instructions, a user prompt
//! carrying the taxonomy hierarchy and the page's exemplars as a
//! fenced JSON array, and a strict JSON schema whose category field
//! enumerates the taxonomy codes. The exemplar field order and the
//! fence markers are fixed; both participate in the settings
//! fingerprint, so changing either rolls every cache key.

use serde::Serialize;

use crate::models::{taxonomy, CanonicalRecord, TaxonomyEntry};
use crate::types::ClassifyRequest;

/// Compact transaction view field order, as sent to the model
pub const CTV_FIELDS: [&str; 7] = [
    "idx",
    "id",
    "description",
    "amount",
    "date",
    "merchant",
    "memo",
];

/// Name of the structured-output format requested from the endpoint
pub const RESPONSE_FORMAT_NAME: &str = "categorization_decisions";

const BEGIN_MARKER: &str = "BEGIN_TRANSACTIONS_JSON";
const END_MARKER: &str = "END_TRANSACTIONS_JSON";

/// One exemplar as the model sees it; field order is the CTV order
#[derive(Serialize)]
struct CtvRow<'a> {
    idx: usize,
    id: &'a str,
    description: &'a str,
    amount: &'a str,
    date: &'a str,
    merchant: &'a str,
    memo: &'a str,
}

fn ctv_rows(exemplars: &[&CanonicalRecord]) -> Vec<serde_json::Value> {
    exemplars
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let row = CtvRow {
                idx: i + 1,
                id: record.id.as_deref().unwrap_or(""),
                description: record.description.as_deref().unwrap_or(""),
                amount: record.amount.as_deref().unwrap_or(""),
                date: record.date.as_deref().unwrap_or(""),
                merchant: record.merchant.as_deref().unwrap_or(""),
                memo: record.memo.as_deref().unwrap_or(""),
            };
            serde_json::to_value(row).unwrap_or(serde_json::Value::Null)
        })
        .collect()
}

/// Two-level hierarchy text: top-level codes with indented children
fn taxonomy_text(entries: &[TaxonomyEntry]) -> String {
    let sorted = taxonomy::normalized_sorted(entries);
    let mut out = String::from("Category taxonomy (assign the code, not the name):\n");
    for entry in sorted.iter().filter(|e| e.parent_code.is_none()) {
        out.push_str(&format!("- {} ({})\n", entry.code, entry.label()));
        for child in sorted
            .iter()
            .filter(|e| e.parent_code.as_deref() == Some(entry.code.as_str()))
        {
            out.push_str(&format!("  - {} ({})\n", child.code, child.label()));
        }
    }
    out
}

/// Strict JSON schema constraining the response to aligned decisions
pub fn response_schema(entries: &[TaxonomyEntry]) -> serde_json::Value {
    let codes = taxonomy::code_list(entries);
    serde_json::json!({
        "name": RESPONSE_FORMAT_NAME,
        "strict": true,
        "schema": {
            "type": "object",
            "properties": {
                "decisions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "idx": { "type": "integer" },
                            "category": { "type": "string", "enum": codes },
                            "rationale": { "type": "string" },
                            "score": { "type": "number" }
                        },
                        "required": ["idx", "category", "rationale", "score"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["decisions"],
            "additionalProperties": false
        }
    })
}

/// Assemble the full request for one page of exemplars
pub fn build_request(
    model: &str,
    system_instructions: &str,
    exemplars: &[&CanonicalRecord],
    entries: &[TaxonomyEntry],
) -> ClassifyRequest {
    let rows = serde_json::Value::Array(ctv_rows(exemplars));
    let rows_json = serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string());

    let user_prompt = format!(
        "{taxonomy}\n\
         Categorize each transaction below. Return one decision per transaction, \
         in the same order, with idx echoing the input idx.\n\n\
         {begin}\n{rows}\n{end}\n",
        taxonomy = taxonomy_text(entries),
        begin = BEGIN_MARKER,
        rows = rows_json,
        end = END_MARKER,
    );

    ClassifyRequest {
        model: model.to_string(),
        system_instructions: system_instructions.to_string(),
        user_prompt,
        response_schema: response_schema(entries),
    }
}
