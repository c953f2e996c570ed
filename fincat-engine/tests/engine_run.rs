//! End-to-end engine runs against in-memory collaborators

mod helpers;

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use fincat_engine::error::{ClassifierError, EngineError};
use fincat_engine::models::{Provenance, TaxonomyEntry};
use fincat_engine::services::dataset_identity;
use fincat_engine::types::{IdentityKey, NullStore, PriorMatch};
use fincat_engine::Engine;

use helpers::{
    decisions_body, record, scope, taxonomy, test_config, CountingTransport, FixedTaxonomy,
    MemoryStore, Reply, ScriptedTransport,
};

fn unique_records(n: usize) -> Vec<fincat_engine::models::CanonicalRecord> {
    (0..n)
        .map(|i| record(&format!("t{i}"), &format!("MERCHANT {i}"), "CARD PURCHASE"))
        .collect()
}

#[tokio::test]
async fn test_every_position_appears_once_in_order() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));

    let records = unique_records(25);
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    let positions: Vec<usize> = report.records.iter().map(|r| r.position).collect();
    assert_eq!(positions, (0..25).collect::<Vec<_>>());
    assert!(report.failed_positions.is_empty());
    // 25 singleton groups at page size 10 -> 3 pages
    assert_eq!(transport.call_count(), 3);
    assert_eq!(report.model_calls, 3);
}

#[tokio::test]
async fn test_duplicate_merchants_share_one_exemplar_call() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(CountingTransport::new("Groceries", 0.9));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));

    let records = vec![
        record("a", "ACME SVC", "PURCHASE"),
        record("b", "acme  svc", "PURCHASE"),
        record("c", "OTHER SHOP", "PURCHASE"),
        record("d", " ACME SVC ", "PURCHASE"),
    ];
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    // two groups, one page, one model call
    assert_eq!(transport.call_count(), 1);
    assert_eq!(report.records.len(), 4);
    for position in [0, 1, 3] {
        assert_eq!(report.records[position].category, "Groceries");
    }
}

#[tokio::test]
async fn test_second_run_hits_cache_with_zero_model_calls() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(12);

    let first = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), first.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();
    assert_eq!(first.call_count(), 2);
    assert_eq!(report.cache_misses, 2);

    let second = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), second.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();
    assert_eq!(second.call_count(), 0);
    assert_eq!(report.cache_hits, 2);
    assert_eq!(report.model_calls, 0);
    assert_eq!(report.records.len(), 12);
}

#[tokio::test]
async fn test_taxonomy_change_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(3);

    let first = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), first.clone(), Arc::new(NullStore));
    engine.run(&scope(), &records, &taxonomy()).await.unwrap();
    assert_eq!(first.call_count(), 1);

    let mut changed = taxonomy();
    changed.push(TaxonomyEntry::new("Travel"));
    let second = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), second.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &changed).await.unwrap();
    assert_eq!(second.call_count(), 1);
    assert_eq!(report.cache_hits, 0);
}

#[tokio::test]
async fn test_unanimous_duplicates_prefill_without_model() {
    let dir = TempDir::new().unwrap();
    let records = vec![
        record("a", "ACME SVC", "PURCHASE"),
        record("b", "NEW SHOP", "PURCHASE"),
    ];

    let mut prior = HashMap::new();
    prior.insert(
        IdentityKey {
            external_id: "a".to_string(),
            fingerprint: dataset_identity::record_fingerprint("chase", &records[0]),
        },
        vec![
            PriorMatch {
                category: Some("Dining".to_string()),
                verified: true,
            },
            PriorMatch {
                category: None,
                verified: false,
            },
        ],
    );
    let store = Arc::new(MemoryStore::with_prior(prior));
    let transport = Arc::new(CountingTransport::new("Groceries", 0.9));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), store);

    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    assert_eq!(report.prefilled_groups, 1);
    assert_eq!(transport.call_count(), 1); // only the NEW SHOP group
    assert_eq!(report.records[0].category, "Dining");
    assert_eq!(report.records[0].provenance, Provenance::Rule);
    assert_eq!(report.records[1].category, "Groceries");
    assert_eq!(report.records[1].provenance, Provenance::Llm);
}

#[tokio::test]
async fn test_confidence_boundary_at_threshold_goes_to_review() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(1);

    // exactly at threshold -> review
    let transport = Arc::new(CountingTransport::new("Dining", 0.70));
    let store = Arc::new(MemoryStore::default());
    let engine = Engine::new(test_config(dir.path()), transport, store.clone());
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();
    assert_eq!(report.needs_review.len(), 1);
    assert_eq!(report.auto_applied, 0);
    assert!(store.applied.lock().unwrap().is_empty());

    // strictly above -> auto-applied, without overwriting verified rows
    let dir2 = TempDir::new().unwrap();
    let transport = Arc::new(CountingTransport::new("Dining", 0.71));
    let store = Arc::new(MemoryStore::default());
    let engine = Engine::new(test_config(dir2.path()), transport, store.clone());
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();
    assert!(report.needs_review.is_empty());
    assert_eq!(report.auto_applied, 1);

    let applied = store.applied.lock().unwrap();
    let (_, provenance, only_if_unverified) = &applied[0];
    assert_eq!(*provenance, Provenance::Llm);
    assert!(*only_if_unverified);
}

#[tokio::test]
async fn test_failed_page_writes_no_cache_entry_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(2);

    // one decision for a two-exemplar page: count mismatch, page fails
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::Body(decisions_body(
        1, "Dining", 0.9,
    ))]));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(report.failed_pages.len(), 1);
    assert_eq!(report.failed_positions, vec![0, 1]);
    assert!(report.records.is_empty());
    assert!(report.failed_pages[0].reason.contains("validation"));

    // a second run finds no cache entry and calls the model honestly
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::Auto {
        category: "Dining".to_string(),
        score: 0.9,
    }]));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();
    assert_eq!(transport.call_count(), 1);
    assert_eq!(report.cache_hits, 0);
    assert_eq!(report.records.len(), 2);
}

#[tokio::test]
async fn test_unknown_category_falls_back_to_other() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(1);

    let transport = Arc::new(ScriptedTransport::new(vec![Reply::Body(decisions_body(
        1,
        "Entertainment",
        0.9,
    ))]));
    let engine = Engine::new(test_config(dir.path()), transport, Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    assert!(report.failed_pages.is_empty());
    assert_eq!(report.records[0].category, "Other");
}

#[tokio::test]
async fn test_rate_limit_is_retried_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(1);

    let transport = Arc::new(ScriptedTransport::new(vec![
        Reply::Error(ClassifierError::Status {
            status: 429,
            body: "rate limited".to_string(),
        }),
        Reply::Auto {
            category: "Dining".to_string(),
            score: 0.9,
        },
    ]));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    assert_eq!(transport.call_count(), 2);
    assert_eq!(report.records.len(), 1);
    assert!(report.failed_pages.is_empty());
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(1);

    let transport = Arc::new(ScriptedTransport::new(vec![Reply::Error(
        ClassifierError::Status {
            status: 400,
            body: "bad request".to_string(),
        },
    )]));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));
    let report = engine.run(&scope(), &records, &taxonomy()).await.unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(report.failed_pages.len(), 1);
    assert!(report.failed_pages[0].reason.contains("non-retryable"));
}

#[tokio::test]
async fn test_stop_on_error_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(1);

    let mut config = test_config(dir.path());
    config.stop_on_error = true;
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::Error(
        ClassifierError::Status {
            status: 400,
            body: "bad request".to_string(),
        },
    )]));
    let engine = Engine::new(config, transport, Arc::new(NullStore));
    let err = engine.run(&scope(), &records, &taxonomy()).await.unwrap_err();
    assert!(matches!(err, EngineError::PageFailed { page_index: 0, .. }));
}

#[tokio::test]
async fn test_run_with_taxonomy_source() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), transport, Arc::new(NullStore));

    let source = FixedTaxonomy(taxonomy());
    let report = engine
        .run_with_taxonomy(&scope(), &unique_records(2), &source)
        .await
        .unwrap();
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].category, "Dining");
}

#[tokio::test]
async fn test_zero_page_size_or_concurrency_rejected_up_front() {
    let dir = TempDir::new().unwrap();
    let records = unique_records(1);

    let mut config = test_config(dir.path());
    config.page_size = 0;
    let transport = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(config, transport.clone(), Arc::new(NullStore));
    let err = engine.run(&scope(), &records, &taxonomy()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let mut config = test_config(dir.path());
    config.concurrency = 0;
    let engine = Engine::new(config, transport.clone(), Arc::new(NullStore));
    let err = engine.run(&scope(), &records, &taxonomy()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_empty_inputs() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(CountingTransport::new("Dining", 0.9));
    let engine = Engine::new(test_config(dir.path()), transport.clone(), Arc::new(NullStore));

    let report = engine.run(&scope(), &[], &taxonomy()).await.unwrap();
    assert!(report.records.is_empty());
    assert_eq!(transport.call_count(), 0);

    let err = engine
        .run(&scope(), &unique_records(1), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}
