//! Shared test doubles for engine integration tests

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use fincat_engine::config::{EngineConfig, ModelSettings, RetryPolicy};
use fincat_engine::error::ClassifierError;
use fincat_engine::models::{CanonicalRecord, CategorizedRecord, Provenance, TaxonomyEntry};
use fincat_engine::types::{
    ClassifierTransport, ClassifyRequest, IdentityKey, PersistenceStore, PriorMatch, Scope,
    TaxonomySource,
};

/// Engine config against a temp cache dir, with near-zero retry delays
pub fn test_config(cache_dir: &Path) -> EngineConfig {
    EngineConfig {
        cache_dir: cache_dir.to_path_buf(),
        page_size: 10,
        concurrency: 4,
        confidence_threshold: 0.7,
        stop_on_error: false,
        persist_prefill: false,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delays: vec![Duration::from_millis(1), Duration::from_millis(1)],
            jitter_pct: 0.0,
        },
        model: ModelSettings {
            model: "test-model".to_string(),
            endpoint: "http://unused.invalid".to_string(),
            api_key: None,
            system_instructions: "categorize".to_string(),
        },
    }
}

pub fn taxonomy() -> Vec<TaxonomyEntry> {
    vec![
        TaxonomyEntry::new("Dining"),
        TaxonomyEntry::new("Groceries"),
        TaxonomyEntry::new("Other"),
    ]
}

pub fn record(id: &str, merchant: &str, description: &str) -> CanonicalRecord {
    CanonicalRecord {
        id: Some(id.to_string()),
        description: Some(description.to_string()),
        amount: Some("-10.00".to_string()),
        date: Some("2026-03-01".to_string()),
        merchant: Some(merchant.to_string()),
        memo: None,
    }
}

pub fn scope() -> Scope {
    Scope::new("chase", "checking")
}

/// Count the exemplars in a request by parsing the fenced JSON block
fn exemplar_count(request: &ClassifyRequest) -> usize {
    let prompt = &request.user_prompt;
    let begin = "BEGIN_TRANSACTIONS_JSON";
    let end = "END_TRANSACTIONS_JSON";
    let start = prompt.find(begin).map(|i| i + begin.len()).unwrap_or(0);
    let stop = prompt.find(end).unwrap_or(prompt.len());
    serde_json::from_str::<serde_json::Value>(prompt[start..stop].trim())
        .ok()
        .and_then(|v| v.as_array().map(|a| a.len()))
        .unwrap_or(0)
}

/// Build a well-formed decisions body for `count` exemplars
pub fn decisions_body(count: usize, category: &str, score: f64) -> String {
    let decisions: Vec<serde_json::Value> = (1..=count)
        .map(|idx| {
            serde_json::json!({
                "idx": idx,
                "category": category,
                "rationale": "stub",
                "score": score,
            })
        })
        .collect();
    serde_json::json!({ "decisions": decisions }).to_string()
}

/// Transport that always answers correctly, counting its calls
pub struct CountingTransport {
    pub category: String,
    pub score: f64,
    pub calls: AtomicUsize,
}

impl CountingTransport {
    pub fn new(category: &str, score: f64) -> Self {
        Self {
            category: category.to_string(),
            score,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierTransport for CountingTransport {
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(decisions_body(exemplar_count(request), &self.category, self.score))
    }
}

/// One scripted reply from [`ScriptedTransport`]
pub enum Reply {
    Body(String),
    /// Answer correctly for whatever page arrives
    Auto { category: String, score: f64 },
    Error(ClassifierError),
}

/// Transport that plays back a fixed script of replies
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    pub calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierTransport for ScriptedTransport {
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("transport script exhausted"));
        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Auto { category, score } => {
                Ok(decisions_body(exemplar_count(request), &category, score))
            }
            Reply::Error(e) => Err(e),
        }
    }
}

/// Taxonomy source backed by a fixed entry list
pub struct FixedTaxonomy(pub Vec<TaxonomyEntry>);

#[async_trait]
impl TaxonomySource for FixedTaxonomy {
    async fn load_taxonomy(&self, _scope: &Scope) -> anyhow::Result<Vec<TaxonomyEntry>> {
        Ok(self.0.clone())
    }
}

/// In-memory persistence store with a call log
#[derive(Default)]
pub struct MemoryStore {
    pub prior: HashMap<IdentityKey, Vec<PriorMatch>>,
    pub applied: Mutex<Vec<(Vec<CategorizedRecord>, Provenance, bool)>>,
}

impl MemoryStore {
    pub fn with_prior(prior: HashMap<IdentityKey, Vec<PriorMatch>>) -> Self {
        Self {
            prior,
            applied: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn lookup_prior_categories(
        &self,
        _scope: &Scope,
        keys: &[IdentityKey],
    ) -> anyhow::Result<HashMap<IdentityKey, Vec<PriorMatch>>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.prior.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn apply_categories(
        &self,
        _scope: &Scope,
        records: &[CategorizedRecord],
        provenance: Provenance,
        only_if_unverified: bool,
    ) -> anyhow::Result<usize> {
        self.applied
            .lock()
            .unwrap()
            .push((records.to_vec(), provenance, only_if_unverified));
        Ok(records.len())
    }
}
