//! End-to-end categorization run
//!
//! The engine wires the services into one pipeline:
//!
//! 1. fingerprint every record and index identity groups
//! 2. prefill groups whose duplicates already agree on a category
//! 3. slice the remaining exemplars into pages and process them on a
//!    bounded worker window (cache check, model call with retry,
//!    validation, cache write)
//! 4. fan each exemplar decision out to its group members, rebuilding
//!    original input order
//! 5. route by confidence: auto-apply above the threshold, queue the
//!    rest for review
//!
//! Page completion order is unconstrained; the final record list is
//! always in input order regardless of paging or parallelism.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{ClassifierError, EngineError, Result};
use crate::models::{CanonicalRecord, CategorizedRecord, Decision, Provenance, TaxonomyEntry};
use crate::services::confidence_router;
use crate::services::dataset_identity;
use crate::services::duplicate_resolver::{self, PrefilledGroup};
use crate::services::group_indexer::{self, Group};
use crate::services::page_cache::{PageCache, PageKey};
use crate::services::prompt_builder;
use crate::services::response_validator::ResponseValidator;
use crate::types::{ClassifierTransport, PersistenceStore, Scope, TaxonomySource};
use crate::utils::retry::{retry_transient, RetryError};

/// A page that failed terminally, with its reason
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageFailure {
    pub page_index: usize,
    pub reason: String,
}

/// Everything a caller learns from one run
#[derive(Debug, Default, serde::Serialize)]
pub struct RunReport {
    /// All successfully categorized records, in input order
    pub records: Vec<CategorizedRecord>,
    /// The at-or-below-threshold subset, in input order
    pub needs_review: Vec<CategorizedRecord>,
    /// Rows updated by the auto-apply persistence call
    pub auto_applied: usize,
    pub prefilled_groups: usize,
    /// Input positions left uncategorized by failed pages
    pub failed_positions: Vec<usize>,
    pub failed_pages: Vec<PageFailure>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Pages that reached the model endpoint
    pub model_calls: usize,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

struct PageSlice {
    index: usize,
    /// Absolute input positions of this page's exemplars
    positions: Vec<usize>,
}

enum PageResult {
    Hit(Vec<Decision>),
    Fresh(Vec<Decision>),
    Failed(String),
    Aborted,
}

pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn ClassifierTransport>,
    store: Arc<dyn PersistenceStore>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn ClassifierTransport>,
        store: Arc<dyn PersistenceStore>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
        }
    }

    /// Like [`Engine::run`], loading the taxonomy from a source first
    pub async fn run_with_taxonomy(
        &self,
        scope: &Scope,
        records: &[CanonicalRecord],
        source: &dyn TaxonomySource,
    ) -> Result<RunReport> {
        let taxonomy = source.load_taxonomy(scope).await?;
        self.run(scope, records, &taxonomy).await
    }

    /// Categorize `records` against `taxonomy` within `scope`
    #[instrument(skip_all, fields(records = records.len(), provider = %scope.provider))]
    pub async fn run(
        &self,
        scope: &Scope,
        records: &[CanonicalRecord],
        taxonomy: &[TaxonomyEntry],
    ) -> Result<RunReport> {
        if taxonomy.is_empty() {
            return Err(EngineError::InvalidInput("taxonomy is empty".into()));
        }
        // config fields are public, so a caller can bypass resolve();
        // a zero here would panic in chunks() or stall the worker loop
        if self.config.page_size == 0 {
            return Err(EngineError::InvalidInput("page_size must be at least 1".into()));
        }
        if self.config.concurrency == 0 {
            return Err(EngineError::InvalidInput(
                "concurrency must be at least 1".into(),
            ));
        }

        let mut report = RunReport::default();
        if records.is_empty() {
            report.completed_at = Some(chrono::Utc::now());
            return Ok(report);
        }

        let fingerprints: Vec<String> = records
            .iter()
            .map(|r| dataset_identity::record_fingerprint(&scope.provider, r))
            .collect();

        let groups = group_indexer::index_groups(records);
        let outcome = duplicate_resolver::resolve_duplicates(
            self.store.as_ref(),
            scope,
            records,
            &fingerprints,
            groups,
        )
        .await?;
        report.prefilled_groups = outcome.prefilled.len();

        let mut categorized =
            self.prefilled_records(scope, records, &fingerprints, &outcome.prefilled).await?;

        let unresolved = outcome.unresolved;
        let exemplar_fps: Vec<String> = unresolved
            .iter()
            .map(|g| fingerprints[g.exemplar].clone())
            .collect();
        let settings = dataset_identity::settings_hash(
            &self.config.model.model,
            &self.config.model.system_instructions,
            taxonomy,
        );
        let dataset_id = dataset_identity::dataset_id(&exemplar_fps, &settings);
        info!(
            dataset_id = %dataset_id,
            unresolved_groups = unresolved.len(),
            prefilled_groups = report.prefilled_groups,
            "run identity established"
        );

        let page_results = self
            .process_pages(records, taxonomy, &unresolved, &exemplar_fps, &dataset_id, &settings, &mut report)
            .await?;

        // fan out: one page's decisions map to consecutive unresolved
        // groups, each decision applied to every member of its group
        for (page, result) in page_results {
            match result {
                Some(decisions) => {
                    for (decision, &exemplar_pos) in decisions.iter().zip(page.positions.iter()) {
                        let group = unresolved
                            .iter()
                            .find(|g| g.exemplar == exemplar_pos)
                            .ok_or_else(|| {
                                EngineError::InvalidInput(format!(
                                    "no group for exemplar position {exemplar_pos}"
                                ))
                            })?;
                        for &member in &group.members {
                            categorized.push(CategorizedRecord::from_decision(
                                member,
                                records[member].clone(),
                                fingerprints[member].clone(),
                                decision,
                            ));
                        }
                    }
                }
                None => {
                    for &exemplar_pos in &page.positions {
                        if let Some(group) = unresolved.iter().find(|g| g.exemplar == exemplar_pos) {
                            report.failed_positions.extend(group.members.iter().copied());
                        }
                    }
                }
            }
        }

        categorized.sort_by_key(|r| r.position);
        report.failed_positions.sort_unstable();

        let routed = confidence_router::route(categorized.clone(), self.config.confidence_threshold);
        let llm_auto: Vec<CategorizedRecord> = routed
            .auto_apply
            .iter()
            .filter(|r| r.provenance == Provenance::Llm)
            .cloned()
            .collect();
        if !llm_auto.is_empty() {
            report.auto_applied = self
                .store
                .apply_categories(scope, &llm_auto, Provenance::Llm, true)
                .await?;
        }

        report.records = categorized;
        report.needs_review = routed.needs_review;
        report.completed_at = Some(chrono::Utc::now());
        info!(
            records = report.records.len(),
            needs_review = report.needs_review.len(),
            failed = report.failed_positions.len(),
            cache_hits = report.cache_hits,
            model_calls = report.model_calls,
            "run complete"
        );
        Ok(report)
    }

    async fn prefilled_records(
        &self,
        scope: &Scope,
        records: &[CanonicalRecord],
        fingerprints: &[String],
        prefilled: &[PrefilledGroup],
    ) -> Result<Vec<CategorizedRecord>> {
        let mut out = Vec::new();
        for pg in prefilled {
            for &member in &pg.group.members {
                out.push(CategorizedRecord::from_rule(
                    member,
                    records[member].clone(),
                    fingerprints[member].clone(),
                    pg.category.clone(),
                ));
            }
        }
        if self.config.persist_prefill && !out.is_empty() {
            let updated = self
                .store
                .apply_categories(scope, &out, Provenance::Rule, true)
                .await?;
            debug!(updated, "persisted prefilled categories");
        }
        Ok(out)
    }

    /// Process all pages on a sliding window of `concurrency` workers
    #[allow(clippy::too_many_arguments)]
    async fn process_pages(
        &self,
        records: &[CanonicalRecord],
        taxonomy: &[TaxonomyEntry],
        unresolved: &[Group],
        exemplar_fps: &[String],
        dataset_id: &str,
        settings: &str,
        report: &mut RunReport,
    ) -> Result<Vec<(PageSlice, Option<Vec<Decision>>)>> {
        let page_size = self.config.page_size;
        let cache = PageCache::new(self.config.cache_dir.clone());
        let validator = ResponseValidator::new(taxonomy);
        let token = CancellationToken::new();

        let pages: Vec<PageSlice> = unresolved
            .chunks(page_size)
            .enumerate()
            .map(|(index, chunk)| PageSlice {
                index,
                positions: chunk.iter().map(|g| g.exemplar).collect(),
            })
            .collect();
        let total_pages = pages.len();

        let mut slices_by_index: Vec<Option<PageSlice>> = Vec::new();
        let mut results: Vec<Option<Option<Vec<Decision>>>> = Vec::new();
        for _ in 0..total_pages {
            slices_by_index.push(None);
            results.push(None);
        }

        let mut queue = pages.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for _ in 0..self.config.concurrency {
            if let Some(page) = queue.next() {
                let start = page.index * page_size;
                let fps = exemplar_fps[start..start + page.positions.len()].to_vec();
                in_flight.push(self.run_page(
                    &cache,
                    &validator,
                    &token,
                    page,
                    fps,
                    records,
                    taxonomy,
                    dataset_id,
                    settings,
                ));
            }
        }

        let mut abort: Option<PageFailure> = None;
        while let Some((page, result)) = in_flight.next().await {
            let page_index = page.index;
            match result {
                PageResult::Hit(decisions) => {
                    report.cache_hits += 1;
                    results[page_index] = Some(Some(decisions));
                }
                PageResult::Fresh(decisions) => {
                    report.cache_misses += 1;
                    report.model_calls += 1;
                    results[page_index] = Some(Some(decisions));
                }
                PageResult::Failed(reason) => {
                    report.cache_misses += 1;
                    report.model_calls += 1;
                    error!(page_index, %reason, "page failed terminally");
                    let failure = PageFailure { page_index, reason };
                    if self.config.stop_on_error {
                        token.cancel();
                        abort = Some(failure);
                    } else {
                        report.failed_pages.push(failure);
                        results[page_index] = Some(None);
                    }
                }
                PageResult::Aborted => {
                    debug!(page_index, "page abandoned after cancellation");
                }
            }
            slices_by_index[page_index] = Some(page);

            if abort.is_none() {
                if let Some(next_page) = queue.next() {
                    let start = next_page.index * page_size;
                    let fps = exemplar_fps[start..start + next_page.positions.len()].to_vec();
                    in_flight.push(self.run_page(
                        &cache,
                        &validator,
                        &token,
                        next_page,
                        fps,
                        records,
                        taxonomy,
                        dataset_id,
                        settings,
                    ));
                }
            }
        }

        if let Some(failure) = abort {
            return Err(EngineError::PageFailed {
                page_index: failure.page_index,
                reason: failure.reason,
            });
        }

        let mut out = Vec::new();
        for (index, slice) in slices_by_index.into_iter().enumerate() {
            if let Some(page) = slice {
                if let Some(result) = results[index].take() {
                    out.push((page, result));
                }
            }
        }
        Ok(out)
    }

    /// One page from cache check through validation and cache write
    #[allow(clippy::too_many_arguments)]
    async fn run_page(
        &self,
        cache: &PageCache,
        validator: &ResponseValidator,
        token: &CancellationToken,
        page: PageSlice,
        fps: Vec<String>,
        records: &[CanonicalRecord],
        taxonomy: &[TaxonomyEntry],
        dataset_id: &str,
        settings: &str,
    ) -> (PageSlice, PageResult) {
        let result = tokio::select! {
            _ = token.cancelled() => PageResult::Aborted,
            result = self.page_decisions(cache, validator, &page, &fps, records, taxonomy, dataset_id, settings) => result,
        };
        (page, result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn page_decisions(
        &self,
        cache: &PageCache,
        validator: &ResponseValidator,
        page: &PageSlice,
        fps: &[String],
        records: &[CanonicalRecord],
        taxonomy: &[TaxonomyEntry],
        dataset_id: &str,
        settings: &str,
    ) -> PageResult {
        let key = PageKey {
            dataset_id: dataset_id.to_string(),
            page_size: self.config.page_size,
            page_index: page.index,
            settings_fingerprint: settings.to_string(),
        };

        match cache.read(&key, fps).await {
            Ok(Some(decisions)) => {
                debug!(page_index = page.index, "page cache hit");
                return PageResult::Hit(decisions);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(page_index = page.index, error = %e, "cache read failed, treating as miss");
            }
        }

        let exemplars: Vec<&CanonicalRecord> =
            page.positions.iter().map(|&p| &records[p]).collect();
        let request = prompt_builder::build_request(
            &self.config.model.model,
            &self.config.model.system_instructions,
            &exemplars,
            taxonomy,
        );

        let raw = match retry_transient(
            &self.config.retry,
            |e: &ClassifierError| e.is_transient(),
            || self.transport.classify(&request),
        )
        .await
        {
            Ok(raw) => raw,
            Err(RetryError::Exhausted { attempts, last }) => {
                return PageResult::Failed(format!(
                    "transient failures exhausted after {attempts} attempts: {last}"
                ));
            }
            Err(RetryError::Permanent(e)) => {
                return PageResult::Failed(format!("non-retryable failure: {e}"));
            }
        };

        let decisions = match validator.validate(&raw, page.positions.len()) {
            Ok(decisions) => decisions,
            Err(e) => return PageResult::Failed(format!("validation failed: {e}")),
        };

        // only validated pages are cached; a write failure is logged
        // but does not fail the page, the next run just re-calls
        if let Err(e) = cache.write(&key, fps, &decisions).await {
            warn!(page_index = page.index, error = %e, "page cache write failed");
        }
        PageResult::Fresh(decisions)
    }
}
