//! Staged lead pipeline.
//!
//! Extraction fans out over the sources on a bounded worker pool. Every
//! later stage runs sequentially over the union of extracted leads:
//! filtering, deduplication, enrichment, prioritization, storage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::circuit_breaker::create_storage_circuit_breaker;
use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::enrichment::LeadEnricher;
use crate::errors::AppError;
use crate::extraction::{FieldExtractor, RuleBasedExtractor};
use crate::gazetteer::Gazetteer;
use crate::models::{Lead, LeadStatus, RawRecord, SourceDescriptor};
use crate::record_builder::RecordBuilder;
use crate::scoring::Scorer;
use crate::sources::{FetchedRecords, LeadSource};
use crate::storage::{LeadStore, StoreOutcome};
use crate::validator::LeadValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extraction,
    Filtering,
    Deduplication,
    Enrichment,
    Prioritization,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded,
    Failed,
}

/// Outcome of extracting one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub name: String,
    pub source_type: String,
    pub status: SourceStatus,
    pub attempts: u32,
    pub records_fetched: usize,
    /// Items in the response that could not be read as records.
    pub records_rejected: usize,
    pub leads_built: usize,
    /// [`AppError::kind`] of the failure.
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A lead (or record) that left the pipeline early.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedLead {
    /// `None` for records that never became a lead.
    pub lead_id: Option<String>,
    pub title: Option<String>,
    pub source: String,
    pub stage: PipelineStage,
    pub reason: String,
}

impl DroppedLead {
    fn from_lead(lead: &Lead, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            lead_id: Some(lead.id().to_string()),
            title: Some(lead.title.clone()),
            source: lead.source.clone(),
            stage,
            reason: reason.into(),
        }
    }
}

/// Counters for one run. `leads_filtered` and `leads_deduplicated` count
/// the leads those stages removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetrics {
    pub sources_processed: usize,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    pub leads_extracted: usize,
    pub leads_filtered: usize,
    pub leads_deduplicated: usize,
    pub leads_enriched: usize,
    pub leads_stored: usize,
    pub leads_failed_to_store: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub sources: Vec<SourceResult>,
    pub metrics: PipelineMetrics,
    /// Leads that made it through every enabled stage.
    pub leads: Vec<Lead>,
    pub dropped: Vec<DroppedLead>,
}

struct Extracted {
    result: SourceResult,
    leads: Vec<Lead>,
    dropped: Vec<DroppedLead>,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    builder: RecordBuilder,
    validator: LeadValidator,
    dedup: Arc<Deduplicator>,
    enricher: LeadEnricher,
    scorer: Scorer,
    store: Arc<dyn LeadStore>,
}

impl PipelineOrchestrator {
    /// Orchestrator using the rule-based extractor.
    pub fn new(config: PipelineConfig, store: Arc<dyn LeadStore>) -> Self {
        let gazetteer = Arc::new(Gazetteer::from_config(&config));
        let extractor: Arc<dyn FieldExtractor> = Arc::new(RuleBasedExtractor::new(gazetteer.clone()));
        Self::with_extractor(config, store, gazetteer, extractor)
    }

    pub fn with_extractor(
        config: PipelineConfig,
        store: Arc<dyn LeadStore>,
        gazetteer: Arc<Gazetteer>,
        extractor: Arc<dyn FieldExtractor>,
    ) -> Self {
        let dedup = Arc::new(Deduplicator::from_config(&config));
        let validator = LeadValidator::new(&config, gazetteer.clone(), extractor.clone())
            .with_deduplicator(dedup.clone());
        Self {
            builder: RecordBuilder::new(extractor.clone()),
            validator,
            enricher: LeadEnricher::new(extractor),
            scorer: Scorer::new(&config, gazetteer),
            dedup,
            store,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Seeds the duplicate cache from recently stored leads. Returns how
    /// many leads were loaded.
    pub async fn initialize(&self) -> Result<usize, AppError> {
        let history = self
            .store
            .get_recent_leads(self.dedup.lookback_days(), self.dedup.max_size())
            .await?;
        self.dedup.seed_from_history(&history);
        tracing::info!(
            "✓ Dedup cache seeded with {} leads from the last {} days",
            history.len(),
            self.dedup.lookback_days()
        );
        Ok(history.len())
    }

    /// Runs every enabled stage over the given sources.
    ///
    /// Source failures are reported per source and never abort the run.
    pub async fn process_sources(&self, sources: Vec<Arc<dyn LeadSource>>) -> PipelineReport {
        let started = Instant::now();
        let workers = self.config.worker_pool_size.max(1);
        tracing::info!("Starting pipeline run over {} sources ({} workers)", sources.len(), workers);

        let tasks: Vec<_> = sources
            .into_iter()
            .enumerate()
            .map(|(idx, source)| self.extract_indexed(idx, source))
            .collect();
        let mut extracted: Vec<(usize, Extracted)> =
            stream::iter(tasks).buffer_unordered(workers).collect().await;
        extracted.sort_by_key(|(idx, _)| *idx);

        let mut metrics = PipelineMetrics::default();
        let mut source_results = Vec::with_capacity(extracted.len());
        let mut leads = Vec::new();
        let mut dropped = Vec::new();
        for (_, batch) in extracted {
            metrics.sources_processed += 1;
            match batch.result.status {
                SourceStatus::Succeeded => metrics.sources_succeeded += 1,
                SourceStatus::Failed => metrics.sources_failed += 1,
            }
            source_results.push(batch.result);
            leads.extend(batch.leads);
            dropped.extend(batch.dropped);
        }
        metrics.leads_extracted = leads.len();

        let leads = self.filter(leads, &mut metrics, &mut dropped);
        let mut leads = self.deduplicate(leads, &mut metrics, &mut dropped);

        if self.config.stages.enrichment {
            for lead in leads.iter_mut() {
                self.enricher.enrich(lead);
            }
            metrics.leads_enriched = leads.len();
        }

        if self.config.stages.prioritization {
            for lead in leads.iter_mut() {
                self.scorer.apply(lead);
            }
            leads.sort_by(|a, b| b.priority_score().cmp(&a.priority_score()));
        }

        let mut failed_ids: HashSet<String> = HashSet::new();
        if self.config.stages.storage {
            let outcome = self.store(&leads).await;
            metrics.leads_stored = outcome.success_count;
            metrics.leads_failed_to_store = outcome.error_count;
            failed_ids.extend(outcome.failed_ids);
        }

        // Unstored leads stay out of the cache so a later run can store them.
        if failed_ids.is_empty() {
            self.dedup.remember(&leads);
        } else {
            let stored: Vec<Lead> = leads
                .iter()
                .filter(|l| !failed_ids.contains(l.id()))
                .cloned()
                .collect();
            self.dedup.remember(&stored);
        }
        let pruned = self.dedup.prune();
        if pruned > 0 {
            tracing::debug!("Pruned {} expired dedup entries", pruned);
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            sources = metrics.sources_processed,
            failed_sources = metrics.sources_failed,
            extracted = metrics.leads_extracted,
            filtered = metrics.leads_filtered,
            deduplicated = metrics.leads_deduplicated,
            stored = metrics.leads_stored,
            failed_to_store = metrics.leads_failed_to_store,
            duration_ms = metrics.duration_ms,
            "✓ Pipeline run complete"
        );

        PipelineReport {
            sources: source_results,
            metrics,
            leads,
            dropped,
        }
    }

    async fn extract_indexed(&self, idx: usize, source: Arc<dyn LeadSource>) -> (usize, Extracted) {
        (idx, self.extract_source(source).await)
    }

    async fn extract_source(&self, source: Arc<dyn LeadSource>) -> Extracted {
        let started = Instant::now();
        let descriptor = source.descriptor().clone();
        let mut result = SourceResult {
            name: descriptor.name.clone(),
            source_type: descriptor.source_type.as_str().to_string(),
            status: SourceStatus::Succeeded,
            attempts: 0,
            records_fetched: 0,
            records_rejected: 0,
            leads_built: 0,
            error_kind: None,
            error: None,
            duration_ms: 0,
        };

        let mut leads = Vec::new();
        let mut dropped = Vec::new();
        let fetched = self.fetch_with_retry(source.as_ref(), &mut result.attempts).await;
        let built = match fetched {
            Ok(FetchedRecords { records, rejected }) => {
                result.records_fetched = records.len();
                result.records_rejected = rejected.len();
                dropped.extend(rejected.into_iter().map(|reason| DroppedLead {
                    lead_id: None,
                    title: None,
                    source: descriptor.name.clone(),
                    stage: PipelineStage::Extraction,
                    reason,
                }));
                self.build_leads(records, descriptor.clone()).await
            }
            Err(e) => Err(e),
        };

        match built {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match outcome {
                        Ok(lead) => leads.push(lead),
                        Err(e) => {
                            tracing::warn!(source = %descriptor.name, "Dropping record: {}", e);
                            dropped.push(DroppedLead {
                                lead_id: None,
                                title: None,
                                source: descriptor.name.clone(),
                                stage: PipelineStage::Extraction,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                result.leads_built = leads.len();
                tracing::info!(
                    source = %descriptor.name,
                    records = result.records_fetched,
                    rejected = result.records_rejected,
                    leads = result.leads_built,
                    "✓ Source extracted"
                );
            }
            Err(e) => {
                tracing::error!(source = %descriptor.name, kind = e.kind(), "❌ Source failed: {}", e);
                result.status = SourceStatus::Failed;
                result.error_kind = Some(e.kind().to_string());
                result.error = Some(e.to_string());
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        Extracted {
            result,
            leads,
            dropped,
        }
    }

    /// Fetches under the per-source timeout, retrying transient failures
    /// with exponential backoff.
    async fn fetch_with_retry(
        &self,
        source: &dyn LeadSource,
        attempts: &mut u32,
    ) -> Result<FetchedRecords, AppError> {
        let descriptor = source.descriptor();
        let budget = self.config.timeouts.for_source(descriptor.source_type);
        let retry = &self.config.retry;

        loop {
            *attempts += 1;
            let error = match tokio::time::timeout(budget, source.fetch()).await {
                Ok(Ok(fetched)) => return Ok(fetched),
                Ok(Err(e)) => e,
                Err(_) => AppError::Timeout {
                    operation: format!("fetch from source '{}'", descriptor.name),
                    seconds: budget.as_secs(),
                },
            };

            if !error.is_retryable() || *attempts >= retry.max_attempts {
                return Err(error);
            }
            let delay = retry.delay_for(*attempts);
            tracing::warn!(
                source = %descriptor.name,
                attempt = *attempts,
                "Fetch failed, retrying in {:?}: {}",
                delay,
                error
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Builds leads on the blocking pool under the NLP timeout.
    async fn build_leads(
        &self,
        records: Vec<RawRecord>,
        descriptor: SourceDescriptor,
    ) -> Result<Vec<Result<Lead, AppError>>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let budget: Duration = self.config.timeouts.nlp;
        let builder = self.builder.clone();
        let name = descriptor.name.clone();
        let task = tokio::task::spawn_blocking(move || builder.build_batch(&records, &descriptor));

        match tokio::time::timeout(budget, task).await {
            Ok(Ok(outcomes)) => Ok(outcomes),
            Ok(Err(e)) => Err(AppError::InternalError(format!(
                "record building for '{name}' panicked: {e}"
            ))),
            Err(_) => Err(AppError::Timeout {
                operation: format!("build leads for source '{name}'"),
                seconds: budget.as_secs(),
            }),
        }
    }

    /// Validates every lead. Invalid leads are always dropped; the
    /// confidence floor applies when filtering is enabled.
    fn filter(
        &self,
        leads: Vec<Lead>,
        metrics: &mut PipelineMetrics,
        dropped: &mut Vec<DroppedLead>,
    ) -> Vec<Lead> {
        let before = leads.len();
        let mut kept = Vec::with_capacity(before);
        for mut lead in leads {
            let outcome = self.validator.validate(&mut lead);
            if !outcome.messages.is_empty() {
                lead.set_metadata("validation_notes", outcome.messages.join("; "));
            }

            if !outcome.is_valid {
                let reason = outcome
                    .rejection
                    .unwrap_or_else(|| "Failed validation".to_string());
                tracing::warn!(lead_id = %lead.id(), source = %lead.source, "Dropping invalid lead: {}", reason);
                dropped.push(DroppedLead::from_lead(&lead, PipelineStage::Filtering, reason));
                continue;
            }
            if self.config.stages.filtering && outcome.confidence < self.config.min_confidence {
                let reason = format!(
                    "Confidence {:.2} below minimum {:.2}",
                    outcome.confidence, self.config.min_confidence
                );
                tracing::debug!(lead_id = %lead.id(), "Filtering lead: {}", reason);
                dropped.push(DroppedLead::from_lead(&lead, PipelineStage::Filtering, reason));
                continue;
            }

            lead.status = LeadStatus::Qualified;
            kept.push(lead);
        }
        metrics.leads_filtered = before - kept.len();
        kept
    }

    fn deduplicate(
        &self,
        leads: Vec<Lead>,
        metrics: &mut PipelineMetrics,
        dropped: &mut Vec<DroppedLead>,
    ) -> Vec<Lead> {
        if !self.config.stages.deduplication {
            return leads;
        }
        let (kept, duplicates) = self.dedup.partition(leads);
        metrics.leads_deduplicated = duplicates.len();
        dropped.extend(duplicates.iter().map(|(lead, found)| {
            let reason = match &found.existing_id {
                Some(id) => format!("Duplicate of lead {id} (similarity {:.2})", found.similarity),
                None => format!("Duplicate (similarity {:.2})", found.similarity),
            };
            DroppedLead::from_lead(lead, PipelineStage::Deduplication, reason)
        }));
        kept
    }

    /// Stores in batches behind a circuit breaker. Once it opens, the
    /// remaining batches count as failed without being attempted.
    async fn store(&self, leads: &[Lead]) -> StoreOutcome {
        use failsafe::CircuitBreaker;

        let breaker = create_storage_circuit_breaker();
        let mut total = StoreOutcome::default();
        for chunk in leads.chunks(self.config.storage_batch_size.max(1)) {
            if !breaker.is_call_permitted() {
                tracing::warn!("Storage circuit open, skipping batch of {} leads", chunk.len());
                total.fail_all(chunk);
                continue;
            }

            let attempt = self.store.store_leads(chunk).await;
            match breaker.call(|| attempt) {
                Ok(outcome) => total.merge(outcome),
                Err(failsafe::Error::Inner(e)) => {
                    tracing::error!("❌ Failed to store batch of {} leads: {}", chunk.len(), e);
                    total.fail_all(chunk);
                }
                Err(failsafe::Error::Rejected) => {
                    tracing::warn!("Storage circuit open, batch of {} leads rejected", chunk.len());
                    total.fail_all(chunk);
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::sources::StaticSource;
    use crate::storage::MemoryLeadStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    const HOSPITAL: &str = "Providence Health plans to build a $45 million patient tower \
        expansion at its hospital in Santa Monica, CA. Construction will begin in July 2026.";

    fn hospital_record() -> RawRecord {
        RawRecord::new("Santa Monica Hospital Tower Expansion", HOSPITAL)
            .with_url("https://news.example.com/tower")
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retry.initial_delay = Duration::from_millis(1);
        config.retry.max_delay = Duration::from_millis(5);
        config
    }

    fn static_source(name: &str, records: Vec<RawRecord>) -> Arc<dyn LeadSource> {
        Arc::new(StaticSource::new(SourceDescriptor::new(name, SourceType::Manual), records))
    }

    /// Fails with a network error until `succeed_on`.
    struct FlakySource {
        descriptor: SourceDescriptor,
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl LeadSource for FlakySource {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn fetch(&self) -> Result<FetchedRecords, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(FetchedRecords::new(vec![hospital_record()]))
            } else {
                Err(AppError::ExternalApiError("connection reset".into()))
            }
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl LeadStore for BrokenStore {
        async fn get_recent_leads(&self, _: i64, _: usize) -> Result<Vec<Lead>, AppError> {
            Ok(Vec::new())
        }

        async fn store_leads(&self, _: &[Lead]) -> Result<StoreOutcome, AppError> {
            Err(AppError::InternalError("store unavailable".into()))
        }

        async fn query_leads(&self, _: &crate::storage::LeadQuery) -> Result<Vec<Lead>, AppError> {
            Ok(Vec::new())
        }
    }

    /// Rejects every batch while `down` is set, then behaves like the memory store.
    struct RecoveringStore {
        down: AtomicBool,
        inner: MemoryLeadStore,
    }

    #[async_trait]
    impl LeadStore for RecoveringStore {
        async fn get_recent_leads(&self, days: i64, limit: usize) -> Result<Vec<Lead>, AppError> {
            self.inner.get_recent_leads(days, limit).await
        }

        async fn store_leads(&self, leads: &[Lead]) -> Result<StoreOutcome, AppError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(AppError::InternalError("connection refused".into()));
            }
            self.inner.store_leads(leads).await
        }

        async fn query_leads(&self, query: &crate::storage::LeadQuery) -> Result<Vec<Lead>, AppError> {
            self.inner.query_leads(query).await
        }
    }

    #[tokio::test]
    async fn full_run_stores_scored_leads() {
        let store = Arc::new(MemoryLeadStore::new());
        let pipeline = PipelineOrchestrator::new(fast_config(), store.clone());

        let report = pipeline
            .process_sources(vec![static_source("socal-news", vec![hospital_record()])])
            .await;

        assert_eq!(report.metrics.sources_succeeded, 1);
        assert_eq!(report.metrics.leads_extracted, 1);
        assert_eq!(report.metrics.leads_stored, 1);
        assert_eq!(report.leads.len(), 1, "dropped: {:?}", report.dropped);
        let lead = &report.leads[0];
        assert_eq!(lead.status, LeadStatus::Enriched);
        assert!(lead.priority_score() > 0);
        assert_eq!(store.len().await, 1);
        assert_eq!(pipeline.deduplicator().len(), 1);
    }

    #[tokio::test]
    async fn repeated_lead_survives_once() {
        let pipeline = PipelineOrchestrator::new(fast_config(), Arc::new(MemoryLeadStore::new()));
        let report = pipeline
            .process_sources(vec![
                static_source("a", vec![hospital_record()]),
                static_source("b", vec![hospital_record()]),
            ])
            .await;

        assert_eq!(report.leads.len(), 1);
        assert_eq!(report.metrics.leads_deduplicated, 1);
        assert!(report
            .dropped
            .iter()
            .any(|d| d.stage == PipelineStage::Deduplication));
    }

    #[tokio::test]
    async fn second_run_rejects_already_seen_lead() {
        let pipeline = PipelineOrchestrator::new(fast_config(), Arc::new(MemoryLeadStore::new()));
        pipeline
            .process_sources(vec![static_source("a", vec![hospital_record()])])
            .await;
        let report = pipeline
            .process_sources(vec![static_source("a", vec![hospital_record()])])
            .await;

        assert!(report.leads.is_empty());
        assert_eq!(report.dropped[0].stage, PipelineStage::Filtering);
        assert!(report.dropped[0].reason.starts_with("Duplicate"));
    }

    #[tokio::test]
    async fn untitled_records_are_dropped_not_fatal() {
        let pipeline = PipelineOrchestrator::new(fast_config(), Arc::new(MemoryLeadStore::new()));
        let report = pipeline
            .process_sources(vec![static_source(
                "mixed",
                vec![RawRecord::default(), hospital_record()],
            )])
            .await;

        assert_eq!(report.sources[0].status, SourceStatus::Succeeded);
        assert_eq!(report.sources[0].records_fetched, 2);
        assert_eq!(report.leads.len(), 1);
        assert_eq!(report.dropped[0].stage, PipelineStage::Extraction);
        assert!(report.dropped[0].lead_id.is_none());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let pipeline = PipelineOrchestrator::new(fast_config(), Arc::new(MemoryLeadStore::new()));
        let flaky: Arc<dyn LeadSource> = Arc::new(FlakySource {
            descriptor: SourceDescriptor::new("flaky", SourceType::Api),
            calls: AtomicU32::new(0),
            succeed_on: 2,
        });
        let report = pipeline.process_sources(vec![flaky]).await;

        assert_eq!(report.sources[0].status, SourceStatus::Succeeded);
        assert_eq!(report.sources[0].attempts, 2);
        assert_eq!(report.leads.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_mark_source_failed() {
        let pipeline = PipelineOrchestrator::new(fast_config(), Arc::new(MemoryLeadStore::new()));
        let dead: Arc<dyn LeadSource> = Arc::new(FlakySource {
            descriptor: SourceDescriptor::new("dead", SourceType::Api),
            calls: AtomicU32::new(0),
            succeed_on: u32::MAX,
        });
        let report = pipeline
            .process_sources(vec![dead, static_source("ok", vec![hospital_record()])])
            .await;

        let failed = &report.sources[0];
        assert_eq!(failed.status, SourceStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.error_kind.as_deref(), Some("network"));
        assert_eq!(report.metrics.sources_failed, 1);
        assert_eq!(report.leads.len(), 1);
    }

    #[tokio::test]
    async fn storage_failures_are_counted() {
        let mut config = fast_config();
        config.storage_batch_size = 1;
        let pipeline = PipelineOrchestrator::new(config, Arc::new(BrokenStore));
        let report = pipeline
            .process_sources(vec![static_source("a", vec![hospital_record()])])
            .await;

        assert_eq!(report.metrics.leads_stored, 0);
        assert_eq!(report.metrics.leads_failed_to_store, 1);
        assert_eq!(report.leads.len(), 1);
        assert!(pipeline.deduplicator().is_empty());
    }

    #[tokio::test]
    async fn unstored_lead_is_stored_once_the_store_recovers() {
        let store = Arc::new(RecoveringStore {
            down: AtomicBool::new(true),
            inner: MemoryLeadStore::new(),
        });
        let pipeline = PipelineOrchestrator::new(fast_config(), store.clone());

        let first = pipeline
            .process_sources(vec![static_source("a", vec![hospital_record()])])
            .await;
        assert_eq!(first.metrics.leads_failed_to_store, 1);
        assert!(store.inner.is_empty().await);

        store.down.store(false, Ordering::SeqCst);
        let second = pipeline
            .process_sources(vec![static_source("a", vec![hospital_record()])])
            .await;

        assert_eq!(second.metrics.leads_stored, 1, "dropped: {:?}", second.dropped);
        assert_eq!(store.inner.len().await, 1);
        assert_eq!(pipeline.deduplicator().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_on_a_spawned_task() {
        let pipeline = Arc::new(PipelineOrchestrator::new(
            fast_config(),
            Arc::new(MemoryLeadStore::new()),
        ));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .process_sources(vec![
                        static_source("a", vec![hospital_record()]),
                        static_source("b", Vec::new()),
                    ])
                    .await
            })
        };
        let report = task.await.unwrap();

        assert_eq!(report.metrics.sources_succeeded, 2);
        assert_eq!(report.leads.len(), 1);
    }

    #[tokio::test]
    async fn initialize_seeds_dedup_from_store() {
        let store = Arc::new(MemoryLeadStore::new());
        let seed = PipelineOrchestrator::new(fast_config(), store.clone());
        seed.process_sources(vec![static_source("a", vec![hospital_record()])])
            .await;

        let restarted = PipelineOrchestrator::new(fast_config(), store);
        assert_eq!(restarted.initialize().await.unwrap(), 1);
        assert_eq!(restarted.deduplicator().len(), 1);
    }
}
