/// End-to-end scenarios for building and validating leads
use chrono::{Duration, Utc};
use rust_lead_pipeline::config::PipelineConfig;
use rust_lead_pipeline::dedup::Deduplicator;
use rust_lead_pipeline::extraction::{FieldExtractor, RuleBasedExtractor};
use rust_lead_pipeline::gazetteer::Gazetteer;
use rust_lead_pipeline::models::{Lead, MarketSector, RawRecord, SourceDescriptor, SourceType};
use rust_lead_pipeline::pipeline::{PipelineOrchestrator, PipelineStage};
use rust_lead_pipeline::record_builder::RecordBuilder;
use rust_lead_pipeline::sources::{LeadSource, StaticSource};
use rust_lead_pipeline::storage::{LeadQuery, LeadStore, MemoryLeadStore};
use rust_lead_pipeline::validator::{LeadValidator, NO_CONTACTS_MESSAGE};
use std::sync::Arc;

const TITLE: &str = "Santa Monica Medical Center Expansion";
const DESCRIPTION: &str = "Providence Health plans to begin a $45 million expansion of its \
    hospital in Santa Monica, CA in July 2023. The project adds a patient tower with surgical \
    suites, an emergency department and outpatient clinic space for the medical center.";

struct Harness {
    extractor: Arc<RuleBasedExtractor>,
    builder: RecordBuilder,
    validator: LeadValidator,
}

fn harness() -> Harness {
    let config = PipelineConfig::default();
    let gazetteer = Arc::new(Gazetteer::from_config(&config));
    let extractor = Arc::new(RuleBasedExtractor::new(gazetteer.clone()));
    Harness {
        builder: RecordBuilder::new(extractor.clone()),
        validator: LeadValidator::new(&config, gazetteer, extractor.clone()),
        extractor,
    }
}

fn descriptor() -> SourceDescriptor {
    SourceDescriptor::new("socal-news", SourceType::Rss).with_url("https://example.com/feed")
}

fn clean_record() -> RawRecord {
    RawRecord::new(TITLE, DESCRIPTION).with_url("https://example.com/1")
}

fn build(h: &Harness, record: &RawRecord) -> Lead {
    h.builder.build(record, &descriptor()).expect("record has a title")
}

#[test]
fn clean_lead_validates_as_healthcare() {
    let h = harness();
    let mut lead = build(&h, &clean_record());

    let (sector, confidence) = h
        .extractor
        .classify_market_sector(&format!("{}. {}", lead.title, lead.description));
    assert_eq!(sector, MarketSector::Healthcare);
    assert!(confidence > 0.5, "healthcare confidence {confidence}");

    let outcome = h.validator.validate(&mut lead);
    assert!(outcome.is_valid, "{:?}", outcome.messages);
    assert_eq!(lead.market_sector, Some(MarketSector::Healthcare));
    let value = lead.estimated_value.expect("value extracted");
    assert!((value - 45_000_000.0).abs() < 1.0);
}

#[test]
fn same_lead_twice_leaves_one_survivor() {
    let h = harness();
    let first = build(&h, &clean_record());
    let second = build(&h, &clean_record());
    assert_ne!(first.id(), second.id());

    let survivors = Deduplicator::new(0.85, 30, 1000).deduplicate(vec![first, second]);
    assert_eq!(survivors.len(), 1);
}

#[test]
fn stale_lead_passes_with_penalty() {
    let h = harness();
    let mut fresh = build(&h, &clean_record());
    let mut stale = build(
        &h,
        &clean_record().with_published_date(Utc::now() - Duration::days(60)),
    );

    let fresh_outcome = h.validator.validate(&mut fresh);
    let stale_outcome = h.validator.validate(&mut stale);

    assert!(stale_outcome.is_valid, "{:?}", stale_outcome.messages);
    assert!(stale_outcome
        .messages
        .iter()
        .any(|m| m.contains("older than 14 days")));
    assert!(stale_outcome.confidence < fresh_outcome.confidence);
}

#[test]
fn missing_contacts_is_only_advisory() {
    let h = harness();
    let mut lead = build(&h, &clean_record());
    assert!(lead.contacts.is_empty());

    let outcome = h.validator.validate(&mut lead);
    assert!(outcome.is_valid);
    assert!(outcome.messages.iter().any(|m| m == NO_CONTACTS_MESSAGE));
}

#[tokio::test]
async fn stored_leads_are_queryable_by_sector() {
    let store = Arc::new(MemoryLeadStore::new());
    let pipeline = PipelineOrchestrator::new(PipelineConfig::default(), store.clone());
    let source: Arc<dyn LeadSource> = Arc::new(StaticSource::new(
        descriptor(),
        vec![clean_record(), clean_record()],
    ));

    let report = pipeline.process_sources(vec![source]).await;
    assert_eq!(report.metrics.leads_extracted, 2);
    assert_eq!(report.metrics.leads_deduplicated, 1);
    assert_eq!(report.metrics.leads_stored, 1);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].stage, PipelineStage::Deduplication);

    let healthcare = LeadQuery {
        sector: Some(MarketSector::Healthcare),
        ..Default::default()
    };
    let found = store.query_leads(&healthcare).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, TITLE);
    assert!(found[0].priority_score() > 0);

    let education = LeadQuery {
        sector: Some(MarketSector::Education),
        ..Default::default()
    };
    assert!(store.query_leads(&education).await.unwrap().is_empty());
}
