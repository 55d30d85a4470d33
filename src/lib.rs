//! Construction Lead Pipeline Library
//!
//! Turns raw records from news feeds, JSON APIs and inline submissions
//! into validated, deduplicated, enriched and prioritized construction
//! leads, then stores them.
//!
//! # Modules
//!
//! - `normalizer`: Markup stripping, ASCII folding and abbreviation expansion.
//! - `gazetteer`: Target-market matching and location normalization.
//! - `timeline`: Date mentions, date categories and project phase.
//! - `extraction`: `FieldExtractor` trait and the rule-based extractor.
//! - `record_builder`: Raw record to `Lead`.
//! - `validator`: Seven-step lead validation.
//! - `dedup`: Fingerprints, fuzzy matching and the duplicate cache.
//! - `enrichment`: Contact hygiene and gap filling.
//! - `scoring`: 0-100 priority scoring.
//! - `sources`: `LeadSource` trait with feed, API and static adapters.
//! - `storage`: `LeadStore` trait and the in-memory store.
//! - `db`: Database connection and schema.
//! - `db_storage`: Postgres lead store.
//! - `circuit_breaker`: Breaker guarding storage batches.
//! - `pipeline`: Staged orchestration over many sources.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod dedup;
pub mod enrichment;
pub mod errors;
pub mod extraction;
pub mod gazetteer;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod record_builder;
pub mod scoring;
pub mod sources;
pub mod storage;
pub mod timeline;
pub mod validator;
