use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::SourceType;

/// Process-level configuration, built once at startup and passed down.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres URL; the service falls back to the in-memory store when unset.
    pub database_url: Option<String>,
    pub port: u16,
    pub pipeline: PipelineConfig,
}

/// Retry policy applied around each network-bound extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Per-source-type wall-clock budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub rss: Duration,
    pub website: Duration,
    pub api: Duration,
    pub legal_document: Duration,
    pub nlp: Duration,
}

impl TimeoutConfig {
    pub fn for_source(&self, source_type: SourceType) -> Duration {
        match source_type {
            SourceType::Rss | SourceType::Manual => self.rss,
            SourceType::Website => self.website,
            SourceType::Api => self.api,
            SourceType::LegalDocument => self.legal_document,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            rss: Duration::from_secs(30),
            website: Duration::from_secs(60),
            api: Duration::from_secs(60),
            legal_document: Duration::from_secs(120),
            nlp: Duration::from_secs(30),
        }
    }
}

/// Enable flags for the optional stages. Extraction always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageToggles {
    pub filtering: bool,
    pub deduplication: bool,
    pub enrichment: bool,
    pub prioritization: bool,
    pub storage: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            filtering: true,
            deduplication: true,
            enrichment: true,
            prioritization: true,
            storage: true,
        }
    }
}

/// Everything the pipeline components read, flattened from env vars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub target_markets: Vec<String>,
    pub target_sectors: Vec<String>,
    pub regional_aliases: Vec<String>,
    /// Sources whose leads are rejected outright when the location misses.
    pub critical_location_sources: Vec<String>,
    pub stages: StageToggles,
    pub min_confidence: f64,
    pub similarity_threshold: f64,
    pub intent_threshold: f64,
    pub max_age_days: i64,
    pub dedup_lookback_days: i64,
    pub dedup_cache_size: usize,
    pub worker_pool_size: usize,
    pub storage_batch_size: usize,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_markets: to_strings(&[
                "California",
                "Los Angeles County",
                "Orange County",
                "San Diego County",
                "Riverside County",
                "San Bernardino County",
                "Ventura County",
                "Los Angeles",
                "Santa Monica",
                "Pasadena",
                "Long Beach",
                "Irvine",
                "Anaheim",
                "San Diego",
            ]),
            target_sectors: to_strings(&[
                "healthcare",
                "education",
                "energy",
                "commercial",
                "entertainment",
            ]),
            regional_aliases: to_strings(&[
                "Southern California",
                "SoCal",
                "Greater Los Angeles",
                "Inland Empire",
                "South Bay",
                "San Fernando Valley",
            ]),
            critical_location_sources: Vec::new(),
            stages: StageToggles::default(),
            min_confidence: 0.3,
            similarity_threshold: 0.85,
            intent_threshold: 0.6,
            max_age_days: 14,
            dedup_lookback_days: 30,
            dedup_cache_size: 1000,
            worker_pool_size: 4,
            storage_batch_size: 50,
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .ok()
                .map(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            pipeline: PipelineConfig::from_env()?,
        };

        tracing::info!("Configuration loaded successfully");
        if let Some(ref url) = config.database_url {
            tracing::debug!("Database URL: {}...", &url[..20.min(url.len())]);
        } else {
            tracing::warn!("No DB_URL configured, leads will be kept in memory");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

impl PipelineConfig {
    /// Reads every pipeline key, falling back to the documented defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            target_markets: env_list("TARGET_MARKETS").unwrap_or(defaults.target_markets),
            target_sectors: env_list("TARGET_SECTORS").unwrap_or(defaults.target_sectors),
            regional_aliases: env_list("REGIONAL_ALIASES").unwrap_or(defaults.regional_aliases),
            critical_location_sources: env_list("CRITICAL_LOCATION_SOURCES")
                .unwrap_or(defaults.critical_location_sources),
            stages: StageToggles {
                filtering: env_parse("STAGE_FILTERING", defaults.stages.filtering)?,
                deduplication: env_parse("STAGE_DEDUPLICATION", defaults.stages.deduplication)?,
                enrichment: env_parse("STAGE_ENRICHMENT", defaults.stages.enrichment)?,
                prioritization: env_parse("STAGE_PRIORITIZATION", defaults.stages.prioritization)?,
                storage: env_parse("STAGE_STORAGE", defaults.stages.storage)?,
            },
            min_confidence: env_parse("MIN_CONFIDENCE", defaults.min_confidence)?,
            similarity_threshold: env_parse("SIMILARITY_THRESHOLD", defaults.similarity_threshold)?,
            intent_threshold: env_parse("INTENT_THRESHOLD", defaults.intent_threshold)?,
            max_age_days: env_parse("MAX_AGE_DAYS", defaults.max_age_days)?,
            dedup_lookback_days: env_parse("DEDUP_LOOKBACK_DAYS", defaults.dedup_lookback_days)?,
            dedup_cache_size: env_parse("DEDUP_CACHE_SIZE", defaults.dedup_cache_size)?,
            worker_pool_size: env_parse("WORKER_POOL_SIZE", defaults.worker_pool_size)?,
            storage_batch_size: env_parse("STORAGE_BATCH_SIZE", defaults.storage_batch_size)?,
            retry: RetryPolicy {
                max_attempts: env_parse("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                backoff_factor: env_parse("RETRY_BACKOFF_FACTOR", defaults.retry.backoff_factor)?,
                initial_delay: Duration::from_millis(env_parse(
                    "RETRY_INITIAL_DELAY_MS",
                    defaults.retry.initial_delay.as_millis() as u64,
                )?),
                max_delay: Duration::from_millis(env_parse(
                    "RETRY_MAX_DELAY_MS",
                    defaults.retry.max_delay.as_millis() as u64,
                )?),
            },
            timeouts: TimeoutConfig {
                rss: env_secs("TIMEOUT_RSS_SECS", defaults.timeouts.rss)?,
                website: env_secs("TIMEOUT_WEBSITE_SECS", defaults.timeouts.website)?,
                api: env_secs("TIMEOUT_API_SECS", defaults.timeouts.api)?,
                legal_document: env_secs("TIMEOUT_LEGAL_SECS", defaults.timeouts.legal_document)?,
                nlp: env_secs("NLP_TIMEOUT_SECS", defaults.timeouts.nlp)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values no component can work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("MIN_CONFIDENCE", self.min_confidence),
            ("SIMILARITY_THRESHOLD", self.similarity_threshold),
            ("INTENT_THRESHOLD", self.intent_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be between 0.0 and 1.0, got {}", name, value);
            }
        }
        if self.worker_pool_size == 0 {
            anyhow::bail!("WORKER_POOL_SIZE must be at least 1");
        }
        if self.storage_batch_size == 0 {
            anyhow::bail!("STORAGE_BATCH_SIZE must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if self.retry.backoff_factor < 1.0 {
            anyhow::bail!("RETRY_BACKOFF_FACTOR must be >= 1.0");
        }
        if self.max_age_days < 0 || self.dedup_lookback_days < 0 {
            anyhow::bail!("MAX_AGE_DAYS and DEDUP_LOOKBACK_DAYS cannot be negative");
        }
        Ok(())
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| parse_list(&raw))
}

/// Splits a comma-separated value, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        _ => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> anyhow::Result<Duration> {
    env_parse(key, default.as_secs()).map(Duration::from_secs)
}
