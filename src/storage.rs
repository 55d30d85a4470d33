use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{Lead, LeadStatus, MarketSector};

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Result of one `store_leads` call. Partial success is normal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreOutcome {
    pub success_count: usize,
    pub error_count: usize,
    /// Ids of the leads counted in `error_count`.
    pub failed_ids: Vec<String>,
}

impl StoreOutcome {
    pub fn merge(&mut self, other: StoreOutcome) {
        self.success_count += other.success_count;
        self.error_count += other.error_count;
        self.failed_ids.extend(other.failed_ids);
    }

    /// Counts a whole batch as failed.
    pub fn fail_all(&mut self, leads: &[Lead]) {
        self.error_count += leads.len();
        self.failed_ids.extend(leads.iter().map(|l| l.id().to_string()));
    }
}

/// Filters for listing stored leads, highest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LeadQuery {
    pub sector: Option<MarketSector>,
    pub status: Option<LeadStatus>,
    pub min_priority: Option<u8>,
    pub limit: Option<usize>,
}

impl LeadQuery {
    pub fn matches(&self, lead: &Lead) -> bool {
        self.sector.map_or(true, |s| lead.market_sector == Some(s))
            && self.status.map_or(true, |s| lead.status == s)
            && self.min_priority.map_or(true, |p| lead.priority_score() >= p)
    }

    /// Requested limit clamped to `1..=MAX_QUERY_LIMIT`.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }
}

/// Persistence for finished leads.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Leads retrieved within the last `days`, newest first.
    async fn get_recent_leads(&self, days: i64, limit: usize) -> Result<Vec<Lead>, AppError>;

    /// Upserts by id. One bad lead does not fail the others.
    async fn store_leads(&self, leads: &[Lead]) -> Result<StoreOutcome, AppError>;

    async fn query_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, AppError>;
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryLeadStore {
    leads: RwLock<Vec<Lead>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn get_recent_leads(&self, days: i64, limit: usize) -> Result<Vec<Lead>, AppError> {
        let cutoff = Utc::now() - Duration::days(days);
        let leads = self.leads.read().await;
        let mut recent: Vec<Lead> = leads
            .iter()
            .filter(|lead| lead.retrieved_date() >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.retrieved_date().cmp(&a.retrieved_date()));
        recent.truncate(limit);
        Ok(recent)
    }

    async fn store_leads(&self, batch: &[Lead]) -> Result<StoreOutcome, AppError> {
        let mut leads = self.leads.write().await;
        for lead in batch {
            match leads.iter_mut().find(|existing| existing.id() == lead.id()) {
                Some(existing) => *existing = lead.clone(),
                None => leads.push(lead.clone()),
            }
        }
        Ok(StoreOutcome {
            success_count: batch.len(),
            ..Default::default()
        })
    }

    async fn query_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, AppError> {
        let leads = self.leads.read().await;
        let mut found: Vec<Lead> = leads.iter().filter(|lead| query.matches(lead)).cloned().collect();
        found.sort_by(|a, b| {
            b.priority_score()
                .cmp(&a.priority_score())
                .then_with(|| b.retrieved_date().cmp(&a.retrieved_date()))
        });
        found.truncate(query.effective_limit());
        Ok(found)
    }
}
