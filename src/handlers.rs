use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Lead, RawRecord, SourceDescriptor};
use crate::pipeline::{PipelineOrchestrator, PipelineReport};
use crate::sources::build_source_or_unavailable;
use crate::storage::{LeadQuery, LeadStore, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const DEFAULT_RECENT_DAYS: i64 = 7;
const MAX_RECENT_DAYS: i64 = 365;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    pub pipeline: Arc<PipelineOrchestrator>,
    pub store: Arc<dyn LeadStore>,
    /// Shared client for feed and API sources.
    pub http: reqwest::Client,
    /// Hashes of recently submitted run bodies (5 minute TTL). A repeat
    /// within the window is rejected with 409.
    pub recent_batches: Cache<String, ()>,
}

/// One source in a run request. Inline `records` bypass fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRequest {
    pub descriptor: SourceDescriptor,
    #[serde(default)]
    pub records: Option<Vec<RawRecord>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub sources: Vec<SourceRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub days: Option<i64>,
    pub limit: Option<usize>,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-lead-pipeline",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": if state.config.database_url.is_some() { "postgres" } else { "memory" },
            "dedup_cache_entries": state.pipeline.deduplicator().len(),
        })),
    )
}

/// Key for duplicate-submission detection.
pub fn batch_key(request: &RunRequest) -> Result<String, AppError> {
    let body = serde_json::to_vec(request)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize run request: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&body)))
}

/// POST /api/v1/pipeline/run
///
/// Runs the pipeline over the submitted sources and returns the report.
/// Sources that cannot be served show up as failed in the report rather
/// than failing the request.
pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<PipelineReport>, AppError> {
    if request.sources.is_empty() {
        return Err(AppError::BadRequest("At least one source is required".to_string()));
    }

    let key = batch_key(&request)?;
    let entry = state.recent_batches.entry(key.clone()).or_insert(()).await;
    if !entry.is_fresh() {
        tracing::warn!("Rejecting repeated batch {}", &key[..12]);
        return Err(AppError::Conflict(
            "An identical batch was submitted in the last 5 minutes".to_string(),
        ));
    }

    tracing::info!("POST /pipeline/run - {} sources (batch {})", request.sources.len(), &key[..12]);

    let sources = request
        .sources
        .into_iter()
        .map(|s| build_source_or_unavailable(s.descriptor, &state.http, s.records))
        .collect();
    let report = state.pipeline.process_sources(sources).await;

    Ok(Json(report))
}

/// GET /api/v1/leads?sector=&status=&min_priority=&limit=
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeadQuery>,
) -> Result<Json<Vec<Lead>>, AppError> {
    if query.min_priority.is_some_and(|p| p > 100) {
        return Err(AppError::BadRequest("min_priority must be between 0 and 100".to_string()));
    }
    if query.limit.is_some_and(|l| l > MAX_QUERY_LIMIT) {
        return Err(AppError::BadRequest(format!("limit cannot exceed {}", MAX_QUERY_LIMIT)));
    }

    let leads = state.store.query_leads(&query).await?;
    tracing::debug!("GET /leads - {:?} -> {} leads", query, leads.len());
    Ok(Json(leads))
}

/// GET /api/v1/leads/recent?days=&limit=
pub async fn recent_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_RECENT_DAYS);
    if !(1..=MAX_RECENT_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_RECENT_DAYS
        )));
    }
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT).clamp(1, MAX_QUERY_LIMIT);

    let leads = state.store.get_recent_leads(days, limit).await?;
    Ok(Json(leads))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn request(name: &str) -> RunRequest {
        RunRequest {
            sources: vec![SourceRequest {
                descriptor: SourceDescriptor::new(name, SourceType::Manual),
                records: Some(vec![RawRecord::new("Clinic addition", "A clinic addition.")]),
            }],
        }
    }

    #[test]
    fn batch_key_is_stable_and_content_sensitive() {
        let a = batch_key(&request("a")).unwrap();
        assert_eq!(a, batch_key(&request("a")).unwrap());
        assert_ne!(a, batch_key(&request("b")).unwrap());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn run_request_accepts_missing_records() {
        let parsed: RunRequest = serde_json::from_value(json!({
            "sources": [{"descriptor": {"name": "feed", "source_type": "rss", "url": "https://x.test/rss"}}]
        }))
        .unwrap();
        assert!(parsed.sources[0].records.is_none());
        assert_eq!(parsed.sources[0].descriptor.source_type, SourceType::Rss);
    }
}
