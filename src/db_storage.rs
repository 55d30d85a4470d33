use crate::errors::{AppError, ResultExt};
use crate::models::Lead;
use crate::storage::{LeadQuery, LeadStore, StoreOutcome};
use async_trait::async_trait;
use sqlx::PgPool;

/// Postgres-backed lead store.
///
/// The full lead lives in `payload`; the other columns are copies used for
/// filtering and ordering.
pub struct PgLeadStorage {
    pool: PgPool,
}

impl PgLeadStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update a single lead
    async fn upsert_lead(&self, lead: &Lead) -> Result<(), AppError> {
        let payload = serde_json::to_value(lead).map_err(|e| {
            AppError::InternalError(format!("Failed to serialize lead {}: {}", lead.id(), e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO leads (
                id, title, source, market_sector, status,
                priority_score, confidence_score, retrieved_date, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                market_sector = EXCLUDED.market_sector,
                status = EXCLUDED.status,
                priority_score = EXCLUDED.priority_score,
                confidence_score = EXCLUDED.confidence_score,
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(lead.id())
        .bind(&lead.title)
        .bind(&lead.source)
        .bind(lead.market_sector.map(|s| s.as_str()))
        .bind(lead.status.as_str())
        .bind(i16::from(lead.priority_score()))
        .bind(lead.confidence_score())
        .bind(lead.retrieved_date())
        .bind(payload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert lead {}", lead.id()))?;

        Ok(())
    }
}

fn decode_payloads(rows: Vec<(serde_json::Value,)>) -> Vec<Lead> {
    rows.into_iter()
        .filter_map(|(payload,)| match serde_json::from_value::<Lead>(payload) {
            Ok(lead) => Some(lead),
            Err(e) => {
                tracing::warn!("Skipping unreadable stored lead: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl LeadStore for PgLeadStorage {
    async fn get_recent_leads(&self, days: i64, limit: usize) -> Result<Vec<Lead>, AppError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT payload FROM leads
            WHERE retrieved_date >= NOW() - make_interval(days => $1)
            ORDER BY retrieved_date DESC
            LIMIT $2
            "#,
        )
        .bind(i32::try_from(days).unwrap_or(i32::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent leads")?;

        Ok(decode_payloads(rows))
    }

    async fn store_leads(&self, leads: &[Lead]) -> Result<StoreOutcome, AppError> {
        let mut outcome = StoreOutcome::default();
        for lead in leads {
            match self.upsert_lead(lead).await {
                Ok(()) => outcome.success_count += 1,
                Err(e) => {
                    tracing::error!(lead_id = %lead.id(), "❌ Failed to store lead: {}", e);
                    outcome.error_count += 1;
                    outcome.failed_ids.push(lead.id().to_string());
                }
            }
        }

        // Every row failing usually means the database itself is down.
        if outcome.success_count == 0 && outcome.error_count > 0 {
            return Err(AppError::InternalError(format!(
                "All {} leads in batch failed to store",
                outcome.error_count
            )));
        }

        tracing::info!(
            "✓ Stored {} leads ({} failed)",
            outcome.success_count,
            outcome.error_count
        );
        Ok(outcome)
    }

    async fn query_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, AppError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT payload FROM leads
            WHERE ($1::TEXT IS NULL OR market_sector = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND priority_score >= $3
            ORDER BY priority_score DESC, retrieved_date DESC
            LIMIT $4
            "#,
        )
        .bind(query.sector.map(|s| s.as_str()))
        .bind(query.status.map(|s| s.as_str()))
        .bind(i16::from(query.min_priority.unwrap_or(0)))
        .bind(query.effective_limit() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(decode_payloads(rows))
    }
}
