use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        source TEXT NOT NULL,
        market_sector TEXT,
        status TEXT NOT NULL,
        priority_score SMALLINT NOT NULL DEFAULT 0,
        confidence_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        retrieved_date TIMESTAMPTZ NOT NULL,
        payload JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leads_retrieved_date ON leads (retrieved_date DESC)",
    "CREATE INDEX IF NOT EXISTS idx_leads_sector_priority ON leads (market_sector, priority_score DESC)",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connects and makes sure the `leads` table exists.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        tracing::info!("✓ Database schema ready");

        Ok(Self { pool })
    }
}
