use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_lead_pipeline::config::Config;
use rust_lead_pipeline::db::Database;
use rust_lead_pipeline::db_storage::PgLeadStorage;
use rust_lead_pipeline::handlers::{self, AppState};
use rust_lead_pipeline::pipeline::PipelineOrchestrator;
use rust_lead_pipeline::storage::{LeadStore, MemoryLeadStore};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the lead store (Postgres when
/// `DB_URL` is set, in-memory otherwise), the pipeline and its duplicate
/// cache, then serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_lead_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Invalid configuration aborts startup
    let config = Config::from_env()?;

    let store: Arc<dyn LeadStore> = match &config.database_url {
        Some(url) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            Arc::new(PgLeadStorage::new(db.pool))
        }
        None => Arc::new(MemoryLeadStore::new()),
    };

    let pipeline = Arc::new(PipelineOrchestrator::new(config.pipeline.clone(), store.clone()));
    if let Err(e) = pipeline.initialize().await {
        tracing::warn!("Could not seed dedup cache, starting empty: {}", e);
    }

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    // Identical run bodies within 5 minutes are rejected
    let recent_batches = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();

    let app_state = Arc::new(AppState {
        config: config.clone(),
        pipeline,
        store,
        http,
        recent_batches,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/pipeline/run", post(handlers::run_pipeline))
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/recent", get(handlers::recent_leads))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
