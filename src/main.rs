use axum::{
    routing::{get, post},
    Router,
};
use invoice_intake_rust::{
    api, create_pool, AppConfig, DistributionService, DocumentParser, IngestService,
    MappingService,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    let pool = create_pool(&config.database.url).await?;
    info!("Database pool created");

    let parser = DocumentParser::new(config.matching.default_tax_rate.clone());
    let ingest = Arc::new(IngestService::new(
        pool.clone(),
        parser,
        config.matching.duplicate_window_days,
    ));
    let mapping = Arc::new(MappingService::new(
        pool.clone(),
        config.matching.min_fuzzy_confidence,
    ));
    let distribution = Arc::new(DistributionService::new(pool));

    let ingest_routes = Router::new()
        .route("/api/documents", post(api::ingest_document))
        .route("/api/documents/:id/duplicates", get(api::find_duplicates))
        .route("/api/documents/:id/duplicate-of", post(api::mark_duplicate))
        .with_state(ingest);

    let mapping_routes = Router::new()
        .route("/api/mapping/suggest", post(api::suggest_mapping))
        .route("/api/mapping/learn", post(api::learn_mapping))
        .with_state(mapping);

    let distribution_routes = Router::new()
        .route("/api/documents/:id/distribute", post(api::distribute))
        .route("/api/documents/:id/redistribute", post(api::redistribute))
        .route("/api/documents/:id/history", get(api::distribution_history))
        .with_state(distribution);

    let app = Router::new()
        .route("/health", get(api::health_check))
        .merge(ingest_routes)
        .merge(mapping_routes)
        .merge(distribution_routes)
        .layer(ServiceBuilder::new());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/documents                    - ingest raw document bytes");
    info!("  GET  /api/documents/:id/duplicates     - near-duplicate suggestions");
    info!("  POST /api/documents/:id/duplicate-of   - manual duplicate marking");
    info!("  POST /api/documents/:id/distribute     - initial allocation");
    info!("  POST /api/documents/:id/redistribute   - replace allocation batch");
    info!("  GET  /api/documents/:id/history        - allocation audit trail");
    info!("  POST /api/mapping/suggest              - alias/fuzzy name suggestion");
    info!("  POST /api/mapping/learn                - record a confirmed mapping");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
