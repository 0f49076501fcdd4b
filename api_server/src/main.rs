//! API server binary.
//!
//! Run from repo root: `cargo run -p api-server`

use resource_api::{
    app, ensure_database_exists, ensure_schema, load_resources, resolve, seed_defaults, AppState, MemoryStore,
    PgStore, Registry, Settings, Store, TransformContext,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

async fn open_store(settings: &Settings) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    let Some(database_url) = settings.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    ensure_database_exists(database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(database_url)
        .await?;
    ensure_schema(&pool).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_api=info,tower_http=info")),
        )
        .init();

    let store = open_store(&settings).await?;
    seed_defaults(store.as_ref(), &settings).await?;

    let config = load_resources(settings.resources_path.as_deref())?;
    let model = resolve(&config)?;
    let registry = Registry::build(
        model,
        TransformContext {
            app_url: settings.app_url.clone(),
        },
    );
    tracing::info!(resources = ?registry.paths().collect::<Vec<_>>(), "resources loaded");

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(store, registry, settings);
    let router = app(state)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
