use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod events;
mod models;
mod services;

use crate::config::AppConfig;
use crate::db::Database;
use crate::events::EventBus;

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub bus: EventBus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entitlement_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("Starting {} v{}", config.api_title, env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database_url, config.pg_pool_size).await?;
    db.migrate().await?;
    tracing::info!("Database connected and migrated");

    let bus = EventBus::new();
    events::spawn_logging_subscriber(&bus);

    let state = Arc::new(AppState { config, db, bus });

    spawn_expire_sweeper(state.clone());

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::routes::create_router(state.clone()));

    if state.config.show_docs {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", api::openapi::ApiDoc::openapi()));
        tracing::info!("OpenAPI docs published at /docs");
    }

    let app = app
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from((
        state
            .config
            .bind_addr
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        state.config.port,
    ));
    tracing::info!("Server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// EXPIRE (§4.3.3): periodic background sweeper marking ACTIVE batches with
/// a past `expires_at` as EXPIRED. Reads enforce the same filter at query
/// time, so this is a bookkeeping convenience, not a correctness dependency.
fn spawn_expire_sweeper(state: Arc<AppState>) {
    let interval = state.config.expire_sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match services::ledger::expire_sweep(&state.db.pool).await {
                Ok(count) if count > 0 => tracing::info!("expire sweep: {count} batches expired"),
                Ok(_) => {}
                Err(e) => tracing::error!("expire sweep failed: {e}"),
            }
        }
    });
}

async fn health_check() -> &'static str {
    "OK"
}
