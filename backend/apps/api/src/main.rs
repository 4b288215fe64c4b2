//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

use axum::{
    Json, Router, http,
    http::{Method, header},
    routing::get,
};
use mining::application::{
    EventDispatcher, LogNotificationSink, MiningConfig, MiningContext, Settings, Sweeper,
};
use mining::domain::repository::MiningRepository;
use mining::presentation::USER_ID_HEADER;
use mining::{MemoryMiningRepository, PgMiningRepository, mining_router};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

/// Environment variables mapped onto settings keys
const SETTING_VARS: [(&str, &str); 6] = [
    ("MINING_RATE", "miningRate"),
    ("MINING_CYCLE_HOURS", "miningCycleDuration"),
    ("BOOST_COST", "boostCost"),
    ("DIRECT_REFERRAL_BONUS", "directReferralBonus"),
    ("INDIRECT_REFERRAL_BONUS", "indirectReferralBonus"),
    ("MAINTENANCE_MODE", "maintenanceMode"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=info,mining=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_pairs(
        SETTING_VARS
            .iter()
            .filter_map(|(var, key)| env::var(var).ok().map(|value| (*key, value))),
    )?;
    tracing::info!(
        mining_rate = %settings.mining_rate,
        cycle_hours = settings.mining_cycle_hours,
        maintenance = settings.maintenance_mode,
        "Settings loaded"
    );

    let config = if cfg!(debug_assertions) {
        MiningConfig::development()
    } else {
        MiningConfig::default()
    };

    match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;

            tracing::info!("Connected to database");

            // Run migrations
            sqlx::migrate!("../../../database/migrations")
                .run(&pool)
                .await?;

            tracing::info!("Migrations completed");

            serve(Arc::new(PgMiningRepository::new(pool)), settings, config).await
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(Arc::new(MemoryMiningRepository::new()), settings, config).await
        }
    }
}

async fn serve<R: MiningRepository>(
    repo: Arc<R>,
    settings: Settings,
    config: MiningConfig,
) -> anyhow::Result<()> {
    let ctx = MiningContext::new(repo, Arc::new(settings), config);

    // Background workers; the dispatcher feeds the `/api/live` streams
    let dispatcher = EventDispatcher::new(ctx.live.clone(), Arc::new(LogNotificationSink))
        .spawn(ctx.events.subscribe());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(ctx.clone()).spawn(shutdown_rx);

    // CORS configuration
    let frontend_origins = env::var("FRONTEND_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static(USER_ID_HEADER),
        ]))
        .allow_credentials(true);

    // Build router
    let live = ctx.live.clone();
    let app = Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
        .nest("/api", mining_router(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(31113);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        // live streams never finish on their own
        live.close_all();
    })
    .await?;

    // Stop the sweeper between sessions, then the dispatcher
    shutdown_tx.send(true).ok();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }
    dispatcher.abort();

    tracing::info!("Server stopped");
    Ok(())
}
