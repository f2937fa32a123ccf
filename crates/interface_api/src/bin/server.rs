//! Claims API Server Binary
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin claims-api
//!
//! # Run with environment variables
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin claims-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_LOG_JSON` - Emit JSON log lines (default: false)
//! * `API_RATE_LIMIT_WINDOW_SECS` - Rate-limit window (default: 60)
//! * `API_RATE_LIMIT_MAX_REQUESTS` - Requests per user per window (default: 100)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use domain_tenancy::RateLimiter;
use infra_db::{create_pool, run_migrations, DatabaseConfig};
use interface_api::shutdown::shutdown_signal;
use interface_api::{config::ApiConfig, create_router, telemetry::init_tracing, AppState};

/// Main entry point for the API server.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - Database connection or migrations fail
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API configuration")?;
    init_tracing(&config.log_level, config.log_json);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting claims API server"
    );

    let pool = create_pool(DatabaseConfig::new(config.database_url.clone()).application_name("claims-api"))
        .await
        .context("database connection failed")?;
    run_migrations(&pool).await.context("migrations failed")?;

    let state = AppState::postgres(pool, config.clone());
    spawn_rate_limit_eviction(Arc::clone(&state.rate_limiter), config.rate_limit_policy().window);

    let app = create_router(state);
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .context("invalid server address")?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Drops expired rate-limit windows once per window length
fn spawn_rate_limit_eviction(limiter: Arc<dyn RateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let evicted = limiter.evict_expired().await;
            if evicted > 0 {
                tracing::debug!(evicted, "expired rate-limit windows dropped");
            }
        }
    });
}
