//! HTTP API Layer
//!
//! Thin outer surface over the claims and jobs domains, using Axum.
//!
//! # Architecture
//!
//! - **Auth**: JWT bearer tokens verified into a `VerifiedIdentity`
//! - **Middleware**: access context, rate limiting, audit logging
//! - **Handlers**: claims, patient events, health
//! - **DTOs**: request bodies and query strings, validated at the edge
//! - **Error Handling**: `ErrorKind` to HTTP status mapping
//!
//! The API never decides visibility or permissions itself. Every handler
//! passes the request's [`AccessContext`](domain_tenancy::AccessContext)
//! into the domain.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let app = create_router(AppState::postgres(pool, config));
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;
pub mod telemetry;
pub mod shutdown;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::HealthCheckable;
use domain_claims::{ClaimGateway, YearlyClaimNumbers};
use domain_jobs::{PatientEventService, RetryPolicy};
use domain_tenancy::{CredentialVerifier, InMemoryRateLimiter, RateLimiter, UserDirectory};
use infra_db::{DatabasePool, PostgresAdapters, PostgresHealth};

use crate::auth::JwtCredentialVerifier;
use crate::config::ApiConfig;
use crate::handlers::{claims, events, health};
use crate::middleware::{audit_middleware, auth_middleware, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub claims: ClaimGateway,
    pub events: PatientEventService,
    pub directory: Arc<dyn UserDirectory>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub health_checks: Vec<Arc<dyn HealthCheckable>>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires every port to PostgreSQL
    pub fn postgres(pool: DatabasePool, config: ApiConfig) -> Self {
        // The API only enqueues; retry timing is the worker's concern.
        let adapters = PostgresAdapters::new(pool.clone(), RetryPolicy::default());

        let claims = ClaimGateway::new(
            adapters.claims(),
            adapters.references(),
            Arc::new(YearlyClaimNumbers),
        );
        let events = PatientEventService::new(adapters.events(), adapters.references(), adapters.queue());
        let database: Arc<dyn HealthCheckable> = Arc::new(PostgresHealth::new(pool));
        let queue: Arc<dyn HealthCheckable> = Arc::new(adapters.queue.clone());

        Self {
            claims,
            events,
            directory: adapters.user_directory(),
            verifier: Arc::new(JwtCredentialVerifier::new(&config.jwt_secret)),
            rate_limiter: Arc::new(InMemoryRateLimiter::new(config.rate_limit_policy())),
            health_checks: vec![database, queue],
            config,
        }
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Claims routes
    let claims_routes = Router::new()
        .route("/", post(claims::create_claim).get(claims::list_claims))
        .route("/summary", get(claims::claim_summary))
        .route("/bulk-status", post(claims::bulk_update_status))
        .route("/:id", get(claims::get_claim))
        .route("/:id/status", put(claims::update_status));

    // Patient event routes
    let event_routes = Router::new()
        .route("/", post(events::record_event))
        .route("/:id", get(events::get_event));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/claims", claims_routes)
        .nest("/patient-events", event_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
