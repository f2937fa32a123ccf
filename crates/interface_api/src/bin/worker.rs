//! Claims Job Worker Binary
//!
//! Pulls patient-event jobs from the PostgreSQL queue and runs the matching
//! claim processor with bounded concurrency.
//!
//! # Environment Variables
//!
//! * `WORKER_DATABASE_URL` - PostgreSQL connection string
//! * `WORKER_CONCURRENCY` - Jobs running at once (default: 5)
//! * `WORKER_MAX_JOBS_PER_SECOND` - Throughput ceiling (default: 10)
//! * `WORKER_POLL_INTERVAL_MS` - Idle poll interval (default: 500)
//! * `WORKER_MAX_ATTEMPTS` - Deliveries per job before it is dead (default: 3)
//! * `WORKER_BACKOFF_BASE_MS` - First retry delay, doubled per attempt (default: 2000)
//! * `WORKER_STALE_RESERVATION_SECS` - Redeliver reservations older than this (default: 300)
//! * `WORKER_LOG_LEVEL`, `WORKER_LOG_JSON` - Logging

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use domain_claims::{ClaimGateway, YearlyClaimNumbers};
use domain_jobs::{Dispatcher, WorkerPool};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresAdapters, PostgresJobQueue};
use interface_api::config::WorkerConfig;
use interface_api::shutdown::shutdown_signal;
use interface_api::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    init_tracing(&config.log_level, config.log_json);

    let settings = config.worker_settings();
    tracing::info!(
        concurrency = settings.concurrency,
        max_jobs_per_second = settings.max_jobs_per_second,
        max_attempts = config.max_attempts,
        "Starting claims job worker"
    );

    // One connection per in-flight job, plus the reserving loop and the sweeper
    let database = DatabaseConfig::new(config.database_url.clone())
        .application_name("claims-worker")
        .max_connections(settings.concurrency as u32 + 2);
    let pool = create_pool(database)
        .await
        .context("database connection failed")?;
    run_migrations(&pool).await.context("migrations failed")?;

    let adapters = PostgresAdapters::new(pool, config.retry_policy());
    let gateway = ClaimGateway::new(
        adapters.claims(),
        adapters.references(),
        Arc::new(YearlyClaimNumbers),
    );
    let dispatcher = Dispatcher::standard(adapters.ledger(), gateway);
    let pool = WorkerPool::new(adapters.queue(), adapters.events(), dispatcher, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_stale_sweeper(
        adapters.queue.clone(),
        config.stale_reservation_after(),
        shutdown_rx.clone(),
    );
    let workers = tokio::spawn(async move { pool.run(shutdown_rx).await });

    shutdown_signal().await;
    tracing::info!("Draining in-flight jobs");
    // Receivers may already be gone if both tasks ended on their own.
    let _ = shutdown_tx.send(true);

    workers.await.context("worker pool task panicked")?;
    sweeper.await.context("stale sweeper task panicked")?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}

/// Returns abandoned reservations to the queue until shutdown
fn spawn_stale_sweeper(
    queue: PostgresJobQueue,
    older_than: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(older_than.max(std::time::Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = queue.requeue_stale(older_than).await {
                        tracing::warn!(error = %err, "stale reservation sweep failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}
