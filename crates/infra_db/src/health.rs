//! Database health check

use async_trait::async_trait;
use std::time::Instant;

use core_kernel::{HealthCheckable, HealthReport};

use crate::pool::DatabasePool;

/// Runs `SELECT 1` against the pool and reports latency
pub async fn ping(pool: &DatabasePool, component: &str) -> HealthReport {
    let start = Instant::now();
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthReport::up(component, start.elapsed()),
        Err(e) => HealthReport::down(component, start.elapsed(), format!("Database error: {e}")),
    }
}

/// Health check for the shared pool
#[derive(Debug, Clone)]
pub struct PostgresHealth {
    pool: DatabasePool,
}

impl PostgresHealth {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheckable for PostgresHealth {
    async fn health_check(&self) -> HealthReport {
        ping(&self.pool, "postgres").await
    }
}
