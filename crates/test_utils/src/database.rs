//! Database Test Utilities
//!
//! PostgreSQL test containers for adapter tests. Each container gets the
//! real migrations, so adapter tests run against the production schema.

use std::time::Duration;

use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use domain_tenancy::User;
use infra_db::{create_pool, run_migrations, DatabaseConfig};

use crate::fixtures::{ReferenceFixtures, UserFixtures};
use crate::world::Tenant;

const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "claims_test";

/// Tables in dependency order, children first
const TABLES: [&str; 8] = [
    "job_queue",
    "job_processing_logs",
    "patient_status_events",
    "claims",
    "users",
    "patients",
    "providers",
    "organizations",
];

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    /// Creates the database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A migrated PostgreSQL container and a pool connected to it
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and applies the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or a migration fails
    pub async fn new() -> TestResult<Self> {
        let container = Postgres::default()
            .with_user(POSTGRES_USER)
            .with_password(POSTGRES_PASSWORD)
            .with_db_name(POSTGRES_DB)
            .with_tag(POSTGRES_TAG)
            .start()
            .await?;

        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
            ..TestDatabaseConfig::default()
        };

        let pool = create_pool(
            DatabaseConfig::new(config.connection_url())
                .max_connections(5)
                .min_connections(1)
                .connect_timeout(Duration::from_secs(30)),
        )
        .await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Clears all rows while keeping the schema
    pub async fn clear_data(&self) -> TestResult<()> {
        let statement = format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", TABLES.join(", "));
        sqlx::raw_sql(&statement).execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts a fresh organization with a provider, a patient, and a user per role
    pub async fn seed_tenant(&self) -> TestResult<Tenant> {
        let organization = ReferenceFixtures::organization();
        let provider = ReferenceFixtures::provider(organization.id);
        let patient = ReferenceFixtures::patient(organization.id);

        sqlx::query(
            "INSERT INTO organizations (id, name, is_active, min_claim_amount, max_claim_amount) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(organization.id.into_uuid())
        .bind(&organization.name)
        .bind(organization.is_active)
        .bind(organization.settings.min_claim_amount)
        .bind(organization.settings.max_claim_amount)
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT INTO providers (id, organization_id, name, npi) VALUES ($1, $2, $3, $4)")
            .bind(provider.id.into_uuid())
            .bind(organization.id.into_uuid())
            .bind(&provider.name)
            .bind(&provider.npi)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "INSERT INTO patients (id, organization_id, first_name, last_name, date_of_birth, member_number) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(patient.id.into_uuid())
        .bind(organization.id.into_uuid())
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(patient.date_of_birth)
        .bind(&patient.member_number)
        .execute(&self.pool)
        .await?;

        let tenant = Tenant {
            admin: UserFixtures::admin(organization.id),
            processor: UserFixtures::processor(organization.id),
            provider_user: UserFixtures::provider(organization.id, provider.id),
            patient_user: UserFixtures::patient(organization.id, patient.id),
            organization,
            provider,
            patient,
        };
        for user in [
            &tenant.admin,
            &tenant.processor,
            &tenant.provider_user,
            &tenant.patient_user,
        ] {
            self.insert_user(user).await?;
        }
        Ok(tenant)
    }

    pub async fn insert_user(&self, user: &User) -> TestResult<()> {
        let assigned: Vec<uuid::Uuid> = user.assigned_claim_ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO users (id, organization_id, email, name, role, provider_id, patient_id, assigned_claim_ids, is_active) \
             VALUES ($1, $2, $3, $4, $5::user_role, $6, $7, $8, $9)",
        )
        .bind(user.id.into_uuid())
        .bind(user.organization_id.into_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.provider_id.map(|id| *id.as_uuid()))
        .bind(user.patient_id.map(|id| *id.as_uuid()))
        .bind(assigned)
        .bind(user.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Container shared by tests that tolerate each other's rows
static SHARED_TEST_DB: OnceCell<TestDatabase> = OnceCell::const_new();

/// Returns the shared test database, starting it on first use
pub async fn shared_test_database() -> TestResult<&'static TestDatabase> {
    SHARED_TEST_DB.get_or_try_init(TestDatabase::new).await
}

/// Starts a dedicated container for a test that needs an empty database
pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}

/// Declares an ignored test that runs against its own PostgreSQL container
///
/// Run with `cargo test -- --ignored` on a machine with Docker.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

/// Helper trait for test assertions on database results
pub trait DatabaseTestAssertions {
    /// Asserts that a specific number of rows were affected
    fn assert_rows_affected(&self, expected: u64);
}

impl DatabaseTestAssertions for sqlx::postgres::PgQueryResult {
    fn assert_rows_affected(&self, expected: u64) {
        assert_eq!(
            self.rows_affected(),
            expected,
            "Expected {} rows affected, got {}",
            expected,
            self.rows_affected()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_connection_url() {
        let config = TestDatabaseConfig::default();
        let url = config.connection_url();

        assert!(url.starts_with("postgres://"));
        assert!(url.contains(POSTGRES_USER));
        assert!(url.ends_with(POSTGRES_DB));
    }

    #[test]
    fn test_clear_order_ends_with_tenants() {
        assert_eq!(TABLES.first(), Some(&"job_queue"));
        assert_eq!(TABLES.last(), Some(&"organizations"));
    }
}
