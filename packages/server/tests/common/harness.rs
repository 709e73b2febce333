//! Test harness with testcontainers for Postgres-backed tests.
//!
//! Uses a shared container across all tests. The container and migrations
//! are initialized once on first use, then reused.

use anyhow::{Context, Result};
use cyberpitch_core::domains::auth::store::PgCredentialStore;
use cyberpitch_core::kernel::TestDependencies;
use sqlx::PgPool;
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    server_url: String,
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let server_url = format!("postgresql://postgres:postgres@{}:{}", pg_host, pg_port);
        let db_url = format!("{server_url}/postgres");

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            server_url,
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Postgres-backed harness.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let test = ctx.deps();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub db_pool: PgPool,
    pub store: Arc<PgCredentialStore>,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self {
            store: Arc::new(PgCredentialStore::new(db_pool.clone())),
            db_pool,
        })
    }

    /// Harness on a fresh database of its own, for tests that sweep whole
    /// tables and would otherwise race with the tests sharing the default one
    pub async fn isolated() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let name = format!("test_{}", uuid::Uuid::new_v4().simple());

        let admin = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;
        sqlx::query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&admin)
            .await
            .context("Failed to create isolated database")?;
        admin.close().await;

        let db_pool = PgPool::connect(&format!("{}/{name}", infra.server_url))
            .await
            .context("Failed to connect to isolated database")?;
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            store: Arc::new(PgCredentialStore::new(db_pool.clone())),
            db_pool,
        })
    }

    /// Mocked delivery and clock on top of the Postgres store
    pub fn deps(&self) -> TestDependencies {
        TestDependencies::with_store(self.store.clone())
    }
}
