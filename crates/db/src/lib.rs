//! Persistence for the job orchestration core.
//!
//! - [`store::JobStore`] -- the storage contract the dispatcher and API use.
//! - [`PgJobStore`] -- Postgres implementation backed by [`repositories::JobRepo`].
//! - [`MemoryJobStore`] -- in-process implementation for tests and local runs.
//! - [`repositories`] -- notification event and recipient queries.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod pg;
pub mod repositories;
pub mod store;

pub use memory::MemoryJobStore;
pub use pg::PgJobStore;
pub use store::{CreateOutcome, JobMutator, JobStore, ListScope, StoreError, VisibleAt};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
