//! # Database Persistence Layer
//!
//! Postgres persistence for the dismissal ledger and report aggregates
//! via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the
//! engine runs over [`PgLedgerStore`] and every mutation commits the
//! ledger write, cascade, and recalculated aggregates in one Postgres
//! transaction. When absent, the engine runs over the in-memory store
//! (suitable for development and testing).
//!
//! ## What is persisted
//!
//! - `compliance_reports` — one aggregate row per report
//! - `violations` — the violation store, written by the ingestion path
//! - `dismissed_sections` / `dismissed_violations` — the dismissal ledger

pub mod ledger;

pub use ledger::PgLedgerStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set — running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
