//! # Application State
//!
//! Shared state for the Axum application: the dismissal engine over
//! whichever store backend is configured, the optional database pool
//! (kept for health checks), and the service configuration.

use std::sync::Arc;

use sqlx::PgPool;

use parapet_engine::{DismissalEngine, MemoryStore};

use crate::auth::SecretString;
use crate::db::PgLedgerStore;

/// Service configuration, read from the environment in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP port the service listens on.
    pub port: u16,
    /// Shared bearer secret. `None` disables authentication
    /// (development/test mode).
    pub auth_token: Option<SecretString>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// - `PORT` — listen port, default 8080.
    /// - `PARAPET_AUTH_TOKEN` — shared bearer secret; absent disables auth.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let auth_token = std::env::var("PARAPET_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::new);
        Self { port, auth_token }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// The dismissal engine, over Postgres or the in-memory store.
    pub engine: DismissalEngine,
    /// Database pool when configured; used by the readiness probe.
    pub db_pool: Option<PgPool>,
    /// Service configuration.
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// In-memory state with default configuration (development/tests).
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// Build state from configuration and an optional database pool.
    /// With a pool the engine runs over Postgres; without one it runs
    /// over the in-memory store.
    pub fn with_config(config: AppConfig, pool: Option<PgPool>) -> Self {
        let engine = match &pool {
            Some(pool) => DismissalEngine::new(Arc::new(PgLedgerStore::new(pool.clone()))),
            None => DismissalEngine::new(Arc::new(MemoryStore::new())),
        };
        Self {
            engine,
            db_pool: pool,
            config: Arc::new(config),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
