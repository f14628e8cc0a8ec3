//! Service entry point: tracing, configuration, database pool, serve.

use parapet_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    let pool = parapet_api::db::init_pool().await?;
    let port = config.port;

    if config.auth_token.is_none() {
        tracing::warn!("PARAPET_AUTH_TOKEN not set — authentication disabled");
    }

    let state = AppState::with_config(config, pool);
    let app = parapet_api::app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "parapet-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
