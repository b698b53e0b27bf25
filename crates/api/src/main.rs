use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::app::build_router;
use api::gql::build_schema;
use api::state::AppState;

const DEFAULT_MAX_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
        Ok(raw) => raw.parse().context("DATABASE_MAX_CONNECTIONS is invalid")?,
        Err(_) => DEFAULT_MAX_CONNECTIONS,
    };
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await?;
    infra::db::migrate(&pool).await?;
    tracing::info!(max_connections, "database ready");

    let state = AppState::from_env(pool)?;
    let port = state.config.port;
    let schema = build_schema(state.clone());
    let app = build_router(state, schema);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "registration engine listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Stops accepting connections on Ctrl-C; in-flight requests finish.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
