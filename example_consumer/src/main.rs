//! Example consumer: a separate Rust project that serves a resource API with apigen-sdk.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Config documents are read from `APIGEN_CONFIG_DIR` (default `./config`).

use apigen_sdk::{
    common_routes_with_ready, load_from_dir, resource_routes, Api, AppState, PgExecutor, Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("apigen_sdk=info")),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/apigen".into());
    let config_dir = std::env::var("APIGEN_CONFIG_DIR").unwrap_or_else(|_| "config".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let config = load_from_dir(&config_dir).await?;
    let settings = Settings::load()?;
    let api = Api::new(&config, &settings, Arc::new(PgExecutor::new(pool.clone())))?;
    let state = AppState::new(Arc::new(api)).with_pool(pool);

    let app = common_routes_with_ready(state.clone()).merge(resource_routes(state));
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
