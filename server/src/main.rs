//! Oru sync relay binary.

use std::sync::Arc;

use oru_server::config::Config;
use oru_server::{app, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oru_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Oru relay on {}:{}", config.host, config.port);

    let pool = db::create_pool(&config.database_url).await?;
    db::init_schema(&pool).await?;

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
