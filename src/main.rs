use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rubex_backend::config::AppConfig;
use rubex_backend::db::Database;
use rubex_backend::services::bootstrap;
use rubex_backend::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rubex_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting rubex backend v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database and run migrations
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connected");

    // Seed the quote instrument and the admin principal on first start
    bootstrap::seed(&db.pool, &config).await?;

    let port = config.port;
    let state = Arc::new(AppState::new(config, db));
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
