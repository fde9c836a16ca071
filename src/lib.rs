use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
pub mod test_util;

use crate::config::AppConfig;
use crate::db::Database;
use crate::services::matching::MatchingEngine;

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub matching_engine: Arc<MatchingEngine>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Self {
        let matching_engine = Arc::new(MatchingEngine::new(db.pool.clone()));
        Self {
            config,
            db,
            matching_engine,
        }
    }
}

/// Build the full application router, ready to serve.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
