use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{map_unique_violation, ExchangeError};
use crate::models::{Instrument, NewUser, TradeView, User, UserResponse};
use crate::services::book::{self, L2OrderBook};
use crate::services::trades;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub limit: Option<i64>,
}

/// Register a new principal
/// POST /public/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewUser>,
) -> Result<Json<UserResponse>, ExchangeError> {
    req.validate()?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, name, role, api_key) VALUES ($1, $2, 'USER', $3) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(Uuid::new_v4())
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| map_unique_violation(e, "username already exists"))?;

    tracing::info!("registered user '{}' ({})", user.name, user.id);

    Ok(Json(user.into()))
}

/// List all tradable instruments
/// GET /public/instrument
pub async fn list_instruments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Instrument>>, ExchangeError> {
    let instruments = sqlx::query_as::<_, Instrument>(
        "SELECT name, ticker FROM instruments ORDER BY ticker",
    )
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(instruments))
}

/// L2 order book snapshot
/// GET /public/orderbook/:ticker?limit=10
pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<L2OrderBook>, ExchangeError> {
    let limit = query.limit.unwrap_or(10);
    if !(1..=25).contains(&limit) {
        return Err(ExchangeError::Validation(
            "limit must be between 1 and 25".to_string(),
        ));
    }

    let book = book::levels(&state.db.pool, &ticker, limit).await?;
    Ok(Json(book))
}

/// Trade history, newest first
/// GET /public/transactions/:ticker?limit=10
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<Vec<TradeView>>, ExchangeError> {
    let limit = query.limit.unwrap_or(10);
    if !(1..=100).contains(&limit) {
        return Err(ExchangeError::Validation(
            "limit must be between 1 and 100".to_string(),
        ));
    }

    let instrument_exists: Option<(String,)> =
        sqlx::query_as("SELECT ticker FROM instruments WHERE ticker = $1")
            .bind(&ticker)
            .fetch_optional(&state.db.pool)
            .await?;
    if instrument_exists.is_none() {
        return Err(ExchangeError::NotFound(format!("ticker '{ticker}'")));
    }

    let trades = trades::recent(&state.db.pool, &ticker, limit).await?;
    Ok(Json(trades.into_iter().map(TradeView::from).collect()))
}
