//! Shared fixtures for the database-backed test modules.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{Direction, LimitOrderBody, MarketOrderBody, OrderBody};
use crate::services::{bootstrap, ledger};
use crate::{app, AppState};

pub const QUOTE: &str = "RUB";
pub const TICKER: &str = "XYZ";
pub const ADMIN_KEY: &str = "175b6f1fc25c47e69ff73442f96298ae";

pub async fn create_user(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, role, api_key) VALUES ($1, $2, 'USER', $3)")
        .bind(id)
        .bind(name)
        .bind(Uuid::new_v4())
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn create_instrument(pool: &PgPool, ticker: &str, name: &str) {
    sqlx::query("INSERT INTO instruments (ticker, name) VALUES ($1, $2)")
        .bind(ticker)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

/// Standard fixture: the quote asset plus one tradable instrument.
pub async fn seed_market(pool: &PgPool) {
    create_instrument(pool, QUOTE, "rubles").await;
    create_instrument(pool, TICKER, "xyzzy shares").await;
}

pub async fn fund(pool: &PgPool, user_id: Uuid, ticker: &str, amount: i64) {
    let mut tx = pool.begin().await.unwrap();
    ledger::deposit(&mut tx, user_id, ticker, amount)
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

/// (total, reserved) for a balance row, zeros when absent.
pub async fn balance(pool: &PgPool, user_id: Uuid, ticker: &str) -> (i64, i64) {
    sqlx::query_as("SELECT total, reserved FROM balances WHERE user_id = $1 AND ticker = $2")
        .bind(user_id)
        .bind(ticker)
        .fetch_optional(pool)
        .await
        .unwrap()
        .unwrap_or((0, 0))
}

pub async fn trade_count(pool: &PgPool, ticker: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM trades WHERE ticker = $1")
        .bind(ticker)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Sum of `total` across all users for a ticker, for conservation checks.
pub async fn total_supply(pool: &PgPool, ticker: &str) -> i64 {
    sqlx::query_scalar("SELECT COALESCE(SUM(total), 0)::BIGINT FROM balances WHERE ticker = $1")
        .bind(ticker)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Every balance row must satisfy 0 <= reserved <= total.
pub async fn assert_ledger_invariants(pool: &PgPool) {
    let violations: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM balances WHERE reserved < 0 OR total < 0 OR reserved > total",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(violations, 0, "ledger invariant violated");
}

pub fn limit(direction: Direction, ticker: &str, qty: i64, price: i64) -> OrderBody {
    OrderBody::Limit(LimitOrderBody {
        direction,
        ticker: ticker.to_string(),
        qty,
        price,
    })
}

pub fn market(direction: Direction, ticker: &str, qty: i64) -> OrderBody {
    OrderBody::Market(MarketOrderBody {
        direction,
        ticker: ticker.to_string(),
        qty,
    })
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        port: 0,
        admin_name: "admin".to_string(),
        admin_api_key: ADMIN_KEY.to_string(),
    }
}

/// Full router over the given pool, with the quote instrument and admin
/// principal seeded.
pub async fn test_app(pool: &PgPool) -> Router {
    let config = test_config();
    bootstrap::seed(pool, &config).await.unwrap();
    let state = Arc::new(AppState::new(
        config,
        Database { pool: pool.clone() },
    ));
    app(state)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("TOKEN {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

pub async fn register_user(app: &Router, name: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/public/register",
        None,
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}
