//! Trade journal
//!
//! Append-only. Rows are written by the matcher inside its transaction
//! and read newest-first by the public history endpoint.

use sqlx::{PgConnection, PgPool};

use crate::error::ExchangeError;
use crate::models::Trade;

pub async fn record(
    conn: &mut PgConnection,
    ticker: &str,
    price: i64,
    qty: i64,
) -> Result<(), ExchangeError> {
    sqlx::query("INSERT INTO trades (ticker, price, qty) VALUES ($1, $2, $3)")
        .bind(ticker)
        .bind(price)
        .bind(qty)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn recent(
    pool: &PgPool,
    ticker: &str,
    limit: i64,
) -> Result<Vec<Trade>, ExchangeError> {
    let trades = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades WHERE ticker = $1 ORDER BY executed_at DESC, id DESC LIMIT $2",
    )
    .bind(ticker)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}
