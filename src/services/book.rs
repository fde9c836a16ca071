//! Order book view
//!
//! L2 snapshots derived from the order store: remaining quantity summed
//! per price level, bids descending and asks ascending, depth capped by
//! the caller. The view never holds state of its own.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::error::ExchangeError;
use crate::models::Direction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Level {
    pub price: i64,
    pub qty: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct L2OrderBook {
    pub bid_levels: Vec<Level>,
    pub ask_levels: Vec<Level>,
}

pub async fn levels(
    pool: &PgPool,
    ticker: &str,
    depth: i64,
) -> Result<L2OrderBook, ExchangeError> {
    let instrument_exists: Option<(String,)> =
        sqlx::query_as("SELECT ticker FROM instruments WHERE ticker = $1")
            .bind(ticker)
            .fetch_optional(pool)
            .await?;
    if instrument_exists.is_none() {
        return Err(ExchangeError::NotFound(format!("ticker '{ticker}'")));
    }

    let bid_levels = side_levels(pool, ticker, Direction::Buy, depth).await?;
    let ask_levels = side_levels(pool, ticker, Direction::Sell, depth).await?;

    Ok(L2OrderBook {
        bid_levels,
        ask_levels,
    })
}

async fn side_levels(
    pool: &PgPool,
    ticker: &str,
    side: Direction,
    depth: i64,
) -> Result<Vec<Level>, ExchangeError> {
    let price_order = match side {
        Direction::Buy => "DESC",
        Direction::Sell => "ASC",
    };

    let sql = format!(
        "SELECT price, SUM(qty - filled)::BIGINT AS qty FROM orders \
         WHERE ticker = $1 AND direction = $2 \
           AND status IN ('NEW', 'PARTIALLY_EXECUTED') AND price IS NOT NULL \
         GROUP BY price \
         HAVING SUM(qty - filled) > 0 \
         ORDER BY price {price_order} \
         LIMIT $3"
    );

    let levels = sqlx::query_as::<_, Level>(&sql)
        .bind(ticker)
        .bind(side)
        .bind(depth)
        .fetch_all(pool)
        .await?;

    Ok(levels)
}
