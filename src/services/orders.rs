//! Order store
//!
//! CRUD over order rows plus the two query specialisations the matcher
//! and the book view depend on. `filled` and `status` are mutated only by
//! the matcher and cancellation.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::models::{Direction, Order, OrderBody, OrderStatus};

pub async fn create(
    conn: &mut PgConnection,
    user_id: Uuid,
    body: &OrderBody,
) -> Result<Order, ExchangeError> {
    insert(conn, Uuid::new_v4(), user_id, body, OrderStatus::New).await
}

/// Insert an order row with an explicit id and status. Used directly by
/// the matcher when it re-persists a market order as CANCELLED after its
/// matching transaction rolled back.
pub async fn insert(
    conn: &mut PgConnection,
    id: Uuid,
    user_id: Uuid,
    body: &OrderBody,
    status: OrderStatus,
) -> Result<Order, ExchangeError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (id, user_id, ticker, direction, order_type, qty, price, filled, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(body.ticker())
    .bind(body.direction())
    .bind(body.order_type())
    .bind(body.qty())
    .bind(body.price())
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;

    Ok(order)
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Order>, ExchangeError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}

/// Fetch an order under a row lock, blocking behind any in-flight match
/// that is currently consuming it.
pub async fn lock_by_id(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Order>, ExchangeError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Order>, ExchangeError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(orders)
}

/// Resting orders on the opposite side of an incoming order, best price
/// first with `(created_at, id)` tie-breaks, all locked `FOR UPDATE`.
/// An optional price bound prunes candidates a LIMIT taker can never
/// cross with.
pub async fn lock_opposite_resting(
    conn: &mut PgConnection,
    ticker: &str,
    taker_direction: Direction,
    price_bound: Option<i64>,
) -> Result<Vec<Order>, ExchangeError> {
    // A BUY taker consumes asks from the lowest price up, a SELL taker
    // consumes bids from the highest price down.
    let (price_order, bound_op) = match taker_direction {
        Direction::Buy => ("ASC", "<="),
        Direction::Sell => ("DESC", ">="),
    };

    let bound_clause = if price_bound.is_some() {
        format!(" AND price {bound_op} $3")
    } else {
        String::new()
    };

    let sql = format!(
        "SELECT * FROM orders \
         WHERE ticker = $1 AND direction = $2 \
           AND status IN ('NEW', 'PARTIALLY_EXECUTED') AND price IS NOT NULL{bound_clause} \
         ORDER BY price {price_order}, created_at ASC, id ASC \
         FOR UPDATE"
    );

    let mut query = sqlx::query_as::<_, Order>(&sql)
        .bind(ticker)
        .bind(taker_direction.opposite());
    if let Some(bound) = price_bound {
        query = query.bind(bound);
    }

    Ok(query.fetch_all(&mut *conn).await?)
}

/// Highest resting ask for a ticker; the conservative admission price of
/// a BUY MARKET order.
pub async fn worst_ask_price(
    conn: &mut PgConnection,
    ticker: &str,
) -> Result<Option<i64>, ExchangeError> {
    let worst: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(price) FROM orders \
         WHERE ticker = $1 AND direction = 'SELL' \
           AND status IN ('NEW', 'PARTIALLY_EXECUTED') AND price IS NOT NULL",
    )
    .bind(ticker)
    .fetch_one(&mut *conn)
    .await?;

    Ok(worst)
}

pub async fn apply_fill(
    conn: &mut PgConnection,
    id: Uuid,
    filled: i64,
    status: OrderStatus,
) -> Result<(), ExchangeError> {
    sqlx::query("UPDATE orders SET filled = $2, status = $3 WHERE id = $1")
        .bind(id)
        .bind(filled)
        .bind(status)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn set_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: OrderStatus,
) -> Result<(), ExchangeError> {
    sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
