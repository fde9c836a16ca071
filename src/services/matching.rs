//! Matching engine
//!
//! One order placement or cancellation is one database transaction. The
//! engine admits the order by reserving funds, walks the opposite side of
//! the book in price-time order, settles every trade across four balance
//! rows, and finalises the incoming order. Any failure rolls the whole
//! transaction back; the only state the engine keeps is the pool handle.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::models::{Direction, Order, OrderBody, OrderStatus, OrderType, QUOTE_TICKER};
use crate::services::ledger::{self, BalanceChange};
use crate::services::{orders, trades};

pub struct MatchingEngine {
    pool: PgPool,
}

impl MatchingEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Admit, match and finalise an incoming order.
    pub async fn place_order(
        &self,
        user_id: Uuid,
        body: OrderBody,
    ) -> Result<Order, ExchangeError> {
        let ticker = body.ticker().to_string();

        let mut tx = self.pool.begin().await?;

        let instrument_exists: Option<(String,)> =
            sqlx::query_as("SELECT ticker FROM instruments WHERE ticker = $1")
                .bind(&ticker)
                .fetch_optional(&mut *tx)
                .await?;
        if instrument_exists.is_none() {
            return Err(ExchangeError::NotFound(format!("ticker '{ticker}'")));
        }

        // Admission: reserve what this order can consume, at a fixed
        // per-unit rate. BUY LIMIT reserves quote at the limit price; BUY
        // MARKET reserves conservatively at the worst resting ask; SELL
        // reserves the instrument itself.
        let reserve_rate = match &body {
            OrderBody::Limit(limit) if limit.direction == Direction::Buy => limit.price,
            OrderBody::Market(market) if market.direction == Direction::Buy => {
                orders::worst_ask_price(&mut *tx, &ticker)
                    .await?
                    .ok_or(ExchangeError::NoLiquidity)?
            }
            _ => 1,
        };

        let (reserve_ticker, reserve_amount) = match body.direction() {
            Direction::Buy => (
                QUOTE_TICKER,
                body.qty().checked_mul(reserve_rate).ok_or_else(|| {
                    ExchangeError::Validation("order value is too large".to_string())
                })?,
            ),
            Direction::Sell => (ticker.as_str(), body.qty()),
        };

        ledger::reserve(&mut *tx, user_id, reserve_ticker, reserve_amount).await?;

        let mut order = orders::create(&mut *tx, user_id, &body).await?;

        tracing::debug!(
            "admitted order {}: {} {} {} x{} (reserved {} {})",
            order.id,
            order.order_type,
            order.direction,
            order.ticker,
            order.qty,
            reserve_amount,
            reserve_ticker
        );

        let total_filled = walk(&mut tx, &order, reserve_rate).await?;

        match order.order_type {
            OrderType::Limit => {
                order.filled += total_filled;
                order.status = OrderStatus::for_fill(order.filled, order.qty);
                orders::apply_fill(&mut *tx, order.id, order.filled, order.status).await?;
                tx.commit().await?;
            }
            OrderType::Market => {
                if total_filled < order.qty {
                    // Market orders fill completely or not at all: undo
                    // every trade and reservation, then keep a CANCELLED
                    // record of the attempt.
                    tx.rollback().await?;
                    self.persist_cancelled(&order, &body).await?;
                    tracing::info!(
                        "market order {} cancelled: filled {}/{} before the book ran dry",
                        order.id,
                        total_filled,
                        order.qty
                    );
                    return Err(ExchangeError::NoLiquidity);
                }
                order.filled = order.qty;
                order.status = OrderStatus::Executed;
                orders::apply_fill(&mut *tx, order.id, order.filled, order.status).await?;
                tx.commit().await?;
            }
        }

        tracing::info!(
            "order {} finalised: {:?}, filled {}/{}",
            order.id,
            order.status,
            order.filled,
            order.qty
        );

        Ok(order)
    }

    /// Terminate a resting order and release its residual reservation.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        caller: Uuid,
    ) -> Result<Order, ExchangeError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock_by_id(&mut *tx, order_id)
            .await?
            .ok_or_else(|| ExchangeError::NotFound("order".to_string()))?;

        if order.user_id != caller {
            return Err(ExchangeError::Forbidden(
                "order belongs to another user".to_string(),
            ));
        }
        if !order.status.is_active() {
            return Err(ExchangeError::Validation(format!(
                "order in status {:?} cannot be cancelled",
                order.status
            )));
        }

        // The residual reservation is exactly what the remaining quantity
        // would still need: quote at the order's own price for a BUY, the
        // instrument itself for a SELL.
        let remainder = order.remaining();
        if remainder > 0 {
            match order.direction {
                Direction::Buy => {
                    if let Some(price) = order.price {
                        ledger::reserve(
                            &mut *tx,
                            order.user_id,
                            QUOTE_TICKER,
                            -(remainder * price),
                        )
                        .await?;
                    }
                }
                Direction::Sell => {
                    ledger::reserve(&mut *tx, order.user_id, &order.ticker, -remainder).await?;
                }
            }
        }

        orders::set_status(&mut *tx, order.id, OrderStatus::Cancelled).await?;
        tx.commit().await?;

        let mut cancelled = order;
        cancelled.status = OrderStatus::Cancelled;

        tracing::info!("order {} cancelled by {}", cancelled.id, caller);

        Ok(cancelled)
    }

    /// Record a market order that could not be filled. Runs after the
    /// matching transaction rolled back, so the row is the only trace the
    /// attempt leaves.
    async fn persist_cancelled(
        &self,
        order: &Order,
        body: &OrderBody,
    ) -> Result<(), ExchangeError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert(
            &mut conn,
            order.id,
            order.user_id,
            body,
            OrderStatus::Cancelled,
        )
        .await?;
        Ok(())
    }
}

/// Consume resting orders on the opposite side until the taker is filled
/// or candidates run out. Returns the total quantity traded.
async fn walk(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    taker: &Order,
    reserve_rate: i64,
) -> Result<i64, ExchangeError> {
    let conn: &mut PgConnection = &mut *tx;

    // LIMIT takers never cross their own price; the bound also makes the
    // candidate list end exactly where the walk would stop.
    let candidates =
        orders::lock_opposite_resting(&mut *conn, &taker.ticker, taker.direction, taker.price)
            .await?;

    let is_buy = taker.direction == Direction::Buy;
    let mut remaining = taker.remaining();
    let mut total_filled = 0;

    for candidate in candidates {
        if remaining == 0 {
            break;
        }

        let available = candidate.remaining();
        if available <= 0 {
            continue;
        }
        let Some(price) = candidate.price else {
            continue;
        };

        // The resting side sets the price; improvement accrues to the taker.
        let trade_qty = remaining.min(available);
        let trade_amount = trade_qty * price;

        // The counterparty reserved at admission; this guards settlement
        // against ledger anomalies by skipping makers that can no longer
        // deliver.
        let (supplied_ticker, needed) = if is_buy {
            (taker.ticker.as_str(), trade_qty)
        } else {
            (QUOTE_TICKER, trade_amount)
        };
        let counterparty_total =
            ledger::total_of(&mut *conn, candidate.user_id, supplied_ticker).await?;
        if counterparty_total < needed {
            tracing::warn!(
                "skipping resting order {}: counterparty cannot supply {} {}",
                candidate.id,
                needed,
                supplied_ticker
            );
            continue;
        }

        // Release both sides' reservations before moving totals so
        // `reserved` never exceeds `total` between statements. The taker
        // releases at its admission rate, which refunds any price
        // improvement straight back to its available balance.
        if is_buy {
            ledger::reserve(
                &mut *conn,
                taker.user_id,
                QUOTE_TICKER,
                -(trade_qty * reserve_rate),
            )
            .await?;
            ledger::reserve(&mut *conn, candidate.user_id, &taker.ticker, -trade_qty).await?;
            ledger::settle(
                &mut *conn,
                &[
                    BalanceChange::new(taker.user_id, QUOTE_TICKER, -trade_amount),
                    BalanceChange::new(taker.user_id, &taker.ticker, trade_qty),
                    BalanceChange::new(candidate.user_id, &taker.ticker, -trade_qty),
                    BalanceChange::new(candidate.user_id, QUOTE_TICKER, trade_amount),
                ],
            )
            .await?;
        } else {
            ledger::reserve(
                &mut *conn,
                taker.user_id,
                &taker.ticker,
                -(trade_qty * reserve_rate),
            )
            .await?;
            ledger::reserve(&mut *conn, candidate.user_id, QUOTE_TICKER, -trade_amount).await?;
            ledger::settle(
                &mut *conn,
                &[
                    BalanceChange::new(taker.user_id, &taker.ticker, -trade_qty),
                    BalanceChange::new(taker.user_id, QUOTE_TICKER, trade_amount),
                    BalanceChange::new(candidate.user_id, QUOTE_TICKER, -trade_amount),
                    BalanceChange::new(candidate.user_id, &taker.ticker, trade_qty),
                ],
            )
            .await?;
        }

        let new_filled = candidate.filled + trade_qty;
        orders::apply_fill(
            &mut *conn,
            candidate.id,
            new_filled,
            OrderStatus::for_fill(new_filled, candidate.qty),
        )
        .await?;
        trades::record(&mut *conn, &taker.ticker, price, trade_qty).await?;

        tracing::debug!(
            "trade: {} x{} @ {} (maker {}, taker {})",
            taker.ticker,
            trade_qty,
            price,
            candidate.id,
            taker.id
        );

        remaining -= trade_qty;
        total_filled += trade_qty;
    }

    Ok(total_filled)
}
