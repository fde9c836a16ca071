//! Balance ledger
//!
//! Every mutation runs inside the caller's transaction and takes a row
//! lock before touching a balance. The `reserved` counter is the single
//! source of truth for outstanding order commitments: funds are reserved
//! at admission and the reservation is decremented together with the
//! `total` settlement at trade time.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::ExchangeError;

/// One signed `total` mutation inside a settlement batch.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub user_id: Uuid,
    pub ticker: String,
    pub delta: i64,
}

impl BalanceChange {
    pub fn new(user_id: Uuid, ticker: &str, delta: i64) -> Self {
        Self {
            user_id,
            ticker: ticker.to_string(),
            delta,
        }
    }
}

/// Credit `amount` to (user, ticker), creating the record if absent.
pub async fn deposit(
    conn: &mut PgConnection,
    user_id: Uuid,
    ticker: &str,
    amount: i64,
) -> Result<(), ExchangeError> {
    if amount <= 0 {
        return Err(ExchangeError::Validation(
            "deposit amount must be positive".to_string(),
        ));
    }
    ensure_user_and_instrument(&mut *conn, user_id, ticker).await?;

    sqlx::query(
        r#"
        INSERT INTO balances (user_id, ticker, total, reserved)
        VALUES ($1, $2, $3, 0)
        ON CONFLICT (user_id, ticker)
        DO UPDATE SET total = balances.total + $3
        "#,
    )
    .bind(user_id)
    .bind(ticker)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Debit `amount` from (user, ticker). Withdrawals must not eat into the
/// reserved portion.
pub async fn withdraw(
    conn: &mut PgConnection,
    user_id: Uuid,
    ticker: &str,
    amount: i64,
) -> Result<(), ExchangeError> {
    if amount <= 0 {
        return Err(ExchangeError::Validation(
            "withdraw amount must be positive".to_string(),
        ));
    }
    ensure_user_and_instrument(&mut *conn, user_id, ticker).await?;

    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT total, reserved FROM balances WHERE user_id = $1 AND ticker = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(ticker)
    .fetch_optional(&mut *conn)
    .await?;

    let (total, reserved) = row.unwrap_or((0, 0));
    if total - amount < reserved {
        return Err(ExchangeError::Insufficient(ticker.to_string()));
    }

    sqlx::query("UPDATE balances SET total = total - $3 WHERE user_id = $1 AND ticker = $2")
        .bind(user_id)
        .bind(ticker)
        .bind(amount)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Spendable quantity: `total - reserved`, 0 when no record exists.
pub async fn available(
    conn: &mut PgConnection,
    user_id: Uuid,
    ticker: &str,
) -> Result<i64, ExchangeError> {
    let row: Option<(i64, i64)> =
        sqlx::query_as("SELECT total, reserved FROM balances WHERE user_id = $1 AND ticker = $2")
            .bind(user_id)
            .bind(ticker)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map_or(0, |(total, reserved)| total - reserved))
}

/// Current `total`, 0 when no record exists. Used by the matcher's
/// defensive counterparty check.
pub async fn total_of(
    conn: &mut PgConnection,
    user_id: Uuid,
    ticker: &str,
) -> Result<i64, ExchangeError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT total FROM balances WHERE user_id = $1 AND ticker = $2")
            .bind(user_id)
            .bind(ticker)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map_or(0, |(total,)| total))
}

/// Adjust the reserved portion under a row lock. A positive delta fails
/// `INSUFFICIENT` when it would exceed `total`; a negative delta clamps
/// at zero so releases never fail.
pub async fn reserve(
    conn: &mut PgConnection,
    user_id: Uuid,
    ticker: &str,
    delta: i64,
) -> Result<(), ExchangeError> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        "SELECT total, reserved FROM balances WHERE user_id = $1 AND ticker = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(ticker)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((total, reserved)) = row else {
        if delta > 0 {
            return Err(ExchangeError::Insufficient(ticker.to_string()));
        }
        // Nothing reserved, nothing to release.
        return Ok(());
    };

    if delta > 0 && reserved + delta > total {
        return Err(ExchangeError::Insufficient(ticker.to_string()));
    }

    let new_reserved = (reserved + delta).max(0);

    sqlx::query("UPDATE balances SET reserved = $3 WHERE user_id = $1 AND ticker = $2")
        .bind(user_id)
        .bind(ticker)
        .bind(new_reserved)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Apply a batch of signed `total` deltas. Locks are taken in
/// `(user_id, ticker)` order so concurrent settlements cannot deadlock.
/// Fails `INSUFFICIENT` if any resulting total would go negative; rows
/// are created lazily for pure credits.
pub async fn settle(
    conn: &mut PgConnection,
    changes: &[BalanceChange],
) -> Result<(), ExchangeError> {
    let mut ordered: Vec<&BalanceChange> = changes.iter().collect();
    ordered.sort_by(|a, b| (a.user_id, &a.ticker).cmp(&(b.user_id, &b.ticker)));

    for change in ordered {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT total FROM balances WHERE user_id = $1 AND ticker = $2 FOR UPDATE",
        )
        .bind(change.user_id)
        .bind(&change.ticker)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some((total,)) => {
                if total + change.delta < 0 {
                    return Err(ExchangeError::Insufficient(change.ticker.clone()));
                }
                sqlx::query(
                    "UPDATE balances SET total = total + $3 WHERE user_id = $1 AND ticker = $2",
                )
                .bind(change.user_id)
                .bind(&change.ticker)
                .bind(change.delta)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                if change.delta < 0 {
                    return Err(ExchangeError::Insufficient(change.ticker.clone()));
                }
                sqlx::query(
                    "INSERT INTO balances (user_id, ticker, total, reserved) VALUES ($1, $2, $3, 0)",
                )
                .bind(change.user_id)
                .bind(&change.ticker)
                .bind(change.delta)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    Ok(())
}

async fn ensure_user_and_instrument(
    conn: &mut PgConnection,
    user_id: Uuid,
    ticker: &str,
) -> Result<(), ExchangeError> {
    let user_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    if user_exists.is_none() {
        return Err(ExchangeError::NotFound("user".to_string()));
    }

    let instrument_exists: Option<(String,)> =
        sqlx::query_as("SELECT ticker FROM instruments WHERE ticker = $1")
            .bind(ticker)
            .fetch_optional(&mut *conn)
            .await?;
    if instrument_exists.is_none() {
        return Err(ExchangeError::NotFound(format!("ticker '{ticker}'")));
    }

    Ok(())
}
