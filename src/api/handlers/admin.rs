use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{map_unique_violation, ExchangeError};
use crate::models::{BalanceAdjustment, Instrument, OkResponse, User, UserResponse, QUOTE_TICKER};
use crate::services::ledger;
use crate::AppState;

/// Delete a principal; orders and balances cascade.
/// DELETE /admin/user/:user_id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, ExchangeError> {
    auth_user.require_admin()?;

    let user = sqlx::query_as::<_, User>("DELETE FROM users WHERE id = $1 RETURNING *")
        .bind(user_id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| ExchangeError::NotFound("user".to_string()))?;

    tracing::info!("user '{}' ({}) deleted by admin", user.name, user.id);

    Ok(Json(user.into()))
}

/// Create an instrument
/// POST /admin/instrument
pub async fn create_instrument(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(instrument): Json<Instrument>,
) -> Result<Json<OkResponse>, ExchangeError> {
    auth_user.require_admin()?;
    instrument.validate()?;

    sqlx::query("INSERT INTO instruments (ticker, name) VALUES ($1, $2)")
        .bind(&instrument.ticker)
        .bind(&instrument.name)
        .execute(&state.db.pool)
        .await
        .map_err(|e| map_unique_violation(e, "instrument already exists"))?;

    tracing::info!(
        "instrument '{}' ({}) created",
        instrument.ticker,
        instrument.name
    );

    Ok(Json(OkResponse::new()))
}

/// Delete an instrument; balances, orders and trades cascade. The quote
/// asset is permanent.
/// DELETE /admin/instrument/:ticker
pub async fn delete_instrument(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(ticker): Path<String>,
) -> Result<Json<OkResponse>, ExchangeError> {
    auth_user.require_admin()?;

    if ticker == QUOTE_TICKER {
        return Err(ExchangeError::Forbidden(format!(
            "the {QUOTE_TICKER} instrument cannot be deleted"
        )));
    }

    let deleted = sqlx::query("DELETE FROM instruments WHERE ticker = $1")
        .bind(&ticker)
        .execute(&state.db.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ExchangeError::NotFound(format!("ticker '{ticker}'")));
    }

    tracing::info!("instrument '{}' deleted", ticker);

    Ok(Json(OkResponse::new()))
}

/// Credit a user's balance
/// POST /admin/balance/deposit
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<BalanceAdjustment>,
) -> Result<Json<OkResponse>, ExchangeError> {
    auth_user.require_admin()?;
    req.validate()?;

    let mut tx = state.db.pool.begin().await?;
    ledger::deposit(&mut *tx, req.user_id, &req.ticker, req.amount).await?;
    tx.commit().await?;

    tracing::info!(
        "admin deposit: {} {} to user {}",
        req.amount,
        req.ticker,
        req.user_id
    );

    Ok(Json(OkResponse::new()))
}

/// Debit a user's balance; reservations are untouchable.
/// POST /admin/balance/withdraw
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<BalanceAdjustment>,
) -> Result<Json<OkResponse>, ExchangeError> {
    auth_user.require_admin()?;
    req.validate()?;

    let mut tx = state.db.pool.begin().await?;
    ledger::withdraw(&mut *tx, req.user_id, &req.ticker, req.amount).await?;
    tx.commit().await?;

    tracing::info!(
        "admin withdraw: {} {} from user {}",
        req.amount,
        req.ticker,
        req.user_id
    );

    Ok(Json(OkResponse::new()))
}

#[cfg(test)]
mod tests {
    use crate::test_util::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn admin_routes_reject_plain_users(pool: PgPool) {
        let app = test_app(&pool).await;

        let alice = register_user(&app, "alice").await;
        let alice_key = alice["api_key"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/admin/instrument",
            Some(&alice_key),
            Some(json!({ "name": "xyzzy shares", "ticker": "XYZ" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/admin/instrument",
            Some(ADMIN_KEY),
            Some(json!({ "name": "xyzzy shares", "ticker": "XYZ" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Duplicate ticker or name conflicts.
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/admin/instrument",
            Some(ADMIN_KEY),
            Some(json!({ "name": "other name", "ticker": "XYZ" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Lowercase tickers fail validation.
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/admin/instrument",
            Some(ADMIN_KEY),
            Some(json!({ "name": "bad", "ticker": "xyz" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    async fn quote_instrument_cannot_be_deleted(pool: PgPool) {
        let app = test_app(&pool).await;

        let (status, _) = send(
            &app,
            "DELETE",
            "/api/v1/admin/instrument/RUB",
            Some(ADMIN_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, "GET", "/api/v1/public/instrument", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let tickers: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["ticker"].as_str().unwrap())
            .collect();
        assert!(tickers.contains(&"RUB"));
    }

    #[sqlx::test]
    async fn deleted_users_lose_access(pool: PgPool) {
        let app = test_app(&pool).await;

        let alice = register_user(&app, "alice").await;
        let alice_key = alice["api_key"].as_str().unwrap().to_string();
        let alice_id = alice["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "DELETE",
            &format!("/api/v1/admin/user/{alice_id}"),
            Some(ADMIN_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "alice");

        let (status, _) = send(&app, "GET", "/api/v1/balance", Some(&alice_key), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/v1/admin/user/{alice_id}"),
            Some(ADMIN_KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
