use axum::{extract::State, Extension, Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::error::ExchangeError;
use crate::AppState;

/// The caller's holdings as a ticker -> total map. Reserved funds are
/// still owned, so the map reports `total`, not `available`.
/// GET /balance
pub async fn get_balances(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<BTreeMap<String, i64>>, ExchangeError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT ticker, total FROM balances WHERE user_id = $1")
            .bind(auth_user.id)
            .fetch_all(&state.db.pool)
            .await?;

    Ok(Json(rows.into_iter().collect()))
}
