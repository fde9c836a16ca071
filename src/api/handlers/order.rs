use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::ExchangeError;
use crate::models::{CreateOrderResponse, OkResponse, OrderBody, OrderView};
use crate::services::orders;
use crate::AppState;

/// Place a limit or market order
/// POST /order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<OrderBody>,
) -> Result<Json<CreateOrderResponse>, ExchangeError> {
    body.validate()?;

    let order = state.matching_engine.place_order(auth_user.id, body).await?;

    Ok(Json(CreateOrderResponse {
        success: true,
        order_id: order.id,
    }))
}

/// List the caller's orders
/// GET /order
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<OrderView>>, ExchangeError> {
    let orders = orders::list_by_user(&state.db.pool, auth_user.id).await?;
    Ok(Json(orders.into_iter().map(OrderView::from).collect()))
}

/// Fetch one of the caller's orders
/// GET /order/:order_id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, ExchangeError> {
    let order = orders::get_by_id(&state.db.pool, order_id)
        .await?
        .ok_or_else(|| ExchangeError::NotFound("order".to_string()))?;

    if order.user_id != auth_user.id {
        return Err(ExchangeError::Forbidden(
            "order belongs to another user".to_string(),
        ));
    }

    Ok(Json(order.into()))
}

/// Cancel a resting order
/// DELETE /order/:order_id
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ExchangeError> {
    state
        .matching_engine
        .cancel_order(order_id, auth_user.id)
        .await?;

    Ok(Json(OkResponse::new()))
}
