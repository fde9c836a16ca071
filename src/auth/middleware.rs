use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::models::{User, UserRole};
use crate::AppState;

/// The authenticated principal, resolved from the `Authorization` header
/// and attached to the request extensions for handlers to consume.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ExchangeError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ExchangeError::Forbidden("admin role required".to_string()))
        }
    }
}

/// Credentials are `Authorization: TOKEN <api_key>`.
pub fn parse_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("TOKEN ").filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ExchangeError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = auth_header
        .and_then(parse_token)
        .ok_or(ExchangeError::Unauthenticated)?;

    let api_key = Uuid::parse_str(token).map_err(|_| ExchangeError::Unauthenticated)?;

    let user: Option<User> = sqlx::query_as(
        "SELECT id, name, role, api_key, created_at FROM users WHERE api_key = $1",
    )
    .bind(api_key)
    .fetch_optional(&state.db.pool)
    .await?;

    let user = user.ok_or(ExchangeError::Unauthenticated)?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        name: user.name,
        role: user.role,
    });

    Ok(next.run(request).await)
}
