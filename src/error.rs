use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Typed engine errors. The HTTP adapter translates these; everything the
/// core cannot classify surfaces as a 500 with the transaction rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("missing or invalid token")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("insufficient balance for {0}")]
    Insufficient(String),

    #[error("not enough liquidity to fill market order")]
    NoLiquidity,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ExchangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ExchangeError::Forbidden(_) => StatusCode::FORBIDDEN,
            ExchangeError::NotFound(_) => StatusCode::NOT_FOUND,
            ExchangeError::Conflict(_) => StatusCode::CONFLICT,
            ExchangeError::Validation(_)
            | ExchangeError::Insufficient(_)
            | ExchangeError::NoLiquidity => StatusCode::BAD_REQUEST,
            ExchangeError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::Unauthenticated => "UNAUTHENTICATED",
            ExchangeError::Forbidden(_) => "FORBIDDEN",
            ExchangeError::NotFound(_) => "NOT_FOUND",
            ExchangeError::Conflict(_) => "CONFLICT",
            ExchangeError::Validation(_) => "VALIDATION",
            ExchangeError::Insufficient(_) => "INSUFFICIENT",
            ExchangeError::NoLiquidity => "NO_LIQUIDITY",
            ExchangeError::Database(_) => "INTERNAL",
        }
    }
}

/// Turn a unique-constraint violation into a 409, leaving every other
/// database error untyped.
pub fn map_unique_violation(err: sqlx::Error, message: &str) -> ExchangeError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ExchangeError::Conflict(message.to_string())
        }
        _ => ExchangeError::Database(err),
    }
}

impl From<validator::ValidationErrors> for ExchangeError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ExchangeError::Validation(errors.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: message,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ExchangeError::Unauthenticated.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ExchangeError::Forbidden("nope".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ExchangeError::NotFound("order".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ExchangeError::Conflict("name taken".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ExchangeError::Insufficient("RUB".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ExchangeError::NoLiquidity.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ExchangeError::NoLiquidity.code(), "NO_LIQUIDITY");
        assert_eq!(
            ExchangeError::Insufficient("RUB".into()).code(),
            "INSUFFICIENT"
        );
        assert_eq!(
            ExchangeError::Database(sqlx::Error::PoolClosed).code(),
            "INTERNAL"
        );
    }
}
