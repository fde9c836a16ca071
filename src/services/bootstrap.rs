//! First-start seeding: the quote instrument and one admin principal.

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ExchangeError;
use crate::models::QUOTE_TICKER;

pub async fn seed(pool: &PgPool, config: &AppConfig) -> Result<(), ExchangeError> {
    sqlx::query("INSERT INTO instruments (ticker, name) VALUES ($1, 'rubles') ON CONFLICT DO NOTHING")
        .bind(QUOTE_TICKER)
        .execute(pool)
        .await?;

    let api_key = Uuid::parse_str(&config.admin_api_key).map_err(|_| {
        ExchangeError::Validation("ADMIN_API_KEY must be a 128-bit hex key".to_string())
    })?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (id, name, role, api_key)
        VALUES ($1, $2, 'ADMIN', $3)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&config.admin_name)
    .bind(api_key)
    .execute(pool)
    .await?;

    if inserted.rows_affected() > 0 {
        tracing::info!("admin principal '{}' created", config.admin_name);
    } else {
        tracing::debug!("admin principal '{}' already exists", config.admin_name);
    }

    Ok(())
}
