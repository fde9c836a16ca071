use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

/// The quote asset every instrument trades against.
pub const QUOTE_TICKER: &str = "RUB";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Validate)]
pub struct Instrument {
    pub name: String,
    #[validate(custom = "validate_ticker")]
    pub ticker: String,
}

/// Tickers are 2-10 uppercase ASCII letters.
pub fn validate_ticker(ticker: &str) -> Result<(), ValidationError> {
    let len_ok = (2..=10).contains(&ticker.len());
    if len_ok && ticker.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("ticker"))
    }
}
