use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row in the append-only trade journal.
#[derive(Debug, Clone, FromRow)]
pub struct Trade {
    pub id: i64,
    pub ticker: String,
    pub price: i64,
    pub qty: i64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TradeView {
    pub ticker: String,
    pub amount: i64,
    pub price: i64,
    pub timestamp: DateTime<Utc>,
}

impl From<Trade> for TradeView {
    fn from(trade: Trade) -> Self {
        Self {
            ticker: trade.ticker,
            amount: trade.qty,
            price: trade.price,
            timestamp: trade.executed_at,
        }
    }
}
