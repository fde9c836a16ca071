use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Market => write!(f, "MARKET"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyExecuted,
    Executed,
    Cancelled,
}

impl OrderStatus {
    /// Status implied by a fill level. Terminal CANCELLED is set explicitly
    /// by cancellation and never by fills.
    pub fn for_fill(filled: i64, qty: i64) -> Self {
        if filled == 0 {
            OrderStatus::New
        } else if filled < qty {
            OrderStatus::PartiallyExecuted
        } else {
            OrderStatus::Executed
        }
    }

    /// A resting or in-flight order that can still trade or be cancelled.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyExecuted)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticker: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub qty: i64,
    pub price: Option<i64>,
    pub filled: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn remaining(&self) -> i64 {
        self.qty - self.filled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LimitOrderBody {
    pub direction: Direction,
    #[validate(custom = "crate::models::instrument::validate_ticker")]
    pub ticker: String,
    #[validate(range(min = 1))]
    pub qty: i64,
    #[validate(range(min = 1))]
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MarketOrderBody {
    pub direction: Direction,
    #[validate(custom = "crate::models::instrument::validate_ticker")]
    pub ticker: String,
    #[validate(range(min = 1))]
    pub qty: i64,
}

/// Incoming order payload. The two shapes are distinguished by the
/// presence of `price`; LIMIT must come first so untagged deserialization
/// tries it before falling back to MARKET.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderBody {
    Limit(LimitOrderBody),
    Market(MarketOrderBody),
}

impl OrderBody {
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            OrderBody::Limit(body) => body.validate(),
            OrderBody::Market(body) => body.validate(),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            OrderBody::Limit(body) => body.direction,
            OrderBody::Market(body) => body.direction,
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            OrderBody::Limit(body) => &body.ticker,
            OrderBody::Market(body) => &body.ticker,
        }
    }

    pub fn qty(&self) -> i64 {
        match self {
            OrderBody::Limit(body) => body.qty,
            OrderBody::Market(body) => body.qty,
        }
    }

    pub fn price(&self) -> Option<i64> {
        match self {
            OrderBody::Limit(body) => Some(body.price),
            OrderBody::Market(_) => None,
        }
    }

    pub fn order_type(&self) -> OrderType {
        match self {
            OrderBody::Limit(_) => OrderType::Limit,
            OrderBody::Market(_) => OrderType::Market,
        }
    }
}

/// External order shape: `filled` is reported for LIMIT orders only.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub status: OrderStatus,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub body: OrderBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled: Option<i64>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let (body, filled) = match order.price {
            Some(price) => (
                OrderBody::Limit(LimitOrderBody {
                    direction: order.direction,
                    ticker: order.ticker,
                    qty: order.qty,
                    price,
                }),
                Some(order.filled),
            ),
            None => (
                OrderBody::Market(MarketOrderBody {
                    direction: order.direction,
                    ticker: order.ticker,
                    qty: order.qty,
                }),
                None,
            ),
        };

        Self {
            id: order.id,
            status: order.status,
            user_id: order.user_id,
            timestamp: order.created_at,
            body,
            filled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order_id: Uuid,
}

/// Plain `{"success": true}` acknowledgement.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { success: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_body_with_price_is_limit() {
        let body: OrderBody = serde_json::from_str(
            r#"{"direction": "BUY", "ticker": "MEMCOIN", "qty": 5, "price": 100}"#,
        )
        .unwrap();

        assert!(matches!(body, OrderBody::Limit(_)));
        assert_eq!(body.order_type(), OrderType::Limit);
        assert_eq!(body.price(), Some(100));
        assert_eq!(body.qty(), 5);
    }

    #[test]
    fn test_order_body_without_price_is_market() {
        let body: OrderBody =
            serde_json::from_str(r#"{"direction": "SELL", "ticker": "MEMCOIN", "qty": 3}"#)
                .unwrap();

        assert!(matches!(body, OrderBody::Market(_)));
        assert_eq!(body.order_type(), OrderType::Market);
        assert_eq!(body.price(), None);
        assert_eq!(body.direction(), Direction::Sell);
    }

    #[test]
    fn test_status_for_fill() {
        assert_eq!(OrderStatus::for_fill(0, 10), OrderStatus::New);
        assert_eq!(OrderStatus::for_fill(4, 10), OrderStatus::PartiallyExecuted);
        assert_eq!(OrderStatus::for_fill(10, 10), OrderStatus::Executed);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyExecuted).unwrap(),
            "\"PARTIALLY_EXECUTED\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::New).unwrap(),
            "\"NEW\""
        );
    }

    #[test]
    fn test_market_view_omits_filled() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticker: "MEMCOIN".to_string(),
            direction: Direction::Buy,
            order_type: OrderType::Market,
            qty: 5,
            price: None,
            filled: 5,
            status: OrderStatus::Executed,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(OrderView::from(order)).unwrap();
        assert!(json.get("filled").is_none());
        assert!(json["body"].get("price").is_none());
    }

    #[test]
    fn test_limit_view_reports_filled() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticker: "MEMCOIN".to_string(),
            direction: Direction::Sell,
            order_type: OrderType::Limit,
            qty: 10,
            price: Some(50),
            filled: 4,
            status: OrderStatus::PartiallyExecuted,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(OrderView::from(order)).unwrap();
        assert_eq!(json["filled"], 4);
        assert_eq!(json["body"]["price"], 50);
        assert_eq!(json["status"], "PARTIALLY_EXECUTED");
    }

    #[test]
    fn test_validation_rejects_zero_qty() {
        let body: OrderBody =
            serde_json::from_str(r#"{"direction": "BUY", "ticker": "MEMCOIN", "qty": 0}"#)
                .unwrap();
        assert!(body.validate().is_err());
    }
}
