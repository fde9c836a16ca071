use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Per-(user, ticker) holdings. `reserved` tracks funds committed to
/// resting orders; `total - reserved` is spendable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub user_id: Uuid,
    pub ticker: String,
    pub total: i64,
    pub reserved: i64,
}

impl Balance {
    pub fn available(&self) -> i64 {
        self.total - self.reserved
    }
}

/// Admin-initiated deposit or withdrawal.
#[derive(Debug, Deserialize, Validate)]
pub struct BalanceAdjustment {
    pub user_id: Uuid,
    #[validate(custom = "crate::models::instrument::validate_ticker")]
    pub ticker: String,
    #[validate(range(min = 1))]
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available() {
        let balance = Balance {
            user_id: Uuid::new_v4(),
            ticker: "RUB".to_string(),
            total: 100,
            reserved: 30,
        };
        assert_eq!(balance.available(), 70);
    }

    #[test]
    fn test_adjustment_requires_positive_amount() {
        let adjustment = BalanceAdjustment {
            user_id: Uuid::new_v4(),
            ticker: "RUB".to_string(),
            amount: 0,
        };
        assert!(adjustment.validate().is_err());
    }
}
