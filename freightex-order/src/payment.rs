use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freightex_core::money::{Currency, Money};
pub use freightex_core::payment::PaymentMethod;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    ConfirmedByCustomer,
    ConfirmedByCarrier,
    Completed,
}

/// Payment confirmation record, created automatically when its order reaches
/// DELIVERED. One active payment is expected per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub confirmed_by_customer: bool,
    pub confirmed_by_carrier: bool,
    pub confirmed_by_logistic: bool,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(order_id: Uuid, amount: Money, method: PaymentMethod) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount: amount.amount,
            currency: amount.currency,
            method,
            confirmed_by_customer: false,
            confirmed_by_carrier: false,
            confirmed_by_logistic: false,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Reduces the three confirmation flags to a single status value.
    /// COMPLETED requires customer and carrier confirmation, plus logistic
    /// confirmation iff the owning order has a logistic. The completion
    /// timestamp is stamped once and never rewritten.
    pub fn recompute_status(&mut self, needs_logistic: bool) {
        if self.confirmed_by_customer
            && self.confirmed_by_carrier
            && (!needs_logistic || self.confirmed_by_logistic)
        {
            if self.status != PaymentStatus::Completed {
                self.status = PaymentStatus::Completed;
                self.completed_at = Some(Utc::now());
            }
        } else if self.confirmed_by_customer {
            self.status = PaymentStatus::ConfirmedByCustomer;
        } else if self.confirmed_by_carrier {
            self.status = PaymentStatus::ConfirmedByCarrier;
        } else {
            self.status = PaymentStatus::Pending;
        }
    }
}
