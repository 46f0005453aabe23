use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freightex_core::identity::UserId;
use freightex_core::money::{Currency, Money};

use crate::payment::PaymentMethod;

/// Order status. Persisted contract; renames are breaking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    NoDriver,
    Pending,
    EnRoute,
    Delivered,
    Paid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NoDriver => "NO_DRIVER",
            OrderStatus::Pending => "PENDING",
            OrderStatus::EnRoute => "EN_ROUTE",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Paid => "PAID",
        }
    }

    /// Closed table of legal transitions. Status only ever advances; PAID is
    /// reachable exclusively through payment completion.
    pub fn can_transition_to(&self, new: OrderStatus) -> bool {
        matches!(
            (self, new),
            (OrderStatus::NoDriver, OrderStatus::Pending)
                | (OrderStatus::Pending, OrderStatus::EnRoute)
                | (OrderStatus::EnRoute, OrderStatus::Delivered)
                | (OrderStatus::Delivered, OrderStatus::Paid)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Stopped,
    EnRoute,
    Problem,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Stopped => "STOPPED",
            DriverStatus::EnRoute => "EN_ROUTE",
            DriverStatus::Problem => "PROBLEM",
        }
    }
}

/// The binding transport job. Created exactly once per cargo listing, and
/// only by agreement finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub cargo_id: Uuid,
    pub customer_id: UserId,
    pub carrier_id: Option<UserId>,
    pub logistic_id: Option<UserId>,
    pub offer_id: Uuid,
    pub status: OrderStatus,
    pub driver_status: DriverStatus,
    pub method: PaymentMethod,
    pub currency: Currency,
    pub price_total: i64,
    pub route_distance_km: f64,
    pub loading_at: Option<DateTime<Utc>>,
    pub unloading_at: Option<DateTime<Utc>>,
    /// Single-use carrier invite token for NO_DRIVER broker orders.
    pub invite_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cargo_id: Uuid,
        customer_id: UserId,
        carrier_id: Option<UserId>,
        logistic_id: Option<UserId>,
        offer_id: Uuid,
        price: Money,
        method: PaymentMethod,
        route_distance_km: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cargo_id,
            customer_id,
            carrier_id,
            logistic_id,
            offer_id,
            status: OrderStatus::NoDriver,
            driver_status: DriverStatus::Stopped,
            method,
            currency: price.currency,
            price_total: price.amount,
            route_distance_km,
            loading_at: None,
            unloading_at: None,
            invite_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        user_id == self.customer_id
            || self.carrier_id == Some(user_id)
            || self.logistic_id == Some(user_id)
    }

    /// Everyone on the deal, in customer, carrier, logistic order.
    pub fn parties(&self) -> Vec<UserId> {
        [Some(self.customer_id), self.carrier_id, self.logistic_id]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_driver_status(&mut self, status: DriverStatus) {
        self.driver_status = status;
        self.updated_at = Utc::now();
    }

    pub fn price_per_km(&self) -> f64 {
        if self.route_distance_km > 0.0 {
            self.price_total as f64 / self.route_distance_km
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeField {
    Status,
    DriverStatus,
}

/// Append-only audit row for a single order transition. System-driven rows
/// (e.g. PAID after payment completion) carry no actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderChange {
    pub id: Uuid,
    pub order_id: Uuid,
    pub field: ChangeField,
    pub old: String,
    pub new: String,
    pub actor: Option<UserId>,
    pub at: DateTime<Utc>,
}

impl OrderChange {
    pub fn new(
        order_id: Uuid,
        field: ChangeField,
        old: &str,
        new: &str,
        actor: Option<UserId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            field,
            old: old.to_string(),
            new: new.to_string(),
            actor,
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    Loading,
    Unloading,
    Other,
}

/// Metadata of an uploaded transport document. File storage itself is an
/// external concern; the core only reacts to the first LOADING/UNLOADING
/// upload by stamping the matching timestamp on the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDocument {
    pub id: Uuid,
    pub order_id: Uuid,
    pub kind: DocumentKind,
    pub title: String,
    pub uploaded_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl OrderDocument {
    pub fn new(order_id: Uuid, kind: DocumentKind, title: &str, uploaded_by: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            kind,
            title: title.to_string(),
            uploaded_by,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            None,
            Uuid::new_v4(),
            Money::new(500, Currency::Usd).unwrap(),
            PaymentMethod::Cash,
            270.0,
        )
    }

    #[test]
    fn test_new_order_defaults() {
        let o = order();
        assert_eq!(o.status, OrderStatus::NoDriver);
        assert_eq!(o.driver_status, DriverStatus::Stopped);
        assert_eq!(o.price_total, 500);
        assert_eq!(o.currency, Currency::Usd);
        assert!(o.invite_token.is_none());
    }

    #[test]
    fn test_transition_table_is_forward_only() {
        use OrderStatus::*;

        assert!(NoDriver.can_transition_to(Pending));
        assert!(Pending.can_transition_to(EnRoute));
        assert!(EnRoute.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Paid));

        assert!(!Pending.can_transition_to(NoDriver));
        assert!(!Delivered.can_transition_to(EnRoute));
        assert!(!NoDriver.can_transition_to(Delivered));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Paid));
    }

    #[test]
    fn test_price_per_km() {
        let mut o = order();
        assert!((o.price_per_km() - 500.0 / 270.0).abs() < 1e-9);

        o.route_distance_km = 0.0;
        assert_eq!(o.price_per_km(), 0.0);
    }
}
