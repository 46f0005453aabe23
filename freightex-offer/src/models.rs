use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freightex_core::identity::UserId;
use freightex_core::money::Money;
use freightex_core::payment::PaymentMethod;

/// Offer status. Persisted contract; renames are breaking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Pending,
    CounteredByCustomer,
    AcceptedByCustomer,
    Accepted,
    Rejected,
    Withdrawn,
}

impl OfferStatus {
    /// A live offer still counts against the one-per-(cargo, carrier) rule.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            OfferStatus::Pending | OfferStatus::CounteredByCustomer | OfferStatus::AcceptedByCustomer
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OfferStatus::Accepted | OfferStatus::Rejected | OfferStatus::Withdrawn
        )
    }
}

/// A price bid against a cargo listing.
///
/// `carrier_id` is absent on broker deals where the logistic has not yet
/// found a driver; such deals produce a NO_DRIVER order and use the invite
/// flow to attach the carrier later. At least one of `carrier_id` and
/// `logistic_id` is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub cargo_id: Uuid,
    pub carrier_id: Option<UserId>,
    pub logistic_id: Option<UserId>,
    /// Targeted recipient for directed offers; None for open bids.
    pub recipient_id: Option<UserId>,
    pub price: Money,
    /// Settlement method proposed with the bid, snapshotted into the order.
    pub method: PaymentMethod,
    pub status: OfferStatus,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(
        cargo_id: Uuid,
        carrier_id: Option<UserId>,
        logistic_id: Option<UserId>,
        recipient_id: Option<UserId>,
        price: Money,
        method: PaymentMethod,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cargo_id,
            carrier_id,
            logistic_id,
            recipient_id,
            price,
            method,
            status: OfferStatus::Pending,
            is_active: true,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_live(&self) -> bool {
        self.is_active && self.status.is_live()
    }

    pub fn is_participant(&self, user_id: UserId, cargo_customer: UserId) -> bool {
        user_id == cargo_customer
            || self.carrier_id == Some(user_id)
            || self.logistic_id == Some(user_id)
    }

    pub fn set_status(&mut self, status: OfferStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Takes the offer out of the live set without rewriting its status.
    /// Used by expiry and by the finalize path before the terminal status
    /// is applied.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    pub fn reprice(&mut self, price: Money) {
        self.price = price;
        self.updated_at = Utc::now();
    }
}
