use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgreementStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
}

impl AgreementStatus {
    pub fn is_terminal(&self) -> bool {
        *self != AgreementStatus::Pending
    }
}

/// The handshake: acceptance bookkeeping for one offer, one-to-one.
///
/// Terminal states are immutable. The commit decision itself (creating the
/// Order) lives in the service layer so every acceptance call can safely
/// re-attempt finalization under the store lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub accepted_by_customer: bool,
    pub accepted_by_carrier: bool,
    pub accepted_by_logistic: bool,
    pub status: AgreementStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agreement {
    pub fn new(offer_id: Uuid, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            offer_id,
            accepted_by_customer: false,
            accepted_by_carrier: false,
            accepted_by_logistic: false,
            status: AgreementStatus::Pending,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Customer acceptance is required always; carrier and logistic
    /// acceptance only when the corresponding party exists on the offer.
    /// Arrival order of acceptances does not matter.
    pub fn is_fully_accepted(&self, has_carrier: bool, has_logistic: bool) -> bool {
        self.accepted_by_customer
            && (!has_carrier || self.accepted_by_carrier)
            && (!has_logistic || self.accepted_by_logistic)
    }

    pub fn set_status(&mut self, status: AgreementStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
