use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freightex_core::identity::UserId;
use freightex_core::money::Money;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferEventKind {
    Offered,
    CounterFromCustomer,
    CounterFromCarrier,
    AcceptedByCustomer,
    AcceptedByCarrier,
    AcceptedByLogistic,
    Rejected,
    Withdrawn,
    Deactivated,
}

/// One row of the negotiation audit log. Append-only: rows are never edited
/// or deleted, so the full timeline of a negotiation can be reconstructed
/// from the amount snapshots alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferEvent {
    pub id: Uuid,
    pub offer_id: Uuid,
    /// None for system-driven rows (expiry, cascade deactivation).
    pub actor_id: Option<UserId>,
    pub kind: OfferEventKind,
    pub amount: Money,
    pub at: DateTime<Utc>,
}

impl OfferEvent {
    pub fn new(offer_id: Uuid, actor_id: Option<UserId>, kind: OfferEventKind, amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            offer_id,
            actor_id,
            kind,
            amount,
            at: Utc::now(),
        }
    }
}
