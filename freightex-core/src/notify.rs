use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::identity::UserId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    OfferReceived,
    OfferCountered,
    OfferAccepted,
    OfferRejected,
    OfferWithdrawn,
    AgreementExpired,
    AgreementCancelled,
    OrderCreated,
    OrderStatusChanged,
    DriverProblem,
    PaymentConfirmationRequired,
    RatingRequired,
    CarrierInvited,
}

/// Outbound notification payload. Dispatch is fire-and-forget: a delivery
/// failure must never fail the state transition that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub cargo_id: Option<Uuid>,
    pub offer_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

impl Notification {
    pub fn new(user_id: UserId, kind: NotificationKind, title: &str, message: String) -> Self {
        Self {
            user_id,
            kind,
            title: title.to_string(),
            message,
            cargo_id: None,
            offer_id: None,
            order_id: None,
        }
    }

    pub fn for_cargo(mut self, cargo_id: Uuid) -> Self {
        self.cargo_id = Some(cargo_id);
        self
    }

    pub fn for_offer(mut self, offer_id: Uuid) -> Self {
        self.offer_id = Some(offer_id);
        self
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

/// External notification collaborator (DB row + websocket + email + push in
/// the deployed system).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), Error>;
}

/// Records everything it is asked to deliver. Used by tests to assert that
/// side effects fire only after the owning transaction committed.
#[derive(Default)]
pub struct RecordingSink {
    sent: std::sync::Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sink poisoned").clone()
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) -> Result<(), Error> {
        self.sent.lock().expect("sink poisoned").push(notification);
        Ok(())
    }
}

/// Always fails. Used to verify that delivery errors are swallowed.
pub struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn notify(&self, _notification: Notification) -> Result<(), Error> {
        Err(Error::ExternalServiceUnavailable("push gateway down".into()))
    }
}
