pub mod agreements;
pub mod listings;
pub mod offers;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::geo::Geocoder;
use freightex_core::money::{Currency, Money};
use freightex_core::notify::{Notification, NotificationSink};
use freightex_listing::CargoListing;
use freightex_offer::{Agreement, Offer, OfferEvent};
use freightex_order::{Order, OrderChange, OrderDocument, Payment};
use freightex_store::{AppConfig, MemoryStore};

/// The deal-closing service. All state mutation flows through here: each
/// operation takes the store guard once, validates, writes, queues its
/// notifications, and only dispatches them after the guard has dropped.
pub struct DealEngine {
    store: Arc<MemoryStore>,
    geocoder: Arc<dyn Geocoder>,
    notifier: Arc<dyn NotificationSink>,
    config: AppConfig,
}

impl DealEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        geocoder: Arc<dyn Geocoder>,
        notifier: Arc<dyn NotificationSink>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            geocoder,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Fire-and-forget delivery of the outbox collected under the store
    /// guard. A sink failure is logged and swallowed; the state transition
    /// that produced the notification has already committed.
    pub(crate) async fn dispatch(&self, outbox: Vec<Notification>) {
        for notification in outbox {
            let kind = notification.kind;
            let user_id = notification.user_id;
            if let Err(err) = self.notifier.notify(notification).await {
                tracing::warn!(%user_id, ?kind, %err, "notification delivery failed");
            }
        }
    }

    // ---- read side ----

    pub async fn get_listing(&self, id: Uuid) -> Result<CargoListing, Error> {
        Ok(self.store.lock().await.listing(id)?.clone())
    }

    pub async fn get_offer(&self, id: Uuid) -> Result<Offer, Error> {
        Ok(self.store.lock().await.offer(id)?.clone())
    }

    pub async fn get_agreement(&self, id: Uuid) -> Result<Agreement, Error> {
        Ok(self.store.lock().await.agreement(id)?.clone())
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, Error> {
        Ok(self.store.lock().await.order(id)?.clone())
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<Payment, Error> {
        Ok(self.store.lock().await.payment(id)?.clone())
    }

    pub async fn order_for_cargo(&self, cargo_id: Uuid) -> Option<Uuid> {
        self.store.lock().await.order_id_for_cargo(cargo_id)
    }

    pub async fn offer_timeline(&self, offer_id: Uuid) -> Result<Vec<OfferEvent>, Error> {
        let state = self.store.lock().await;
        state.offer(offer_id)?;
        Ok(state.events_for_offer(offer_id))
    }

    pub async fn order_history(&self, order_id: Uuid) -> Result<Vec<OrderChange>, Error> {
        let state = self.store.lock().await;
        state.order(order_id)?;
        Ok(state.changes_for_order(order_id))
    }

    pub async fn order_documents(&self, order_id: Uuid) -> Result<Vec<OrderDocument>, Error> {
        let state = self.store.lock().await;
        state.order(order_id)?;
        Ok(state.documents_for_order(order_id))
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, Error> {
        let state = self.store.lock().await;
        state.order(order_id)?;
        Ok(state.payments_for_order(order_id))
    }

    /// Display-side conversion of the order total through the configured
    /// rate table. The stored price keeps its original currency; only this
    /// view moves with the rates.
    pub async fn order_price_in(&self, order_id: Uuid, currency: Currency) -> Result<Money, Error> {
        let order = self.get_order(order_id).await?;
        let price = Money::new(order.price_total, order.currency)?;
        self.config.rates.convert(price, currency)
    }
}
