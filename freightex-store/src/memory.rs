use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::geo::Coordinates;
use freightex_core::identity::UserId;
use freightex_listing::CargoListing;
use freightex_offer::{Agreement, Offer, OfferEvent};
use freightex_order::{Order, OrderChange, OrderDocument, Payment};

/// All aggregates behind one async mutex.
///
/// The guard scope is the transaction boundary: every service operation does
/// its reads, validations and writes inside a single guard, so the finalize
/// re-check and its four writes are serialized exactly like the row lock in
/// a relational store. Nothing awaits external I/O while the guard is held;
/// notifications are collected and dispatched after it drops.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().await
    }
}

#[derive(Default)]
pub struct StoreState {
    pub listings: HashMap<Uuid, CargoListing>,
    pub offers: HashMap<Uuid, Offer>,
    pub offer_events: Vec<OfferEvent>,
    pub agreements: HashMap<Uuid, Agreement>,
    pub agreement_by_offer: HashMap<Uuid, Uuid>,
    pub orders: HashMap<Uuid, Order>,
    pub order_by_cargo: HashMap<Uuid, Uuid>,
    pub order_changes: Vec<OrderChange>,
    pub documents: Vec<OrderDocument>,
    pub payments: HashMap<Uuid, Payment>,
    pub invite_tokens: HashMap<String, Uuid>,
    pub geocode_cache: HashMap<(String, String), Coordinates>,
}

impl StoreState {
    // ---- listings ----

    pub fn listing(&self, id: Uuid) -> Result<&CargoListing, Error> {
        self.listings
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("cargo listing {id}")))
    }

    pub fn listing_mut(&mut self, id: Uuid) -> Result<&mut CargoListing, Error> {
        self.listings
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("cargo listing {id}")))
    }

    // ---- offers ----

    pub fn offer(&self, id: Uuid) -> Result<&Offer, Error> {
        self.offers
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("offer {id}")))
    }

    pub fn offer_mut(&mut self, id: Uuid) -> Result<&mut Offer, Error> {
        self.offers
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("offer {id}")))
    }

    /// One live offer per (cargo, bidder). The bidder is the carrier, or the
    /// logistic for carrier-less broker bids.
    pub fn has_live_offer(
        &self,
        cargo_id: Uuid,
        carrier_id: Option<UserId>,
        logistic_id: Option<UserId>,
    ) -> bool {
        self.offers.values().any(|o| {
            o.cargo_id == cargo_id
                && o.is_live()
                && match carrier_id {
                    Some(carrier) => o.carrier_id == Some(carrier),
                    None => o.carrier_id.is_none() && o.logistic_id == logistic_id,
                }
        })
    }

    pub fn live_offer_ids_for_cargo(&self, cargo_id: Uuid) -> Vec<Uuid> {
        self.offers
            .values()
            .filter(|o| o.cargo_id == cargo_id && o.is_live())
            .map(|o| o.id)
            .collect()
    }

    pub fn record_offer_event(&mut self, event: OfferEvent) {
        self.offer_events.push(event);
    }

    pub fn events_for_offer(&self, offer_id: Uuid) -> Vec<OfferEvent> {
        self.offer_events
            .iter()
            .filter(|e| e.offer_id == offer_id)
            .cloned()
            .collect()
    }

    // ---- agreements ----

    pub fn agreement(&self, id: Uuid) -> Result<&Agreement, Error> {
        self.agreements
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("agreement {id}")))
    }

    pub fn agreement_mut(&mut self, id: Uuid) -> Result<&mut Agreement, Error> {
        self.agreements
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("agreement {id}")))
    }

    pub fn agreement_id_for_offer(&self, offer_id: Uuid) -> Option<Uuid> {
        self.agreement_by_offer.get(&offer_id).copied()
    }

    pub fn insert_agreement(&mut self, agreement: Agreement) {
        self.agreement_by_offer.insert(agreement.offer_id, agreement.id);
        self.agreements.insert(agreement.id, agreement);
    }

    // ---- orders ----

    pub fn order(&self, id: Uuid) -> Result<&Order, Error> {
        self.orders
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("order {id}")))
    }

    pub fn order_mut(&mut self, id: Uuid) -> Result<&mut Order, Error> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("order {id}")))
    }

    pub fn order_id_for_cargo(&self, cargo_id: Uuid) -> Option<Uuid> {
        self.order_by_cargo.get(&cargo_id).copied()
    }

    /// Enforces the single most important invariant in the system: exactly
    /// one order per cargo listing.
    pub fn insert_order(&mut self, order: Order) -> Result<Uuid, Error> {
        if self.order_by_cargo.contains_key(&order.cargo_id) {
            return Err(Error::Conflict(format!(
                "cargo listing {} already has an order",
                order.cargo_id
            )));
        }
        let id = order.id;
        self.order_by_cargo.insert(order.cargo_id, id);
        self.orders.insert(id, order);
        Ok(id)
    }

    pub fn record_order_change(&mut self, change: OrderChange) {
        self.order_changes.push(change);
    }

    pub fn changes_for_order(&self, order_id: Uuid) -> Vec<OrderChange> {
        self.order_changes
            .iter()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn documents_for_order(&self, order_id: Uuid) -> Vec<OrderDocument> {
        self.documents
            .iter()
            .filter(|d| d.order_id == order_id)
            .cloned()
            .collect()
    }

    // ---- payments ----

    pub fn payment(&self, id: Uuid) -> Result<&Payment, Error> {
        self.payments
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("payment {id}")))
    }

    pub fn payment_mut(&mut self, id: Uuid) -> Result<&mut Payment, Error> {
        self.payments
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("payment {id}")))
    }

    pub fn payments_for_order(&self, order_id: Uuid) -> Vec<Payment> {
        self.payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightex_core::money::{Currency, Money};
    use freightex_core::payment::PaymentMethod;

    fn order_for(cargo_id: Uuid) -> Order {
        Order::new(
            cargo_id,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            None,
            Uuid::new_v4(),
            Money::new(100, Currency::Usd).unwrap(),
            PaymentMethod::Cash,
            10.0,
        )
    }

    #[test]
    fn test_one_order_per_cargo() {
        let mut state = StoreState::default();
        let cargo_id = Uuid::new_v4();

        state.insert_order(order_for(cargo_id)).unwrap();
        let second = state.insert_order(order_for(cargo_id));
        assert!(matches!(second, Err(Error::Conflict(_))));

        // A different cargo is unaffected
        state.insert_order(order_for(Uuid::new_v4())).unwrap();
        assert_eq!(state.orders.len(), 2);
    }

    #[test]
    fn test_events_are_append_only_per_offer() {
        let mut state = StoreState::default();
        let offer_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let amount = Money::new(100, Currency::Usd).unwrap();

        state.record_offer_event(OfferEvent::new(
            offer_id,
            None,
            freightex_offer::OfferEventKind::Offered,
            amount,
        ));
        state.record_offer_event(OfferEvent::new(
            other,
            None,
            freightex_offer::OfferEventKind::Offered,
            amount,
        ));

        assert_eq!(state.events_for_offer(offer_id).len(), 1);
        assert_eq!(state.offer_events.len(), 2);
    }
}
