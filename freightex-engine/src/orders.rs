use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::identity::{Actor, Role};
use freightex_core::money::Money;
use freightex_core::notify::{Notification, NotificationKind};
use freightex_order::{
    ChangeField, DocumentKind, DriverStatus, Order, OrderChange, OrderDocument, OrderStatus, Payment,
};
use freightex_store::StoreState;

use crate::DealEngine;

impl DealEngine {
    /// Advances the order along NO_DRIVER -> PENDING -> EN_ROUTE ->
    /// DELIVERED. Repeating the current status is a no-op; PAID is reached
    /// through payment completion only. Reaching DELIVERED opens the payment
    /// confirmation round.
    pub async fn set_order_status(
        &self,
        order_id: Uuid,
        actor: Actor,
        status: OrderStatus,
    ) -> Result<Order, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::set_order_status_locked(&mut state, order_id, actor, status, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn set_order_status_locked(
        state: &mut StoreState,
        order_id: Uuid,
        actor: Actor,
        status: OrderStatus,
        outbox: &mut Vec<Notification>,
    ) -> Result<Order, Error> {
        let order = state.order(order_id)?.clone();
        if !order.is_participant(actor.id) {
            return Err(Error::Forbidden("not a participant of this order".into()));
        }
        if order.status == status {
            return Ok(order);
        }
        if status == OrderStatus::Paid {
            return Err(Error::InvalidState(
                "PAID is reached through payment confirmation, not set directly".into(),
            ));
        }
        if !order.status.can_transition_to(status) {
            return Err(Error::InvalidState(format!(
                "illegal order transition {} -> {}",
                order.status.as_str(),
                status.as_str()
            )));
        }

        state.order_mut(order_id)?.set_status(status);
        state.record_order_change(OrderChange::new(
            order_id,
            ChangeField::Status,
            order.status.as_str(),
            status.as_str(),
            Some(actor.id),
        ));
        tracing::info!(%order_id, from = order.status.as_str(), to = status.as_str(), "order status changed");

        if status == OrderStatus::Delivered {
            Self::open_payment_round_locked(state, &order, outbox)?;
            state.listing_mut(order.cargo_id)?.mark_delivered();
        } else {
            for party in order.parties().into_iter().filter(|p| *p != actor.id) {
                outbox.push(
                    Notification::new(
                        party,
                        NotificationKind::OrderStatusChanged,
                        "Order update",
                        format!("Order moved from {} to {}", order.status.as_str(), status.as_str()),
                    )
                    .for_order(order_id),
                );
            }
        }
        Ok(state.order(order_id)?.clone())
    }

    /// Creates the confirmation record once per order. Re-delivery attempts
    /// fall through the transition table before they get here, so the only
    /// guard needed is the existence check.
    fn open_payment_round_locked(
        state: &mut StoreState,
        order: &Order,
        outbox: &mut Vec<Notification>,
    ) -> Result<(), Error> {
        if state.payments_for_order(order.id).is_empty() {
            let amount = Money::new(order.price_total, order.currency)?;
            let payment = Payment::new(order.id, amount, order.method);
            tracing::info!(order_id = %order.id, payment_id = %payment.id, "payment round opened");
            state.payments.insert(payment.id, payment);
        }
        for party in order.parties() {
            outbox.push(
                Notification::new(
                    party,
                    NotificationKind::PaymentConfirmationRequired,
                    "Cargo delivered",
                    "Confirm the payment to close out the order".to_string(),
                )
                .for_order(order.id),
            );
        }
        Ok(())
    }

    /// Carrier-only telemetry. Writes a history row only when the value
    /// actually changes; PROBLEM alerts the other parties.
    pub async fn set_driver_status(
        &self,
        order_id: Uuid,
        actor: Actor,
        status: DriverStatus,
    ) -> Result<Order, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::set_driver_status_locked(&mut state, order_id, actor, status, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn set_driver_status_locked(
        state: &mut StoreState,
        order_id: Uuid,
        actor: Actor,
        status: DriverStatus,
        outbox: &mut Vec<Notification>,
    ) -> Result<Order, Error> {
        let order = state.order(order_id)?.clone();
        if order.carrier_id != Some(actor.id) {
            return Err(Error::Forbidden("only the assigned carrier reports driver status".into()));
        }
        if order.driver_status == status {
            return Ok(order);
        }

        state.order_mut(order_id)?.set_driver_status(status);
        state.record_order_change(OrderChange::new(
            order_id,
            ChangeField::DriverStatus,
            order.driver_status.as_str(),
            status.as_str(),
            Some(actor.id),
        ));

        if status == DriverStatus::Problem {
            for party in order.parties().into_iter().filter(|p| *p != actor.id) {
                outbox.push(
                    Notification::new(
                        party,
                        NotificationKind::DriverProblem,
                        "Driver reported a problem",
                        "The driver flagged a problem en route".to_string(),
                    )
                    .for_order(order_id),
                );
            }
        }
        Ok(state.order(order_id)?.clone())
    }

    /// Registers an uploaded transport document. The first LOADING and
    /// UNLOADING uploads stamp the matching timestamps on the order.
    pub async fn attach_document(
        &self,
        order_id: Uuid,
        actor: Actor,
        kind: DocumentKind,
        title: &str,
    ) -> Result<OrderDocument, Error> {
        let mut state = self.store.lock().await;
        let order = state.order(order_id)?.clone();
        if !order.is_participant(actor.id) {
            return Err(Error::Forbidden("not a participant of this order".into()));
        }
        if title.trim().is_empty() {
            return Err(Error::validation("title", "document title is required"));
        }

        let document = OrderDocument::new(order_id, kind, title, actor.id);
        let now = document.created_at;
        {
            let order = state.order_mut(order_id)?;
            match kind {
                DocumentKind::Loading if order.loading_at.is_none() => {
                    order.loading_at = Some(now);
                }
                DocumentKind::Unloading if order.unloading_at.is_none() => {
                    order.unloading_at = Some(now);
                }
                _ => {}
            }
        }
        state.documents.push(document.clone());
        Ok(document)
    }

    /// Issues the single-use carrier invite for a NO_DRIVER broker order.
    /// Calling again before the invite is used returns the same token.
    pub async fn create_invite(&self, order_id: Uuid, actor: Actor) -> Result<String, Error> {
        let mut state = self.store.lock().await;
        let order = state.order(order_id)?.clone();
        if order.logistic_id != Some(actor.id) {
            return Err(Error::Forbidden("only the broker can invite a carrier".into()));
        }
        if order.status != OrderStatus::NoDriver || order.carrier_id.is_some() {
            return Err(Error::InvalidState(format!(
                "order {order_id} already has a driver"
            )));
        }
        if let Some(token) = order.invite_token {
            return Ok(token);
        }

        let token = format!("INV-{}", Uuid::new_v4().simple());
        state.order_mut(order_id)?.invite_token = Some(token.clone());
        state.invite_tokens.insert(token.clone(), order_id);
        Ok(token)
    }

    /// Redeems a carrier invite: attaches the caller as the driver and moves
    /// the order to PENDING. The token is consumed either way.
    pub async fn accept_invite(&self, token: &str, actor: Actor) -> Result<Order, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::accept_invite_locked(&mut state, token, actor, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn accept_invite_locked(
        state: &mut StoreState,
        token: &str,
        actor: Actor,
        outbox: &mut Vec<Notification>,
    ) -> Result<Order, Error> {
        if actor.role != Role::Carrier {
            return Err(Error::Forbidden("only carriers can redeem an invite".into()));
        }
        let order_id = state
            .invite_tokens
            .get(token)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("invite token {token}")))?;
        let order = state.order(order_id)?.clone();
        if order.status != OrderStatus::NoDriver || order.invite_token.as_deref() != Some(token) {
            return Err(Error::NotFound(format!("invite token {token}")));
        }

        {
            let order = state.order_mut(order_id)?;
            order.carrier_id = Some(actor.id);
            order.invite_token = None;
            order.set_status(OrderStatus::Pending);
        }
        state.invite_tokens.remove(token);
        state.listing_mut(order.cargo_id)?.assigned_carrier = Some(actor.id);
        state.record_order_change(OrderChange::new(
            order_id,
            ChangeField::Status,
            OrderStatus::NoDriver.as_str(),
            OrderStatus::Pending.as_str(),
            Some(actor.id),
        ));
        tracing::info!(%order_id, carrier_id = %actor.id, "carrier joined via invite");

        for party in [Some(order.customer_id), order.logistic_id].into_iter().flatten() {
            outbox.push(
                Notification::new(
                    party,
                    NotificationKind::CarrierInvited,
                    "Driver attached",
                    "A carrier joined the order, it is now pending pickup".to_string(),
                )
                .for_order(order_id),
            );
        }
        Ok(state.order(order_id)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{carrier_offer, engine, posted_listing};
    use freightex_listing::CargoStatus;

    async fn closed_deal(
        engine: &DealEngine,
        customer: Actor,
        carrier: Actor,
    ) -> (Uuid, Uuid) {
        let listing = posted_listing(engine, customer).await;
        let offer = carrier_offer(engine, carrier, listing.id, 500).await;
        engine.accept_offer(offer.id, customer).await.unwrap();
        engine.accept_offer(offer.id, carrier).await.unwrap();
        let order_id = engine.order_for_cargo(listing.id).await.unwrap();
        (listing.id, order_id)
    }

    #[tokio::test]
    async fn test_full_lifecycle_to_delivered() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let (cargo_id, order_id) = closed_deal(&engine, customer, carrier).await;

        engine
            .set_order_status(order_id, carrier, OrderStatus::Pending)
            .await
            .unwrap();
        engine
            .set_order_status(order_id, carrier, OrderStatus::EnRoute)
            .await
            .unwrap();
        let order = engine
            .set_order_status(order_id, carrier, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);

        // Delivery opened exactly one payment and mirrored onto the cargo
        assert_eq!(engine.payments_for_order(order_id).await.unwrap().len(), 1);
        let listing = engine.get_listing(cargo_id).await.unwrap();
        assert_eq!(listing.status, CargoStatus::Delivered);

        let history = engine.order_history(order_id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|c| c.actor == Some(carrier.id)));
    }

    #[tokio::test]
    async fn test_skipping_stages_is_illegal() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let (_, order_id) = closed_deal(&engine, customer, carrier).await;

        let err = engine
            .set_order_status(order_id, carrier, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let err = engine
            .set_order_status(order_id, carrier, OrderStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_repeat_delivery_does_not_duplicate_payment() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let (_, order_id) = closed_deal(&engine, customer, carrier).await;

        for status in [OrderStatus::Pending, OrderStatus::EnRoute, OrderStatus::Delivered] {
            engine.set_order_status(order_id, carrier, status).await.unwrap();
        }
        // Same status again is a quiet no-op
        engine
            .set_order_status(order_id, carrier, OrderStatus::Delivered)
            .await
            .unwrap();

        assert_eq!(engine.payments_for_order(order_id).await.unwrap().len(), 1);
        assert_eq!(engine.order_history(order_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_driver_status_history_only_on_change() {
        let (engine, sink) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let (_, order_id) = closed_deal(&engine, customer, carrier).await;

        engine
            .set_driver_status(order_id, carrier, DriverStatus::EnRoute)
            .await
            .unwrap();
        engine
            .set_driver_status(order_id, carrier, DriverStatus::EnRoute)
            .await
            .unwrap();
        engine
            .set_driver_status(order_id, carrier, DriverStatus::Problem)
            .await
            .unwrap();

        let driver_rows: Vec<_> = engine
            .order_history(order_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.field == ChangeField::DriverStatus)
            .collect();
        assert_eq!(driver_rows.len(), 2);

        assert!(sink
            .sent_to(customer.id)
            .iter()
            .any(|n| n.kind == NotificationKind::DriverProblem));

        let err = engine
            .set_driver_status(order_id, customer, DriverStatus::Stopped)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_first_document_stamps_timestamps() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let (_, order_id) = closed_deal(&engine, customer, carrier).await;

        engine
            .attach_document(order_id, carrier, DocumentKind::Loading, "waybill")
            .await
            .unwrap();
        let order = engine.get_order(order_id).await.unwrap();
        let first_loading = order.loading_at.unwrap();
        assert!(order.unloading_at.is_none());

        engine
            .attach_document(order_id, carrier, DocumentKind::Loading, "waybill copy")
            .await
            .unwrap();
        let order = engine.get_order(order_id).await.unwrap();
        assert_eq!(order.loading_at, Some(first_loading));
        assert_eq!(engine.order_documents(order_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invite_flow_attaches_the_driver() {
        let (engine, sink) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let logistic = Actor::logistic(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;

        // Broker bids without a driver
        let offer = engine
            .create_offer(
                logistic,
                crate::offers::CreateOffer {
                    cargo_id: listing.id,
                    amount: 700,
                    currency: freightex_core::money::Currency::Usd,
                    method: freightex_core::payment::PaymentMethod::BankTransfer,
                    carrier_id: None,
                    recipient_id: None,
                },
            )
            .await
            .unwrap();
        engine.accept_offer(offer.id, customer).await.unwrap();
        engine.accept_offer(offer.id, logistic).await.unwrap();

        let order_id = engine.order_for_cargo(listing.id).await.unwrap();
        let order = engine.get_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::NoDriver);
        assert!(order.carrier_id.is_none());

        let token = engine.create_invite(order_id, logistic).await.unwrap();
        // Idempotent until redeemed
        assert_eq!(engine.create_invite(order_id, logistic).await.unwrap(), token);

        let driver = Actor::carrier(Uuid::new_v4());
        let order = engine.accept_invite(&token, driver).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.carrier_id, Some(driver.id));
        assert!(order.invite_token.is_none());

        // Single use
        let err = engine
            .accept_invite(&token, Actor::carrier(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        assert!(sink
            .sent_to(customer.id)
            .iter()
            .any(|n| n.kind == NotificationKind::CarrierInvited));
    }

    #[tokio::test]
    async fn test_invite_restricted_to_the_broker() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let (_, order_id) = closed_deal(&engine, customer, carrier).await;

        // Carrier deal: no broker, nothing to invite
        let err = engine.create_invite(order_id, customer).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
