use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::identity::{Actor, Role, UserId};
use freightex_core::money::{Currency, Money};
use freightex_core::notify::{Notification, NotificationKind};
use freightex_core::payment::PaymentMethod;
use freightex_offer::{AgreementStatus, Offer, OfferEvent, OfferEventKind, OfferStatus};
use freightex_store::StoreState;

use crate::DealEngine;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOffer {
    pub cargo_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
    pub method: PaymentMethod,
    /// Set by logistics that already have a driver lined up for the job.
    pub carrier_id: Option<UserId>,
    /// Targeted recipient for directed offers; None for open bids.
    pub recipient_id: Option<UserId>,
}

impl DealEngine {
    /// Places a bid against an open listing. Carriers bid for themselves;
    /// logistics bid as brokers, with or without a driver attached.
    pub async fn create_offer(&self, actor: Actor, req: CreateOffer) -> Result<Offer, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            self.create_offer_locked(&mut state, actor, req, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn create_offer_locked(
        &self,
        state: &mut StoreState,
        actor: Actor,
        req: CreateOffer,
        outbox: &mut Vec<Notification>,
    ) -> Result<Offer, Error> {
        let price = Money::new(req.amount, req.currency)?;
        let listing = state.listing(req.cargo_id)?;
        if !listing.is_open_for_offers() {
            return Err(Error::InvalidState(format!(
                "cargo listing {} is not accepting offers",
                req.cargo_id
            )));
        }
        if listing.customer_id == actor.id {
            return Err(Error::Forbidden(
                "the listing owner cannot bid on their own cargo".into(),
            ));
        }
        let customer_id = listing.customer_id;

        let (carrier_id, logistic_id) = match actor.role {
            Role::Carrier => (Some(actor.id), None),
            Role::Logistic => (req.carrier_id, Some(actor.id)),
            Role::Customer => {
                return Err(Error::Forbidden(
                    "customers receive offers, they do not place them".into(),
                ))
            }
        };
        if state.has_live_offer(req.cargo_id, carrier_id, logistic_id) {
            return Err(Error::Conflict(format!(
                "a live offer for cargo {} already exists from this bidder",
                req.cargo_id
            )));
        }

        let offer = Offer::new(
            req.cargo_id,
            carrier_id,
            logistic_id,
            req.recipient_id,
            price,
            req.method,
            self.config.business_rules.offer_ttl(),
        );
        state.record_offer_event(OfferEvent::new(
            offer.id,
            Some(actor.id),
            OfferEventKind::Offered,
            price,
        ));
        state.offers.insert(offer.id, offer.clone());
        tracing::info!(offer_id = %offer.id, cargo_id = %req.cargo_id, amount = price.amount, "offer placed");

        outbox.push(
            Notification::new(
                customer_id,
                NotificationKind::OfferReceived,
                "New offer",
                format!("You received an offer of {} {}", price.amount, price.currency.code()),
            )
            .for_cargo(req.cargo_id)
            .for_offer(offer.id),
        );
        Ok(offer)
    }

    /// Proposes a new amount. A customer counter parks the offer in
    /// COUNTERED_BY_CUSTOMER; a bidder counter returns it to PENDING. Either
    /// way a half-done handshake on the old amount is cancelled.
    pub async fn counter_offer(
        &self,
        offer_id: Uuid,
        actor: Actor,
        amount: i64,
    ) -> Result<Offer, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::counter_offer_locked(&mut state, offer_id, actor, amount, Utc::now(), &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn counter_offer_locked(
        state: &mut StoreState,
        offer_id: Uuid,
        actor: Actor,
        amount: i64,
        now: DateTime<Utc>,
        outbox: &mut Vec<Notification>,
    ) -> Result<Offer, Error> {
        let offer = Self::live_offer_checked(state, offer_id, actor.id, now)?;
        if offer.status == OfferStatus::AcceptedByCustomer {
            return Err(Error::InvalidState(
                "the customer already accepted this amount, counter is off".into(),
            ));
        }
        let listing_customer = state.listing(offer.cargo_id)?.customer_id;
        let price = Money::new(amount, offer.price.currency)?;

        let (status, kind, counterpart) = if actor.id == listing_customer {
            (
                OfferStatus::CounteredByCustomer,
                OfferEventKind::CounterFromCustomer,
                offer.logistic_id.or(offer.carrier_id),
            )
        } else {
            (
                OfferStatus::Pending,
                OfferEventKind::CounterFromCarrier,
                Some(listing_customer),
            )
        };

        {
            let offer = state.offer_mut(offer_id)?;
            offer.reprice(price);
            offer.set_status(status);
        }
        state.record_offer_event(OfferEvent::new(offer_id, Some(actor.id), kind, price));
        Self::cancel_pending_handshake(state, offer_id)?;

        if let Some(counterpart) = counterpart {
            outbox.push(
                Notification::new(
                    counterpart,
                    NotificationKind::OfferCountered,
                    "Counter-offer",
                    format!("New proposed amount: {} {}", price.amount, price.currency.code()),
                )
                .for_cargo(offer.cargo_id)
                .for_offer(offer_id),
            );
        }
        Ok(state.offer(offer_id)?.clone())
    }

    /// Records the caller's acceptance and re-attempts finalization. The
    /// order, if all parties have now signed, is created inside the same
    /// guard scope.
    pub async fn accept_offer(&self, offer_id: Uuid, actor: Actor) -> Result<Offer, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            self.accept_offer_locked(&mut state, offer_id, actor, Utc::now(), &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn accept_offer_locked(
        &self,
        state: &mut StoreState,
        offer_id: Uuid,
        actor: Actor,
        now: DateTime<Utc>,
        outbox: &mut Vec<Notification>,
    ) -> Result<Offer, Error> {
        let offer = Self::live_offer_checked(state, offer_id, actor.id, now)?;
        let listing_customer = state.listing(offer.cargo_id)?.customer_id;

        let (kind, counterpart) = if actor.id == listing_customer {
            (
                OfferEventKind::AcceptedByCustomer,
                offer.logistic_id.or(offer.carrier_id),
            )
        } else if offer.carrier_id == Some(actor.id) {
            (OfferEventKind::AcceptedByCarrier, Some(listing_customer))
        } else {
            (OfferEventKind::AcceptedByLogistic, Some(listing_customer))
        };
        let agreement_id = self.ensure_agreement_locked(state, offer_id);
        // A stale handshake expires here instead of accepting. Nothing is
        // written to the offer or its timeline until the acceptance sticks,
        // so a refused acceptance leaves no trace in the audit log.
        Self::try_finalize_locked(state, agreement_id, now, outbox)?;
        Self::record_acceptance_locked(state, agreement_id, actor.id)?;

        if kind == OfferEventKind::AcceptedByCustomer {
            state.offer_mut(offer_id)?.set_status(OfferStatus::AcceptedByCustomer);
        }
        state.record_offer_event(OfferEvent::new(offer_id, Some(actor.id), kind, offer.price));

        if let Some(counterpart) = counterpart {
            outbox.push(
                Notification::new(
                    counterpart,
                    NotificationKind::OfferAccepted,
                    "Offer accepted",
                    format!("{} {} was accepted, awaiting the remaining parties", offer.price.amount, offer.price.currency.code()),
                )
                .for_cargo(offer.cargo_id)
                .for_offer(offer_id),
            );
        }
        Self::try_finalize_locked(state, agreement_id, now, outbox)?;
        Ok(state.offer(offer_id)?.clone())
    }

    /// Customer-side rejection. Terminal for the offer.
    pub async fn reject_offer(&self, offer_id: Uuid, actor: Actor) -> Result<Offer, Error> {
        self.close_offer(offer_id, actor, OfferStatus::Rejected).await
    }

    /// Bidder-side retraction. Terminal for the offer.
    pub async fn withdraw_offer(&self, offer_id: Uuid, actor: Actor) -> Result<Offer, Error> {
        self.close_offer(offer_id, actor, OfferStatus::Withdrawn).await
    }

    async fn close_offer(
        &self,
        offer_id: Uuid,
        actor: Actor,
        terminal: OfferStatus,
    ) -> Result<Offer, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::close_offer_locked(&mut state, offer_id, actor, terminal, Utc::now(), &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn close_offer_locked(
        state: &mut StoreState,
        offer_id: Uuid,
        actor: Actor,
        terminal: OfferStatus,
        now: DateTime<Utc>,
        outbox: &mut Vec<Notification>,
    ) -> Result<Offer, Error> {
        let offer = Self::live_offer_checked(state, offer_id, actor.id, now)?;
        let listing_customer = state.listing(offer.cargo_id)?.customer_id;

        let (event_kind, notify_kind, recipient) = match terminal {
            OfferStatus::Rejected => {
                if actor.id != listing_customer {
                    return Err(Error::Forbidden("only the customer can reject an offer".into()));
                }
                (
                    OfferEventKind::Rejected,
                    NotificationKind::OfferRejected,
                    offer.logistic_id.or(offer.carrier_id),
                )
            }
            OfferStatus::Withdrawn => {
                if offer.carrier_id != Some(actor.id) && offer.logistic_id != Some(actor.id) {
                    return Err(Error::Forbidden("only the bidder can withdraw an offer".into()));
                }
                (
                    OfferEventKind::Withdrawn,
                    NotificationKind::OfferWithdrawn,
                    Some(listing_customer),
                )
            }
            other => {
                return Err(Error::InvalidState(format!(
                    "{other:?} is not a terminal offer status"
                )))
            }
        };

        {
            let offer = state.offer_mut(offer_id)?;
            offer.set_status(terminal);
            offer.deactivate();
        }
        state.record_offer_event(OfferEvent::new(offer_id, Some(actor.id), event_kind, offer.price));
        Self::cancel_pending_handshake(state, offer_id)?;

        if let Some(recipient) = recipient {
            outbox.push(
                Notification::new(
                    recipient,
                    notify_kind,
                    "Negotiation closed",
                    format!("The offer of {} {} is off the table", offer.price.amount, offer.price.currency.code()),
                )
                .for_cargo(offer.cargo_id)
                .for_offer(offer_id),
            );
        }
        Ok(state.offer(offer_id)?.clone())
    }

    /// Shared precondition for every negotiation move: the caller is a
    /// participant and the offer is live. A lapsed offer is deactivated on
    /// first touch and the move fails.
    fn live_offer_checked(
        state: &mut StoreState,
        offer_id: Uuid,
        actor_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Offer, Error> {
        let offer = state.offer(offer_id)?.clone();
        let listing_customer = state.listing(offer.cargo_id)?.customer_id;
        if !offer.is_participant(actor_id, listing_customer) {
            return Err(Error::Forbidden(
                "not a participant in this negotiation".into(),
            ));
        }
        if !offer.is_live() {
            return Err(Error::InvalidState(format!("offer {offer_id} is no longer live")));
        }
        if offer.is_expired(now) {
            state.offer_mut(offer_id)?.deactivate();
            state.record_offer_event(OfferEvent::new(
                offer_id,
                None,
                OfferEventKind::Deactivated,
                offer.price,
            ));
            return Err(Error::InvalidState(format!("offer {offer_id} has expired")));
        }
        Ok(offer)
    }

    fn cancel_pending_handshake(state: &mut StoreState, offer_id: Uuid) -> Result<(), Error> {
        if let Some(agreement_id) = state.agreement_id_for_offer(offer_id) {
            let agreement = state.agreement_mut(agreement_id)?;
            if agreement.status == AgreementStatus::Pending {
                agreement.set_status(AgreementStatus::Cancelled);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{carrier_offer, engine, posted_listing};
    use freightex_offer::AgreementStatus;

    #[tokio::test]
    async fn test_customer_cannot_bid() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;

        let err = engine
            .create_offer(
                Actor::customer(Uuid::new_v4()),
                CreateOffer {
                    cargo_id: listing.id,
                    amount: 500,
                    currency: Currency::Usd,
                    method: PaymentMethod::Cash,
                    carrier_id: None,
                    recipient_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_second_live_offer_from_same_bidder_conflicts() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;

        carrier_offer(&engine, carrier, listing.id, 500).await;
        let second = engine
            .create_offer(
                carrier,
                CreateOffer {
                    cargo_id: listing.id,
                    amount: 450,
                    currency: Currency::Usd,
                    method: PaymentMethod::Cash,
                    carrier_id: None,
                    recipient_id: None,
                },
            )
            .await;
        assert!(matches!(second, Err(Error::Conflict(_))));

        // Another carrier is free to bid
        carrier_offer(&engine, Actor::carrier(Uuid::new_v4()), listing.id, 480).await;
    }

    #[tokio::test]
    async fn test_counter_ping_pong_statuses() {
        let (engine, sink) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;
        let offer = carrier_offer(&engine, carrier, listing.id, 500).await;

        let countered = engine.counter_offer(offer.id, customer, 400).await.unwrap();
        assert_eq!(countered.status, OfferStatus::CounteredByCustomer);
        assert_eq!(countered.price.amount, 400);

        let re_countered = engine.counter_offer(offer.id, carrier, 450).await.unwrap();
        assert_eq!(re_countered.status, OfferStatus::Pending);
        assert_eq!(re_countered.price.amount, 450);

        let timeline = engine.offer_timeline(offer.id).await.unwrap();
        let kinds: Vec<_> = timeline.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OfferEventKind::Offered,
                OfferEventKind::CounterFromCustomer,
                OfferEventKind::CounterFromCarrier,
            ]
        );
        // Amount snapshots preserve the negotiation history
        let amounts: Vec<_> = timeline.iter().map(|e| e.amount.amount).collect();
        assert_eq!(amounts, vec![500, 400, 450]);

        assert!(sink
            .sent_to(carrier.id)
            .iter()
            .any(|n| n.kind == NotificationKind::OfferCountered));
    }

    #[tokio::test]
    async fn test_outsider_cannot_counter() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;
        let offer = carrier_offer(&engine, carrier, listing.id, 500).await;

        let err = engine
            .counter_offer(offer.id, Actor::carrier(Uuid::new_v4()), 300)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_withdraw_cancels_pending_handshake() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;
        let offer = carrier_offer(&engine, carrier, listing.id, 500).await;

        // Customer signs first; handshake is now pending on the carrier
        engine.accept_offer(offer.id, customer).await.unwrap();
        let agreement = engine.agreement_for_offer(offer.id).await.unwrap();
        assert_eq!(agreement.status, AgreementStatus::Pending);

        let withdrawn = engine.withdraw_offer(offer.id, carrier).await.unwrap();
        assert_eq!(withdrawn.status, OfferStatus::Withdrawn);
        assert!(!withdrawn.is_active);

        let agreement = engine.get_agreement(agreement.id).await.unwrap();
        assert_eq!(agreement.status, AgreementStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_only_customer_rejects_only_bidder_withdraws() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;
        let offer = carrier_offer(&engine, carrier, listing.id, 500).await;

        let err = engine.reject_offer(offer.id, carrier).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = engine.withdraw_offer(offer.id, customer).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_refused_acceptance_leaves_no_timeline_trace() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;
        let offer = carrier_offer(&engine, carrier, listing.id, 500).await;

        engine.accept_offer(offer.id, customer).await.unwrap();
        let agreement = engine.agreement_for_offer(offer.id).await.unwrap();

        // The acceptance window lapses before the carrier signs
        {
            let mut state = engine.store.lock().await;
            state.agreement_mut(agreement.id).unwrap().expires_at =
                chrono::Utc::now() - chrono::Duration::minutes(1);
        }

        let err = engine.accept_offer(offer.id, carrier).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        // The refused signature never reached the append-only log
        let kinds: Vec<_> = engine
            .offer_timeline(offer.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                OfferEventKind::Offered,
                OfferEventKind::AcceptedByCustomer,
                OfferEventKind::Deactivated,
            ]
        );
    }

    #[tokio::test]
    async fn test_moves_on_closed_offer_fail() {
        let (engine, _) = engine();
        let customer = Actor::customer(Uuid::new_v4());
        let carrier = Actor::carrier(Uuid::new_v4());
        let listing = posted_listing(&engine, customer).await;
        let offer = carrier_offer(&engine, carrier, listing.id, 500).await;

        engine.reject_offer(offer.id, customer).await.unwrap();

        let err = engine.counter_offer(offer.id, carrier, 450).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        let err = engine.accept_offer(offer.id, customer).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
