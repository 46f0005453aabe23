use chrono::{DateTime, Utc};
use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::identity::{Actor, UserId};
use freightex_core::notify::{Notification, NotificationKind};
use freightex_offer::{Agreement, AgreementStatus, OfferEvent, OfferEventKind, OfferStatus};
use freightex_order::Order;
use freightex_store::StoreState;

use crate::DealEngine;

impl DealEngine {
    pub async fn agreement_for_offer(&self, offer_id: Uuid) -> Result<Agreement, Error> {
        let state = self.store.lock().await;
        let agreement_id = state
            .agreement_id_for_offer(offer_id)
            .ok_or_else(|| Error::NotFound(format!("agreement for offer {offer_id}")))?;
        Ok(state.agreement(agreement_id)?.clone())
    }

    /// Records one party's acceptance directly on the handshake and
    /// re-attempts finalization.
    pub async fn accept_agreement(&self, agreement_id: Uuid, actor: Actor) -> Result<Agreement, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::accept_agreement_locked(&mut state, agreement_id, actor, Utc::now(), &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn accept_agreement_locked(
        state: &mut StoreState,
        agreement_id: Uuid,
        actor: Actor,
        now: DateTime<Utc>,
        outbox: &mut Vec<Notification>,
    ) -> Result<Agreement, Error> {
        // A stale handshake expires here instead of accepting
        Self::try_finalize_locked(state, agreement_id, now, outbox)?;
        Self::record_acceptance_locked(state, agreement_id, actor.id)?;
        Self::try_finalize_locked(state, agreement_id, now, outbox)?;
        Ok(state.agreement(agreement_id)?.clone())
    }

    /// Backs out of a pending handshake. The offer is taken off the table
    /// with it; a party that changed its mind renegotiates from a fresh
    /// offer.
    pub async fn cancel_agreement(&self, agreement_id: Uuid, actor: Actor) -> Result<Agreement, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::cancel_agreement_locked(&mut state, agreement_id, actor, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    /// Re-attempts finalization. Safe to call at any time from any caller;
    /// used by periodic sweeps to push lapsed handshakes to EXPIRED.
    pub async fn finalize_agreement(&self, agreement_id: Uuid) -> Result<Agreement, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            match Self::try_finalize_locked(&mut state, agreement_id, Utc::now(), &mut outbox) {
                Ok(()) => state.agreement(agreement_id).map(Clone::clone),
                Err(err) => Err(err),
            }
        };
        self.dispatch(outbox).await;
        result
    }

    /// Returns the id of the live handshake for this offer, opening a new
    /// one when none exists or the previous one has already resolved.
    pub(crate) fn ensure_agreement_locked(&self, state: &mut StoreState, offer_id: Uuid) -> Uuid {
        if let Some(id) = state.agreement_id_for_offer(offer_id) {
            if let Ok(existing) = state.agreement(id) {
                if !existing.status.is_terminal() {
                    return id;
                }
            }
        }
        let agreement = Agreement::new(offer_id, self.config.business_rules.agreement_ttl());
        let id = agreement.id;
        state.insert_agreement(agreement);
        id
    }

    /// Flips the acceptance flag matching the caller's position on the deal.
    pub(crate) fn record_acceptance_locked(
        state: &mut StoreState,
        agreement_id: Uuid,
        actor_id: UserId,
    ) -> Result<(), Error> {
        let offer_id = state.agreement(agreement_id)?.offer_id;
        let offer = state.offer(offer_id)?.clone();
        let customer_id = state.listing(offer.cargo_id)?.customer_id;

        let agreement = state.agreement_mut(agreement_id)?;
        if agreement.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "agreement {agreement_id} is no longer pending"
            )));
        }
        if actor_id == customer_id {
            agreement.accepted_by_customer = true;
        } else if offer.carrier_id == Some(actor_id) {
            agreement.accepted_by_carrier = true;
        } else if offer.logistic_id == Some(actor_id) {
            agreement.accepted_by_logistic = true;
        } else {
            return Err(Error::Forbidden("not a party to this handshake".into()));
        }
        agreement.updated_at = Utc::now();
        Ok(())
    }

    /// The commit point of the whole system. Runs entirely under the store
    /// guard:
    ///
    ///  * a lapsed handshake is pushed to EXPIRED and its offer deactivated;
    ///  * a handshake missing signatures is left untouched;
    ///  * a fully signed handshake creates the order, marks the cargo
    ///    matched and closes the offer as one unit.
    ///
    /// When another offer already matched the cargo, the late handshake is
    /// left pending to lapse on its own.
    pub(crate) fn try_finalize_locked(
        state: &mut StoreState,
        agreement_id: Uuid,
        now: DateTime<Utc>,
        outbox: &mut Vec<Notification>,
    ) -> Result<(), Error> {
        let agreement = state.agreement(agreement_id)?.clone();
        if agreement.status != AgreementStatus::Pending {
            return Ok(());
        }
        let offer = state.offer(agreement.offer_id)?.clone();

        if agreement.is_expired(now) {
            state.agreement_mut(agreement_id)?.set_status(AgreementStatus::Expired);
            state.offer_mut(offer.id)?.deactivate();
            state.record_offer_event(OfferEvent::new(
                offer.id,
                None,
                OfferEventKind::Deactivated,
                offer.price,
            ));
            let customer_id = state.listing(offer.cargo_id)?.customer_id;
            for party in [Some(customer_id), offer.carrier_id, offer.logistic_id]
                .into_iter()
                .flatten()
            {
                outbox.push(
                    Notification::new(
                        party,
                        NotificationKind::AgreementExpired,
                        "Handshake expired",
                        "The acceptance window closed before all parties signed".to_string(),
                    )
                    .for_cargo(offer.cargo_id)
                    .for_offer(offer.id),
                );
            }
            tracing::info!(%agreement_id, offer_id = %offer.id, "agreement expired");
            return Ok(());
        }

        if !agreement.is_fully_accepted(offer.carrier_id.is_some(), offer.logistic_id.is_some()) {
            return Ok(());
        }

        let listing = state.listing(offer.cargo_id)?.clone();
        if !listing.is_open_for_offers() || state.order_id_for_cargo(offer.cargo_id).is_some() {
            // Lost the race to another offer
            return Ok(());
        }

        let order = Order::new(
            offer.cargo_id,
            listing.customer_id,
            offer.carrier_id,
            offer.logistic_id,
            offer.id,
            offer.price,
            offer.method,
            listing.route_km_cached,
        );
        let order_id = state.insert_order(order)?;
        state
            .listing_mut(offer.cargo_id)?
            .mark_matched(offer.carrier_id, offer.id);
        {
            let offer = state.offer_mut(offer.id)?;
            offer.deactivate();
            offer.set_status(OfferStatus::Accepted);
        }
        state.agreement_mut(agreement_id)?.set_status(AgreementStatus::Accepted);
        tracing::info!(%agreement_id, %order_id, cargo_id = %offer.cargo_id, "deal closed");

        for party in [Some(listing.customer_id), offer.carrier_id, offer.logistic_id]
            .into_iter()
            .flatten()
        {
            outbox.push(
                Notification::new(
                    party,
                    NotificationKind::OrderCreated,
                    "Deal closed",
                    format!(
                        "All parties accepted {} {}, the order is open",
                        offer.price.amount,
                        offer.price.currency.code()
                    ),
                )
                .for_cargo(offer.cargo_id)
                .for_order(order_id),
            );
        }
        Ok(())
    }

    fn cancel_agreement_locked(
        state: &mut StoreState,
        agreement_id: Uuid,
        actor: Actor,
        outbox: &mut Vec<Notification>,
    ) -> Result<Agreement, Error> {
        let agreement = state.agreement(agreement_id)?.clone();
        let offer = state.offer(agreement.offer_id)?.clone();
        let customer_id = state.listing(offer.cargo_id)?.customer_id;
        if !offer.is_participant(actor.id, customer_id) {
            return Err(Error::Forbidden("not a party to this handshake".into()));
        }
        if agreement.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "agreement {agreement_id} is no longer pending"
            )));
        }

        state.agreement_mut(agreement_id)?.set_status(AgreementStatus::Cancelled);
        state.offer_mut(offer.id)?.deactivate();
        state.record_offer_event(OfferEvent::new(
            offer.id,
            Some(actor.id),
            OfferEventKind::Deactivated,
            offer.price,
        ));
        for party in [Some(customer_id), offer.carrier_id, offer.logistic_id]
            .into_iter()
            .flatten()
            .filter(|p| *p != actor.id)
        {
            outbox.push(
                Notification::new(
                    party,
                    NotificationKind::AgreementCancelled,
                    "Handshake cancelled",
                    "One of the parties backed out before the deal closed".to_string(),
                )
                .for_cargo(offer.cargo_id)
                .for_offer(offer.id),
            );
        }
        Ok(state.agreement(agreement_id)?.clone())
    }
}
