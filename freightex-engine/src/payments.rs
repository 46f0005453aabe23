use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::identity::Actor;
use freightex_core::notify::{Notification, NotificationKind};
use freightex_order::{ChangeField, OrderChange, OrderStatus, Payment};
use freightex_store::StoreState;

use crate::DealEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmingParty {
    Customer,
    Carrier,
    Logistic,
}

impl DealEngine {
    pub async fn confirm_payment_by_customer(
        &self,
        payment_id: Uuid,
        actor: Actor,
    ) -> Result<Payment, Error> {
        self.confirm_payment(payment_id, actor, ConfirmingParty::Customer).await
    }

    pub async fn confirm_payment_by_carrier(
        &self,
        payment_id: Uuid,
        actor: Actor,
    ) -> Result<Payment, Error> {
        self.confirm_payment(payment_id, actor, ConfirmingParty::Carrier).await
    }

    pub async fn confirm_payment_by_logistic(
        &self,
        payment_id: Uuid,
        actor: Actor,
    ) -> Result<Payment, Error> {
        self.confirm_payment(payment_id, actor, ConfirmingParty::Logistic).await
    }

    async fn confirm_payment(
        &self,
        payment_id: Uuid,
        actor: Actor,
        party: ConfirmingParty,
    ) -> Result<Payment, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::confirm_payment_locked(&mut state, payment_id, actor, party, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    /// Flips one confirmation flag and reduces the flags to a status. When
    /// the last flag lands and the order sits at DELIVERED, the order is
    /// closed out as PAID with a system audit row and the cargo completed.
    fn confirm_payment_locked(
        state: &mut StoreState,
        payment_id: Uuid,
        actor: Actor,
        party: ConfirmingParty,
        outbox: &mut Vec<Notification>,
    ) -> Result<Payment, Error> {
        let payment = state.payment(payment_id)?.clone();
        let order = state.order(payment.order_id)?.clone();

        let allowed = match party {
            ConfirmingParty::Customer => order.customer_id == actor.id,
            ConfirmingParty::Carrier => order.carrier_id == Some(actor.id),
            ConfirmingParty::Logistic => order.logistic_id == Some(actor.id),
        };
        if !allowed {
            return Err(Error::Forbidden(
                "confirmation must come from the matching party".into(),
            ));
        }
        if payment.is_completed() {
            return Err(Error::InvalidState(format!(
                "payment {payment_id} is already completed"
            )));
        }

        let needs_logistic = order.logistic_id.is_some();
        let completed = {
            let payment = state.payment_mut(payment_id)?;
            match party {
                ConfirmingParty::Customer => payment.confirmed_by_customer = true,
                ConfirmingParty::Carrier => payment.confirmed_by_carrier = true,
                ConfirmingParty::Logistic => payment.confirmed_by_logistic = true,
            }
            payment.recompute_status(needs_logistic);
            payment.is_completed()
        };

        if completed {
            tracing::info!(%payment_id, order_id = %order.id, "payment completed");
            Self::settle_order_locked(state, order.id, outbox)?;
        }
        Ok(state.payment(payment_id)?.clone())
    }

    /// Moves a DELIVERED order to PAID once every payment on it has
    /// completed. The audit row carries no actor; nobody set PAID by hand.
    fn settle_order_locked(
        state: &mut StoreState,
        order_id: Uuid,
        outbox: &mut Vec<Notification>,
    ) -> Result<(), Error> {
        let order = state.order(order_id)?.clone();
        if order.status != OrderStatus::Delivered {
            return Ok(());
        }
        if !state.payments_for_order(order_id).iter().all(Payment::is_completed) {
            return Ok(());
        }

        state.order_mut(order_id)?.set_status(OrderStatus::Paid);
        state.record_order_change(OrderChange::new(
            order_id,
            ChangeField::Status,
            OrderStatus::Delivered.as_str(),
            OrderStatus::Paid.as_str(),
            None,
        ));
        state.listing_mut(order.cargo_id)?.mark_completed();
        tracing::info!(%order_id, "order settled");

        for party in order.parties() {
            outbox.push(
                Notification::new(
                    party,
                    NotificationKind::RatingRequired,
                    "Order complete",
                    "The order is fully paid, leave a rating for your counterpart".to_string(),
                )
                .for_order(order_id),
            );
        }
        Ok(())
    }
}
