use serde::Deserialize;
use uuid::Uuid;

use freightex_core::error::Error;
use freightex_core::geo::haversine_km;
use freightex_core::identity::{Actor, Role};
use freightex_core::notify::{Notification, NotificationKind};
use freightex_listing::{CargoListing, Place, TransportType};
use freightex_offer::{AgreementStatus, OfferEvent, OfferEventKind};
use freightex_store::StoreState;

use crate::DealEngine;

#[derive(Debug, Clone, Deserialize)]
pub struct PostListing {
    pub origin_country: String,
    pub origin_city: String,
    pub destination_country: String,
    pub destination_city: String,
    pub transport_type: TransportType,
    pub weight_kg: f64,
}

impl DealEngine {
    /// Publishes a new cargo listing. Both route ends are geocoded up front
    /// so the route distance can be cached on the listing; a geocoder outage
    /// surfaces as a validation error on the city field, matching what the
    /// posting form can display.
    pub async fn post_listing(&self, actor: Actor, req: PostListing) -> Result<CargoListing, Error> {
        if actor.role != Role::Customer {
            return Err(Error::Forbidden("only customers can post cargo".into()));
        }
        if !self.config.geo.supports_country(&req.origin_country) {
            return Err(Error::validation(
                "origin.country",
                format!("unsupported country {}", req.origin_country),
            ));
        }
        if !self.config.geo.supports_country(&req.destination_country) {
            return Err(Error::validation(
                "destination.country",
                format!("unsupported country {}", req.destination_country),
            ));
        }
        if req.weight_kg <= 0.0 {
            return Err(Error::validation("weight_kg", "weight must be positive"));
        }

        let origin = self
            .resolve_place(&req.origin_country, &req.origin_city, "origin.city")
            .await?;
        let destination = self
            .resolve_place(
                &req.destination_country,
                &req.destination_city,
                "destination.city",
            )
            .await?;
        let route_km = haversine_km(origin.coords, destination.coords);

        let listing = CargoListing::new(
            actor.id,
            origin,
            destination,
            req.transport_type,
            req.weight_kg,
            route_km,
        );
        tracing::info!(listing_id = %listing.id, customer_id = %actor.id, route_km, "cargo posted");

        let mut state = self.store.lock().await;
        state.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    /// Withdraws a Posted listing. Every live offer against it is deactivated
    /// and its handshake, if one was underway, is cancelled.
    pub async fn cancel_listing(&self, listing_id: Uuid, actor: Actor) -> Result<CargoListing, Error> {
        let mut outbox = Vec::new();
        let result = {
            let mut state = self.store.lock().await;
            Self::cancel_listing_locked(&mut state, listing_id, actor, &mut outbox)
        };
        self.dispatch(outbox).await;
        result
    }

    fn cancel_listing_locked(
        state: &mut StoreState,
        listing_id: Uuid,
        actor: Actor,
        outbox: &mut Vec<Notification>,
    ) -> Result<CargoListing, Error> {
        let listing = state.listing(listing_id)?;
        if listing.customer_id != actor.id {
            return Err(Error::Forbidden("only the listing owner can cancel it".into()));
        }
        if !listing.is_open_for_offers() {
            return Err(Error::InvalidState(format!(
                "listing {listing_id} is no longer open"
            )));
        }

        for offer_id in state.live_offer_ids_for_cargo(listing_id) {
            let (bidder, price) = {
                let offer = state.offer_mut(offer_id)?;
                offer.deactivate();
                (offer.logistic_id.or(offer.carrier_id), offer.price)
            };
            state.record_offer_event(OfferEvent::new(
                offer_id,
                None,
                OfferEventKind::Deactivated,
                price,
            ));
            if let Some(agreement_id) = state.agreement_id_for_offer(offer_id) {
                let agreement = state.agreement_mut(agreement_id)?;
                if agreement.status == AgreementStatus::Pending {
                    agreement.set_status(AgreementStatus::Cancelled);
                }
            }
            if let Some(bidder) = bidder {
                outbox.push(
                    Notification::new(
                        bidder,
                        NotificationKind::OfferRejected,
                        "Listing cancelled",
                        "The cargo you bid on has been withdrawn by its owner".to_string(),
                    )
                    .for_cargo(listing_id)
                    .for_offer(offer_id),
                );
            }
        }

        let listing = state.listing_mut(listing_id)?;
        listing.mark_cancelled();
        Ok(listing.clone())
    }

    async fn resolve_place(&self, country: &str, city: &str, field: &str) -> Result<Place, Error> {
        if city.trim().is_empty() {
            return Err(Error::validation(field, "city is required"));
        }
        let key = (country.to_uppercase(), city.to_lowercase());
        if let Some(coords) = self.store.lock().await.geocode_cache.get(&key).copied() {
            return Ok(Place {
                country: key.0,
                city: city.to_string(),
                coords,
            });
        }

        match self.geocoder.resolve(country, city).await {
            Ok(coords) => {
                self.store.lock().await.geocode_cache.insert(key.clone(), coords);
                Ok(Place {
                    country: key.0,
                    city: city.to_string(),
                    coords,
                })
            }
            Err(Error::ExternalServiceUnavailable(reason)) => Err(Error::validation(
                field,
                format!("could not resolve city: {reason}"),
            )),
            Err(err) => Err(err),
        }
    }
}
