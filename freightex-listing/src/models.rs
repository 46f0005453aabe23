use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use freightex_core::geo::Coordinates;
use freightex_core::identity::UserId;

/// Listing status. Part of the persisted contract polled by mobile clients;
/// renaming or reordering these values is a breaking change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CargoStatus {
    Posted,
    Matched,
    Delivered,
    Completed,
    Cancelled,
}

/// Vehicle body type requested for the shipment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportType {
    Tent,
    Container,
    Reefer,
    Dump,
    CarTransporter,
    GrainTruck,
    Crane,
    LogTruck,
    Pickup,
    CementTruck,
    Tanker,
    MegaTrailer,
}

/// One end of the route, resolved to coordinates at posting time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub country: String,
    pub city: String,
    pub coords: Coordinates,
}

/// A shipment request posted by a customer, seeking carrier bids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CargoListing {
    pub id: Uuid,
    pub customer_id: UserId,
    pub origin: Place,
    pub destination: Place,
    pub transport_type: TransportType,
    pub weight_kg: f64,
    pub status: CargoStatus,
    pub assigned_carrier: Option<UserId>,
    pub chosen_offer: Option<Uuid>,
    /// Great-circle route distance, cached at posting time.
    pub route_km_cached: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CargoListing {
    pub fn new(
        customer_id: UserId,
        origin: Place,
        destination: Place,
        transport_type: TransportType,
        weight_kg: f64,
        route_km_cached: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            origin,
            destination,
            transport_type,
            weight_kg,
            status: CargoStatus::Posted,
            assigned_carrier: None,
            chosen_offer: None,
            route_km_cached,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open_for_offers(&self) -> bool {
        self.status == CargoStatus::Posted
    }

    /// Records the winning offer. Only legal on the Posted -> Matched edge;
    /// `chosen_offer` is never set by any other transition.
    pub fn mark_matched(&mut self, carrier: Option<UserId>, offer_id: Uuid) {
        self.status = CargoStatus::Matched;
        self.assigned_carrier = carrier;
        self.chosen_offer = Some(offer_id);
        self.updated_at = Utc::now();
    }

    pub fn mark_cancelled(&mut self) {
        self.status = CargoStatus::Cancelled;
        self.updated_at = Utc::now();
    }

    /// Mirrors the order reaching DELIVERED.
    pub fn mark_delivered(&mut self) {
        self.status = CargoStatus::Delivered;
        self.updated_at = Utc::now();
    }

    /// Mirrors the order reaching PAID.
    pub fn mark_completed(&mut self) {
        self.status = CargoStatus::Completed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(city: &str, lat: f64, lon: f64) -> Place {
        Place {
            country: "UZ".to_string(),
            city: city.to_string(),
            coords: Coordinates { lat, lon },
        }
    }

    #[test]
    fn test_new_listing_is_posted() {
        let listing = CargoListing::new(
            Uuid::new_v4(),
            place("tashkent", 41.2995, 69.2401),
            place("samarkand", 39.6542, 66.9597),
            TransportType::Tent,
            12_000.0,
            270.0,
        );

        assert_eq!(listing.status, CargoStatus::Posted);
        assert!(listing.is_open_for_offers());
        assert!(listing.chosen_offer.is_none());
        assert!(listing.assigned_carrier.is_none());
    }

    #[test]
    fn test_mark_matched_sets_chosen_offer() {
        let mut listing = CargoListing::new(
            Uuid::new_v4(),
            place("tashkent", 41.2995, 69.2401),
            place("samarkand", 39.6542, 66.9597),
            TransportType::Reefer,
            8_000.0,
            270.0,
        );
        let carrier = Uuid::new_v4();
        let offer = Uuid::new_v4();

        listing.mark_matched(Some(carrier), offer);

        assert_eq!(listing.status, CargoStatus::Matched);
        assert_eq!(listing.assigned_carrier, Some(carrier));
        assert_eq!(listing.chosen_offer, Some(offer));
        assert!(!listing.is_open_for_offers());
    }
}
