pub mod models;

pub use models::{CargoListing, CargoStatus, Place, TransportType};
