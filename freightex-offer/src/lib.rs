pub mod agreement;
pub mod events;
pub mod models;

pub use agreement::{Agreement, AgreementStatus};
pub use events::{OfferEvent, OfferEventKind};
pub use models::{Offer, OfferStatus};
