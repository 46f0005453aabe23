pub mod error;
pub mod geo;
pub mod identity;
pub mod money;
pub mod notify;
pub mod payment;

pub use error::Error;
pub use geo::{Coordinates, Geocoder};
pub use identity::{Actor, Role, UserId};
pub use money::{Currency, Money, RateTable};
pub use notify::{Notification, NotificationKind, NotificationSink};
pub use payment::PaymentMethod;
