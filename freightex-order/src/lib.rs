pub mod models;
pub mod payment;

pub use models::{
    ChangeField, DocumentKind, DriverStatus, Order, OrderChange, OrderDocument, OrderStatus,
};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
