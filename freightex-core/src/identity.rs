use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// Role supplied by the external identity provider. The core never issues or
/// validates credentials; it only trusts the (id, role) pair per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Carrier,
    Logistic,
}

/// An authenticated caller as seen by the service layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn customer(id: UserId) -> Self {
        Self::new(id, Role::Customer)
    }

    pub fn carrier(id: UserId) -> Self {
        Self::new(id, Role::Carrier)
    }

    pub fn logistic(id: UserId) -> Self {
        Self::new(id, Role::Logistic)
    }
}
