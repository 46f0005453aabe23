use serde::{Deserialize, Serialize};

/// Settlement method vocabulary, fixed by the external payment ledger and
/// supplied at offer/order creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
}
