use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Currency vocabulary. Part of the persisted contract other services poll;
/// renaming or reordering these values is a breaking change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Uzs,
    Kzt,
    Rub,
    Usd,
    Eur,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Uzs => "UZS",
            Currency::Kzt => "KZT",
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }
}

/// A monetary amount in whole units of its currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money {
    pub amount: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Result<Self, Error> {
        if amount < 0 {
            return Err(Error::validation("amount", "amount must be non-negative"));
        }
        Ok(Self { amount, currency })
    }
}

/// Injected conversion-rate table: units of USD per one unit of each
/// currency. Conversions are computed at call time from the current table;
/// persisted snapshots keep their original currency and amount, so history
/// is unaffected by later rate changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    pub usd_per_unit: HashMap<Currency, f64>,
}

impl RateTable {
    pub fn convert(&self, money: Money, to: Currency) -> Result<Money, Error> {
        if money.currency == to {
            return Ok(money);
        }
        let from_rate = self
            .usd_per_unit
            .get(&money.currency)
            .ok_or_else(|| Error::validation("currency", format!("no rate for {}", money.currency.code())))?;
        let to_rate = self
            .usd_per_unit
            .get(&to)
            .ok_or_else(|| Error::validation("currency", format!("no rate for {}", to.code())))?;

        let converted = (money.amount as f64 * from_rate / to_rate).round() as i64;
        Money::new(converted.max(0), to)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        let mut usd_per_unit = HashMap::new();
        usd_per_unit.insert(Currency::Usd, 1.0);
        usd_per_unit.insert(Currency::Eur, 1.08);
        usd_per_unit.insert(Currency::Rub, 0.011);
        usd_per_unit.insert(Currency::Kzt, 0.0021);
        usd_per_unit.insert(Currency::Uzs, 0.000079);
        Self { usd_per_unit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_amount_rejected() {
        assert!(Money::new(-1, Currency::Usd).is_err());
        assert!(Money::new(0, Currency::Usd).is_ok());
    }

    #[test]
    fn test_deterministic_conversion() {
        let rates = RateTable::default();
        let eur = Money::new(100, Currency::Eur).unwrap();

        let usd = rates.convert(eur, Currency::Usd).unwrap();
        assert_eq!(usd.amount, 108);
        assert_eq!(usd.currency, Currency::Usd);

        // Same-currency conversion is identity
        let same = rates.convert(eur, Currency::Eur).unwrap();
        assert_eq!(same, eur);
    }

    #[test]
    fn test_missing_rate_is_validation_error() {
        let rates = RateTable {
            usd_per_unit: HashMap::from([(Currency::Usd, 1.0)]),
        };
        let rub = Money::new(500, Currency::Rub).unwrap();
        assert!(rates.convert(rub, Currency::Usd).is_err());
    }
}
