use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    /// Wraps an amount exactly as parsed, without rounding.
    pub fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Rounds to cents. Used for amounts produced by currency conversion.
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Money {
    /// `None` when the sum exceeds the range of `Decimal`.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_decimal_rounds_to_cents() {
        let m = Money::from_decimal(Decimal::new(1234567, 4));
        assert_eq!(m.amount(), Decimal::new(12346, 2));
    }

    #[test]
    fn new_keeps_precision() {
        let m = Money::new(Decimal::new(1234567, 4));
        assert_eq!(m.amount(), Decimal::new(1234567, 4));
    }

    #[test]
    fn display_two_places() {
        assert_eq!(Money::new(Decimal::new(5, 0)).to_string(), "5.00");
        assert_eq!(Money::new(Decimal::new(-123456, 2)).to_string(), "-1234.56");
    }

    #[test]
    fn checked_add_and_zero() {
        let total = Money::new(Decimal::new(150, 2)).checked_add(Money::new(Decimal::new(250, 2)));
        assert_eq!(total.map(Money::amount), Some(Decimal::new(4, 0)));
        assert!(Money::zero().is_zero());
    }

    #[test]
    fn checked_add_overflow_is_none() {
        assert_eq!(Money::new(Decimal::MAX).checked_add(Money::new(Decimal::ONE)), None);
    }
}
