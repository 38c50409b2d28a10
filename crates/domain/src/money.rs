//! Money value object.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, saturating at the representable bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiplies by a quantity. `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds `other`. `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Returns `percent`% of this amount, rounded down to the cent.
    pub fn percent(&self, percent: i64) -> Money {
        let cents = i128::from(self.cents) * i128::from(percent) / 100;
        Money {
            cents: i64::try_from(cents).unwrap_or(if cents < 0 { i64::MIN } else { i64::MAX }),
        }
    }

    /// Subtracts `other`, flooring the result at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money {
            cents: self.cents.saturating_sub(other.cents).max(0),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents - rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

/// Saturates at the representable bounds; use [`Money::checked_add`] where
/// overflow must be reported.
impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| Money {
            cents: acc.cents.saturating_add(m.cents),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_percent_rounds_down() {
        assert_eq!(Money::from_cents(20000).percent(10).cents(), 2000);
        assert_eq!(Money::from_cents(999).percent(15).cents(), 149);
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let a = Money::from_cents(500);
        assert_eq!(a.saturating_sub(Money::from_cents(200)).cents(), 300);
        assert_eq!(a.saturating_sub(Money::from_cents(800)), Money::zero());
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, 50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 400);
    }

    #[test]
    fn test_overflow_is_reported_or_saturated() {
        let huge = Money::from_cents(i64::MAX / 2);
        assert_eq!(huge.checked_mul(3), None);
        assert_eq!(huge.multiply(3).cents(), i64::MAX);
        assert_eq!(huge.checked_add(huge).map(|m| m.cents()), Some(i64::MAX - 1));
        assert_eq!(huge.checked_add(Money::from_cents(i64::MAX)), None);
        assert_eq!(huge.percent(100), huge);

        let total: Money = [huge, huge, huge].into_iter().sum();
        assert_eq!(total.cents(), i64::MAX);
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from_cents(1999)).unwrap();
        assert_eq!(json, "1999");
    }
}
