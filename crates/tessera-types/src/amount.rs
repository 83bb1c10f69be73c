use serde::{Deserialize, Serialize};
use std::fmt;

/// A quantity of the settlement token, in indivisible base units.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub fn to_base_units(&self) -> u128 {
        self.0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Price arithmetic: amount × an integer count (bytes, epochs).
    pub fn mul_int(&self, count: u64) -> Self {
        Self(self.0.saturating_mul(count as u128))
    }

    pub fn div_floor(&self, divisor: u64) -> Self {
        Self(self.0 / divisor.max(1) as u128)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.0)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let price = TokenAmount::from_base_units(3);
        assert_eq!(price.mul_int(1000).to_base_units(), 3000);
        assert_eq!(price.div_floor(2).to_base_units(), 1);
        assert_eq!(
            price.checked_sub(TokenAmount::from_base_units(5)),
            None
        );
        assert_eq!(
            price.saturating_sub(TokenAmount::from_base_units(5)),
            TokenAmount::ZERO
        );
    }

    #[test]
    fn test_ordering() {
        assert!(TokenAmount::from_base_units(2) > TokenAmount::from_base_units(1));
        assert!(TokenAmount::ZERO.is_zero());
    }
}
