//! Native currency amounts

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;
const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Amount in the smallest native currency unit
///
/// Serialized as a decimal string because JSON numbers cannot carry the full range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn from_gwei(gwei: u64) -> Self {
        Wei(u128::from(gwei) * WEI_PER_GWEI)
    }

    /// Cost of `gas` units at `price` per unit
    pub fn cost(gas: u64, price: Wei) -> Self {
        Wei(u128::from(gas).saturating_mul(price.0))
    }

    /// Format as a decimal ether amount with `decimals` fractional digits
    pub fn format_ether(&self, decimals: usize) -> String {
        let whole = self.0 / WEI_PER_ETHER;
        let frac = self.0 % WEI_PER_ETHER;
        let decimals = decimals.min(18);
        if decimals == 0 {
            return whole.to_string();
        }
        let frac_str = format!("{:018}", frac);
        format!("{}.{}", whole, &frac_str[..decimals])
    }
}

impl Add for Wei {
    type Output = Wei;

    fn add(self, rhs: Wei) -> Wei {
        Wei(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Wei {
    fn add_assign(&mut self, rhs: Wei) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s
                .trim()
                .parse::<u128>()
                .map(Wei)
                .map_err(serde::de::Error::custom),
            Repr::Number(n) => Ok(Wei(u128::from(n))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ether() {
        let amount = Wei(1_234_500_000_000_000_000);
        assert_eq!(amount.format_ether(4), "1.2345");
        assert_eq!(amount.format_ether(0), "1");
        assert_eq!(Wei::ZERO.format_ether(2), "0.00");
    }

    #[test]
    fn test_cost_at_reference_price() {
        let cost = Wei::cost(21_000, Wei::from_gwei(50));
        assert_eq!(cost, Wei(1_050_000_000_000_000));
    }

    #[test]
    fn test_deserialize_string_or_number() {
        let a: Wei = serde_json::from_str("\"340282366920938463463374607431768211455\"").unwrap();
        assert_eq!(a, Wei(u128::MAX));
        let b: Wei = serde_json::from_str("42").unwrap();
        assert_eq!(b, Wei(42));
    }
}
