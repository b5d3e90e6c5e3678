/// decimal.rs — Fixed-Point Decimal Primitive
///
/// Every monetary quantity in the engine (price, size, PnL, balance) is a
/// `Decimal`. Ratios (Sharpe, win rate, percentages) stay on `f64` — see
/// `performance.rs`. Wrapping `rust_decimal::Decimal` behind this newtype
/// keeps the arithmetic rules (fallible division, total order) local to one
/// file instead of scattered across call sites.
use rust_decimal::Decimal as RustDecimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Fixed-point signed decimal, total-ordered, exact on the represented
/// rational. Division is fallible (divide-by-zero); float conversion is
/// lossy and only meant for ratio computations downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Decimal(RustDecimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(RustDecimal::ZERO);
    pub const ONE: Decimal = Decimal(RustDecimal::ONE);

    pub fn from_int(v: i64) -> Self {
        Decimal(RustDecimal::from(v))
    }

    /// Lossy: `f64` cannot represent every decimal fraction exactly.
    pub fn from_float(v: f64) -> Self {
        Decimal(RustDecimal::from_f64_retain(v).unwrap_or(RustDecimal::ZERO))
    }

    pub fn from_string(s: &str) -> Result<Self, EngineError> {
        RustDecimal::from_str(s)
            .map(Decimal)
            .map_err(|e| EngineError::Internal(format!("invalid decimal literal {s:?}: {e}")))
    }

    /// Lossy: document at call sites that precision beyond `f64`'s mantissa
    /// is discarded.
    pub fn to_float(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Decimal(self.0.abs())
    }

    pub fn checked_div(self, rhs: Decimal) -> Result<Decimal, EngineError> {
        if rhs.is_zero() {
            return Err(EngineError::Internal("division by zero".into()));
        }
        Ok(Decimal(self.0 / rhs.0))
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if self <= other { self } else { other }
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if self >= other { self } else { other }
    }

    pub fn inner(self) -> RustDecimal {
        self.0
    }
}

impl From<RustDecimal> for Decimal {
    fn from(v: RustDecimal) -> Self {
        Decimal(v)
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;
    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;
    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;
    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;
    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Decimal {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_string(s)
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sixteen_significant_digits() {
        let s = "1234.567890123456";
        let d = Decimal::from_string(s).unwrap();
        assert_eq!(d.to_string(), s);
    }

    #[test]
    fn division_by_zero_is_fallible() {
        let a = Decimal::from_int(10);
        assert!(a.checked_div(Decimal::ZERO).is_err());
        assert!(a.checked_div(Decimal::from_int(2)).is_ok());
    }

    #[test]
    fn total_order() {
        let a = Decimal::from_string("1.5").unwrap();
        let b = Decimal::from_string("1.50000001").unwrap();
        assert!(a < b);
        assert!(Decimal::ZERO.is_zero());
        assert!(!Decimal::ONE.is_zero());
        assert!(Decimal::ONE.is_positive());
        assert!((-Decimal::ONE).is_negative());
    }

    #[test]
    fn float_conversion_is_lossy_but_documented() {
        let d = Decimal::from_float(0.1);
        assert!((d.to_float() - 0.1).abs() < 1e-9);
    }
}
