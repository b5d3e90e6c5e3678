/// strategy/mod.rs — Strategy contract
///
/// The polymorphic abstraction every strategy satisfies. Dynamic dispatch
/// (`Box<dyn Strategy>`) rather than a closed tagged variant, so a new
/// strategy can be added without touching this file — the open-set
/// requirement the factory (`factory.rs`) exists to serve.
pub mod dual_ma;
pub mod factory;
pub mod grid;
pub mod hybrid_ai;
pub mod rsi;

use serde::{Deserialize, Serialize};

use crate::candle::CandleBuffer;
use crate::decimal::Decimal;
use crate::types::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    EntryLong,
    EntryShort,
    ExitLong,
    ExitShort,
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub price: Decimal,
    pub size: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl Signal {
    pub fn hold(price: Decimal) -> Self {
        Signal { signal_type: SignalType::Hold, price, size: None, stop_loss: None, take_profit: None }
    }
}

/// Tagged parameter value; equality is by tag + payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Discrete(String),
}

impl ParameterValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ParameterValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_discrete(&self) -> Option<&str> {
        match self {
            ParameterValue::Discrete(v) => Some(v),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            ParameterValue::Integer(_) => "integer",
            ParameterValue::Decimal(_) => "decimal",
            ParameterValue::Boolean(_) => "boolean",
            ParameterValue::Discrete(_) => "discrete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParameterRange {
    Integer { min: i64, max: i64, step: i64 },
    Decimal { min: Decimal, max: Decimal, step: Decimal },
    Boolean,
    Discrete(Vec<String>),
}

impl ParameterRange {
    fn tag(&self) -> &'static str {
        match self {
            ParameterRange::Integer { .. } => "integer",
            ParameterRange::Decimal { .. } => "decimal",
            ParameterRange::Boolean => "boolean",
            ParameterRange::Discrete(_) => "discrete",
        }
    }

    /// Number of values this range enumerates. `None` on a count that would
    /// overflow `u32::MAX` (the generator's `TooManyCombinations` trigger).
    pub fn count(&self) -> Option<u64> {
        match self {
            ParameterRange::Integer { min, max, step } => {
                if *step <= 0 || step > &(max - min).max(1) && max != min {
                    return None;
                }
                if max < min {
                    return None;
                }
                Some(((max - min) / step) as u64 + 1)
            }
            ParameterRange::Decimal { min, max, step } => {
                if !step.is_positive() || *max < *min {
                    return None;
                }
                let span = (*max - *min).to_float();
                let step_f = step.to_float();
                if step_f <= 0.0 {
                    return None;
                }
                Some((span / step_f).round() as u64 + 1)
            }
            ParameterRange::Boolean => Some(2),
            ParameterRange::Discrete(list) => {
                if list.is_empty() {
                    None
                } else {
                    Some(list.len() as u64)
                }
            }
        }
    }

    /// Enumerates all values in the range, in ascending/declared order.
    pub fn values(&self) -> Vec<ParameterValue> {
        match self {
            ParameterRange::Integer { min, max, step } => {
                let mut out = Vec::new();
                let mut v = *min;
                while v <= *max {
                    out.push(ParameterValue::Integer(v));
                    v += step;
                }
                out
            }
            ParameterRange::Decimal { min, max, step } => {
                let mut out = Vec::new();
                let mut v = *min;
                // Inclusive of `max` when (max-min) divides step exactly;
                // the epsilon guards float-path rounding in `to_float`.
                while v.to_float() <= max.to_float() + 1e-9 {
                    out.push(ParameterValue::Decimal(v));
                    v = v + *step;
                }
                out
            }
            ParameterRange::Boolean => vec![ParameterValue::Boolean(false), ParameterValue::Boolean(true)],
            ParameterRange::Discrete(list) => {
                list.iter().map(|s| ParameterValue::Discrete(s.clone())).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParameter {
    pub name: String,
    pub default: ParameterValue,
    pub optimize: bool,
    pub range: Option<ParameterRange>,
}

impl StrategyParameter {
    /// Invariant check: if `optimize` then `range` present; tags agree.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.optimize {
            let range = self.range.as_ref().ok_or_else(|| {
                crate::error::EngineError::configuration(format!(
                    "parameter {:?} marked optimize but has no range",
                    self.name
                ))
            })?;
            if range.tag() != self.default.tag() {
                return Err(crate::error::EngineError::configuration(format!(
                    "parameter {:?} default tag {:?} != range tag {:?}",
                    self.name,
                    self.default.tag(),
                    range.tag()
                )));
            }
        }
        Ok(())
    }
}

pub type ParameterSet = std::collections::BTreeMap<String, ParameterValue>;

/// The polymorphic contract every strategy satisfies.
pub trait Strategy: Send + Sync {
    /// Compute all indicator columns for the given buffer. Idempotent on an
    /// unchanged buffer; must at least fill columns through index `len-1`.
    fn populate_indicators(&self, buf: &mut CandleBuffer);

    /// Inspect the buffer up to index `i`; return at most one entry signal
    /// or none. Must not mutate `buf`.
    fn entry_signal(&self, buf: &CandleBuffer, i: usize) -> Option<Signal>;

    /// Given an open position, decide whether to close it.
    fn exit_signal(&self, buf: &CandleBuffer, i: usize, position: &Position) -> Option<Signal>;

    /// Release strategy-owned resources. Most strategies have none.
    fn deinit(&mut self) {}

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_range_min_equals_max_has_count_one() {
        let r = ParameterRange::Integer { min: 5, max: 5, step: 1 };
        assert_eq!(r.count(), Some(1));
        assert_eq!(r.values().len(), 1);
    }

    #[test]
    fn decimal_range_exact_division_includes_max() {
        let r = ParameterRange::Decimal {
            min: Decimal::from_string("1.0").unwrap(),
            max: Decimal::from_string("2.0").unwrap(),
            step: Decimal::from_string("0.5").unwrap(),
        };
        let values = r.values();
        assert_eq!(values.last().unwrap().as_decimal().unwrap(), Decimal::from_string("2.0").unwrap());
    }

    #[test]
    fn boolean_range_count_is_two() {
        assert_eq!(ParameterRange::Boolean.count(), Some(2));
    }

    #[test]
    fn validate_requires_range_when_optimize() {
        let p = StrategyParameter {
            name: "fast_period".into(),
            default: ParameterValue::Integer(3),
            optimize: true,
            range: None,
        };
        assert!(p.validate().is_err());
    }
}
