/// candle.rs — Candle Buffer & Indicators
///
/// `CandleBuffer` is the append-mostly OHLCV series every strategy reads
/// from. Indicator columns are computed lazily by `Strategy::populate_indicators`
/// and stored alongside the candles, keyed by name. Single-writer (the
/// engine that owns the buffer); the strategy only ever borrows it.
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::EngineError;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: Timestamp,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Ordered candle series for a fixed (pair, timeframe) plus named indicator
/// columns. Invariants enforced on every write: timestamps strictly
/// increasing (upsert on the final candle is the one exception), indicator
/// columns either empty or exactly `candles.len()` long.
#[derive(Debug, Clone, Default)]
pub struct CandleBuffer {
    candles: Vec<Candle>,
    indicators: AHashMap<String, Vec<Decimal>>,
}

impl CandleBuffer {
    pub fn new() -> Self {
        Self { candles: Vec::new(), indicators: AHashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Candle> {
        self.candles.get(i)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Appends a new candle. Duplicate timestamps on the incoming candle vs.
    /// the current last candle are an upsert (later write wins) rather than
    /// an error, matching `update_last`.
    pub fn append(&mut self, candle: Candle) -> Result<(), EngineError> {
        if let Some(last) = self.candles.last() {
            if candle.timestamp == last.timestamp {
                return self.update_last(candle);
            }
            if candle.timestamp < last.timestamp {
                return Err(EngineError::Backtest(format!(
                    "candle timestamp not monotonic: {:?} after {:?}",
                    candle.timestamp, last.timestamp
                )));
            }
        }
        self.candles.push(candle);
        // indicator columns fall behind on append; callers must re-run
        // populate_indicators before reading the new tail index.
        Ok(())
    }

    /// Replaces the last candle in place (live-price update). Indicator
    /// values already written for that index are left untouched; the
    /// strategy is expected to recompute before relying on them again.
    pub fn update_last(&mut self, candle: Candle) -> Result<(), EngineError> {
        match self.candles.last_mut() {
            Some(last) => {
                *last = candle;
                Ok(())
            }
            None => {
                self.candles.push(candle);
                Ok(())
            }
        }
    }

    pub fn set_indicator(&mut self, name: &str, column: Vec<Decimal>) -> Result<(), EngineError> {
        if !column.is_empty() && column.len() != self.candles.len() {
            return Err(EngineError::Internal(format!(
                "indicator {name:?} column length {} != candle buffer length {}",
                column.len(),
                self.candles.len()
            )));
        }
        self.indicators.insert(name.to_string(), column);
        Ok(())
    }

    pub fn get_indicator(&self, name: &str, i: usize) -> Option<Decimal> {
        self.indicators.get(name).and_then(|col| col.get(i).copied())
    }

    pub fn has_indicator(&self, name: &str) -> bool {
        self.indicators.contains_key(name)
    }
}

/// A small number of vectorized indicator helpers, used by the concrete
/// strategies. Each takes a column of closes and returns a column the same
/// length as the input, with leading entries `Decimal::ZERO` until enough
/// history has accumulated.
pub mod indicators {
    use super::Decimal;

    /// Simple moving average over `period` closes.
    pub fn sma(closes: &[Decimal], period: usize) -> Vec<Decimal> {
        let mut out = vec![Decimal::ZERO; closes.len()];
        if period == 0 {
            return out;
        }
        for i in 0..closes.len() {
            if i + 1 < period {
                continue;
            }
            let window = &closes[i + 1 - period..=i];
            let sum = window.iter().fold(Decimal::ZERO, |acc, v| acc + *v);
            out[i] = sum.checked_div(Decimal::from_int(period as i64)).unwrap_or(Decimal::ZERO);
        }
        out
    }

    /// Exponential moving average, seeded with the simple average of the
    /// first `period` closes.
    pub fn ema(closes: &[Decimal], period: usize) -> Vec<Decimal> {
        let mut out = vec![Decimal::ZERO; closes.len()];
        if period == 0 || closes.len() < period {
            return out;
        }
        let alpha = 2.0 / (period as f64 + 1.0);
        let seed = closes[..period].iter().fold(Decimal::ZERO, |acc, v| acc + *v);
        let mut prev = seed.checked_div(Decimal::from_int(period as i64)).unwrap_or(Decimal::ZERO);
        out[period - 1] = prev;
        for i in period..closes.len() {
            let delta = (closes[i] - prev).to_float() * alpha;
            prev = Decimal::from_float(prev.to_float() + delta);
            out[i] = prev;
        }
        out
    }

    /// Wilder's RSI over `period` closes, in [0, 100].
    pub fn rsi(closes: &[Decimal], period: usize) -> Vec<Decimal> {
        let mut out = vec![Decimal::ZERO; closes.len()];
        if period == 0 || closes.len() <= period {
            return out;
        }
        let mut avg_gain = 0.0f64;
        let mut avg_loss = 0.0f64;
        for i in 1..=period {
            let change = (closes[i] - closes[i - 1]).to_float();
            if change > 0.0 {
                avg_gain += change;
            } else {
                avg_loss += -change;
            }
        }
        avg_gain /= period as f64;
        avg_loss /= period as f64;
        out[period] = rsi_from_averages(avg_gain, avg_loss);

        for i in (period + 1)..closes.len() {
            let change = (closes[i] - closes[i - 1]).to_float();
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
            avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
            out[i] = rsi_from_averages(avg_gain, avg_loss);
        }
        out
    }

    fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Decimal {
        if avg_loss < 1e-12 {
            return Decimal::from_int(100);
        }
        let rs = avg_gain / avg_loss;
        Decimal::from_float(100.0 - 100.0 / (1.0 + rs))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn closes(vals: &[i64]) -> Vec<Decimal> {
            vals.iter().map(|v| Decimal::from_int(*v)).collect()
        }

        #[test]
        fn sma_of_constant_series_equals_constant() {
            let c = closes(&[10; 20]);
            let out = sma(&c, 5);
            assert_eq!(out[19], Decimal::from_int(10));
        }

        #[test]
        fn rsi_is_100_on_strictly_increasing_series() {
            let c: Vec<Decimal> = (1..=30).map(Decimal::from_int).collect();
            let out = rsi(&c, 14);
            assert_eq!(out[29], Decimal::from_int(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: i64) -> Candle {
        Candle {
            timestamp: Timestamp::from_millis(ts),
            open: Decimal::from_int(close),
            high: Decimal::from_int(close),
            low: Decimal::from_int(close),
            close: Decimal::from_int(close),
            volume: Decimal::from_int(1),
        }
    }

    #[test]
    fn append_enforces_monotonic_timestamps() {
        let mut buf = CandleBuffer::new();
        buf.append(candle(1, 100)).unwrap();
        buf.append(candle(2, 101)).unwrap();
        assert!(buf.append(candle(1, 99)).is_err());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn duplicate_timestamp_is_upsert() {
        let mut buf = CandleBuffer::new();
        buf.append(candle(1, 100)).unwrap();
        buf.append(candle(1, 105)).unwrap();
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.get(0).unwrap().close, Decimal::from_int(105));
    }

    #[test]
    fn indicator_column_length_must_match() {
        let mut buf = CandleBuffer::new();
        buf.append(candle(1, 100)).unwrap();
        buf.append(candle(2, 101)).unwrap();
        assert!(buf.set_indicator("sma", vec![Decimal::ZERO]).is_err());
        assert!(buf.set_indicator("sma", vec![Decimal::ZERO, Decimal::ZERO]).is_ok());
        assert_eq!(buf.get_indicator("sma", 1), Some(Decimal::ZERO));
    }
}
