/// time.rs — Timestamp, TradingPair, Timeframe
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Monotonic integer milliseconds since epoch, total-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Timestamp(ms)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Suffix-matched against a fixed quote-asset list; whatever remains is the base.
const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "USD", "BTC", "ETH"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        TradingPair { base: base.into(), quote: quote.into() }
    }

    /// Accepts `"BTC-USDT"`, `"BTC/USDT"`, or `"BTCUSDT"`.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        if let Some((base, quote)) = s.split_once('-').or_else(|| s.split_once('/')) {
            if base.is_empty() || quote.is_empty() {
                return Err(EngineError::Configuration(format!("invalid trading pair {s:?}")));
            }
            return Ok(TradingPair::new(base.to_uppercase(), quote.to_uppercase()));
        }

        let upper = s.to_uppercase();
        for quote in KNOWN_QUOTES {
            if upper.len() > quote.len() && upper.ends_with(quote) {
                let base = &upper[..upper.len() - quote.len()];
                return Ok(TradingPair::new(base, *quote));
            }
        }
        Err(EngineError::Configuration(format!(
            "could not split trading pair {s:?} against known quote assets"
        )))
    }

    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Timeframe {
    S1,
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Timeframe {
    pub fn to_seconds(self) -> i64 {
        match self {
            Timeframe::S1 => 1,
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H2 => 7_200,
            Timeframe::H4 => 14_400,
            Timeframe::H6 => 21_600,
            Timeframe::H8 => 28_800,
            Timeframe::H12 => 43_200,
            Timeframe::D1 => 86_400,
            Timeframe::D3 => 259_200,
            Timeframe::W1 => 604_800,
            Timeframe::Mo1 => 2_592_000,
        }
    }

    pub fn from_string(s: &str) -> Result<Self, EngineError> {
        Ok(match s {
            "1s" => Timeframe::S1,
            "1m" => Timeframe::M1,
            "3m" => Timeframe::M3,
            "5m" => Timeframe::M5,
            "15m" => Timeframe::M15,
            "30m" => Timeframe::M30,
            "1h" => Timeframe::H1,
            "2h" => Timeframe::H2,
            "4h" => Timeframe::H4,
            "6h" => Timeframe::H6,
            "8h" => Timeframe::H8,
            "12h" => Timeframe::H12,
            "1d" => Timeframe::D1,
            "3d" => Timeframe::D3,
            "1w" => Timeframe::W1,
            "1M" => Timeframe::Mo1,
            other => {
                return Err(EngineError::Configuration(format!("unknown timeframe {other:?}")));
            }
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::S1 => "1s",
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1M",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dash_and_slash_and_concatenated_forms() {
        assert_eq!(TradingPair::parse("BTC-USDT").unwrap(), TradingPair::new("BTC", "USDT"));
        assert_eq!(TradingPair::parse("BTC/USDT").unwrap(), TradingPair::new("BTC", "USDT"));
        assert_eq!(TradingPair::parse("BTCUSDT").unwrap(), TradingPair::new("BTC", "USDT"));
        assert_eq!(TradingPair::parse("ETHBTC").unwrap(), TradingPair::new("ETH", "BTC"));
    }

    #[test]
    fn rejects_unsplittable_pair() {
        assert!(TradingPair::parse("XYZ").is_err());
    }

    #[test]
    fn timeframe_round_trips_through_seconds_and_string() {
        for s in ["1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M"] {
            let tf = Timeframe::from_string(s).unwrap();
            assert_eq!(tf.as_str(), s);
            assert!(tf.to_seconds() > 0);
        }
    }

    #[test]
    fn timestamps_are_totally_ordered() {
        assert!(Timestamp::from_millis(1) < Timestamp::from_millis(2));
    }
}
