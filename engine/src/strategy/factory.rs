/// strategy/factory.rs — Strategy factory
///
/// Name + JSON config blob → strategy instance, per §6's config shape:
/// `{ "strategy": "<name>", "pair": {...}, "parameters": {...} }`.
use serde_json::Value;

use crate::decimal::Decimal;
use crate::error::FactoryError;

use super::dual_ma::DualMaStrategy;
use super::grid::{config_from_parameters, GridStrategy};
use super::hybrid_ai::{HybridAiStrategy, NoOpAdvisor};
use super::rsi::RsiMeanReversionStrategy;
use super::Strategy;

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub strategy: String,
    pub pair_base: String,
    pub pair_quote: String,
    pub parameters: serde_json::Map<String, Value>,
}

impl StrategyConfig {
    pub fn from_json(raw: &Value) -> Result<Self, FactoryError> {
        let strategy = raw
            .get("strategy")
            .and_then(Value::as_str)
            .ok_or_else(|| FactoryError::InvalidStrategyConfig("missing \"strategy\" field".into()))?
            .to_string();

        let pair = raw
            .get("pair")
            .ok_or_else(|| FactoryError::InvalidStrategyConfig("missing \"pair\" field".into()))?;
        let pair_base = pair
            .get("base")
            .and_then(Value::as_str)
            .ok_or_else(|| FactoryError::InvalidStrategyConfig("missing pair.base".into()))?
            .to_string();
        let pair_quote = pair
            .get("quote")
            .and_then(Value::as_str)
            .ok_or_else(|| FactoryError::InvalidStrategyConfig("missing pair.quote".into()))?
            .to_string();

        let parameters = raw
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(StrategyConfig { strategy, pair_base, pair_quote, parameters })
    }
}

fn require_i64(params: &serde_json::Map<String, Value>, name: &str) -> Result<i64, FactoryError> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| FactoryError::MissingStrategyParam(name.to_string()))
}

fn require_f64(params: &serde_json::Map<String, Value>, name: &str) -> Result<f64, FactoryError> {
    params
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| FactoryError::MissingStrategyParam(name.to_string()))
}

/// Builds a strategy instance from a validated config. Fails with the named
/// errors from §4.D.
pub fn build_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, FactoryError> {
    match config.strategy.as_str() {
        "dual_ma" => {
            let fast = require_i64(&config.parameters, "fast_period")?;
            let slow = require_i64(&config.parameters, "slow_period")?;
            if fast <= 0 || slow <= 0 {
                return Err(FactoryError::InvalidStrategyParam {
                    name: "fast_period/slow_period".into(),
                    reason: "periods must be positive".into(),
                });
            }
            if fast >= slow {
                return Err(FactoryError::InvalidStrategyParam {
                    name: "fast_period".into(),
                    reason: "fast_period must be < slow_period".into(),
                });
            }
            Ok(Box::new(DualMaStrategy::new(fast as usize, slow as usize)))
        }
        "rsi_mean_reversion" => {
            let period = require_i64(&config.parameters, "period")?;
            let oversold = require_f64(&config.parameters, "oversold")?;
            let overbought = require_f64(&config.parameters, "overbought")?;
            if period <= 0 {
                return Err(FactoryError::InvalidStrategyParam {
                    name: "period".into(),
                    reason: "period must be positive".into(),
                });
            }
            if !(0.0..=100.0).contains(&oversold) || !(0.0..=100.0).contains(&overbought) || oversold >= overbought {
                return Err(FactoryError::InvalidStrategyParam {
                    name: "oversold/overbought".into(),
                    reason: "must satisfy 0 <= oversold < overbought <= 100".into(),
                });
            }
            Ok(Box::new(RsiMeanReversionStrategy::new(
                period as usize,
                Decimal::from_float(oversold),
                Decimal::from_float(overbought),
            )))
        }
        "grid" => {
            let grid_config = config_from_parameters(&config.parameters).map_err(|e| {
                FactoryError::InvalidStrategyConfig(e.message())
            })?;
            grid_config.validate().map_err(|e| FactoryError::InvalidStrategyConfig(e.message()))?;
            GridStrategy::new(grid_config)
                .map(|s| Box::new(s) as Box<dyn Strategy>)
                .map_err(|e| FactoryError::InvalidStrategyConfig(e.message()))
        }
        "hybrid_ai" => {
            let technical_name = config
                .parameters
                .get("technical_strategy")
                .and_then(Value::as_str)
                .ok_or_else(|| FactoryError::MissingStrategyParam("technical_strategy".into()))?;
            let technical_params = config
                .parameters
                .get("technical_parameters")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let weight = config
                .parameters
                .get("technical_weight")
                .and_then(Value::as_f64)
                .unwrap_or(0.7);

            let sub_config = StrategyConfig {
                strategy: technical_name.to_string(),
                pair_base: config.pair_base.clone(),
                pair_quote: config.pair_quote.clone(),
                parameters: technical_params,
            };
            let technical = build_strategy(&sub_config)?;
            Ok(Box::new(HybridAiStrategy::new(technical, Box::new(NoOpAdvisor), weight)))
        }
        other => Err(FactoryError::StrategyNotFound(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_strategy_name_is_named_error() {
        let cfg = StrategyConfig::from_json(&json!({
            "strategy": "nonexistent",
            "pair": {"base": "BTC", "quote": "USDT"},
            "parameters": {}
        }))
        .unwrap();
        match build_strategy(&cfg) {
            Err(FactoryError::StrategyNotFound(name)) => assert_eq!(name, "nonexistent"),
            Err(other) => panic!("expected StrategyNotFound, got {other:?}"),
            Ok(_) => panic!("expected StrategyNotFound, got Ok"),
        }
    }

    #[test]
    fn dual_ma_missing_param_is_named_error() {
        let cfg = StrategyConfig::from_json(&json!({
            "strategy": "dual_ma",
            "pair": {"base": "BTC", "quote": "USDT"},
            "parameters": {"fast_period": 3}
        }))
        .unwrap();
        match build_strategy(&cfg) {
            Err(FactoryError::MissingStrategyParam(name)) => assert_eq!(name, "slow_period"),
            Err(other) => panic!("expected MissingStrategyParam, got {other:?}"),
            Ok(_) => panic!("expected MissingStrategyParam, got Ok"),
        }
    }

    #[test]
    fn grid_requires_upper_greater_than_lower() {
        let cfg = StrategyConfig::from_json(&json!({
            "strategy": "grid",
            "pair": {"base": "BTC", "quote": "USDT"},
            "parameters": {
                "upper_price": 100.0, "lower_price": 106.0,
                "grid_count": 2, "order_size": 1.0, "take_profit_pct": 1.0
            }
        }))
        .unwrap();
        assert!(build_strategy(&cfg).is_err());
    }

    #[test]
    fn building_same_config_twice_is_deterministic() {
        let raw = json!({
            "strategy": "dual_ma",
            "pair": {"base": "BTC", "quote": "USDT"},
            "parameters": {"fast_period": 3, "slow_period": 10}
        });
        let cfg1 = StrategyConfig::from_json(&raw).unwrap();
        let cfg2 = StrategyConfig::from_json(&raw).unwrap();
        let s1 = build_strategy(&cfg1).unwrap();
        let s2 = build_strategy(&cfg2).unwrap();
        assert_eq!(s1.name(), s2.name());
    }
}
