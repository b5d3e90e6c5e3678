/// strategy/grid.rs — Grid ladder exposed through the Strategy contract
///
/// The backtest engine only tracks one open position at a time per pair, but
/// a grid ladder (`grid_trading::GridLadder`) can hold several concurrent
/// lots across levels. This adapter surfaces the ladder's fills one at a
/// time through `entry_signal`/`exit_signal`, trading off multi-level
/// concurrency for compatibility with the single-position backtest loop;
/// the full concurrent ladder is exercised directly (not through this
/// adapter) by the live/paper grid runner.
use std::sync::Mutex;

use crate::candle::CandleBuffer;
use crate::decimal::Decimal;
use crate::grid_trading::{FillSide, GridConfig, GridLadder};
use crate::types::{Position, PositionSide};

use super::{Signal, SignalType, Strategy};

pub struct GridStrategy {
    ladder: Mutex<GridLadder>,
    primed: Mutex<bool>,
}

impl GridStrategy {
    pub fn new(config: GridConfig) -> Result<Self, crate::error::EngineError> {
        Ok(Self { ladder: Mutex::new(GridLadder::new(config)?), primed: Mutex::new(false) })
    }
}

impl Strategy for GridStrategy {
    fn populate_indicators(&self, _buf: &mut CandleBuffer) {
        // The ladder has no rolling indicators; it reacts to raw price.
    }

    fn entry_signal(&self, buf: &CandleBuffer, i: usize) -> Option<Signal> {
        let price = buf.get(i)?.close;
        if !*self.primed.lock().unwrap() {
            self.ladder.lock().unwrap().sync_buy_orders(price);
            *self.primed.lock().unwrap() = true;
        }
        let fills = self.ladder.lock().unwrap().process_tick(price);
        fills.into_iter().find(|f| f.side == FillSide::Buy).map(|f| Signal {
            signal_type: SignalType::EntryLong,
            price: f.price,
            size: Some(f.quantity),
            stop_loss: None,
            take_profit: None,
        })
    }

    fn exit_signal(&self, buf: &CandleBuffer, i: usize, position: &Position) -> Option<Signal> {
        if position.side != PositionSide::Long {
            return None;
        }
        let price = buf.get(i)?.close;
        let fills = self.ladder.lock().unwrap().process_tick(price);
        fills.into_iter().find(|f| f.side == FillSide::Sell).map(|f| Signal {
            signal_type: SignalType::ExitLong,
            price: f.price,
            size: Some(f.quantity),
            stop_loss: None,
            take_profit: None,
        })
    }

    fn name(&self) -> &str {
        "grid"
    }
}

/// Reads and validates the grid-specific parameters from a factory config
/// blob's `parameters` object (§4.D).
pub fn config_from_parameters(
    parameters: &serde_json::Map<String, serde_json::Value>,
) -> Result<GridConfig, crate::error::EngineError> {
    use crate::error::EngineError;

    let get_decimal = |key: &str| -> Result<Decimal, EngineError> {
        parameters
            .get(key)
            .and_then(|v| v.as_f64())
            .map(Decimal::from_float)
            .ok_or_else(|| EngineError::configuration(format!("missing grid parameter {key:?}")))
    };
    let get_f64 = |key: &str| -> Result<f64, EngineError> {
        parameters
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| EngineError::configuration(format!("missing grid parameter {key:?}")))
    };
    let get_u32 = |key: &str| -> Result<u32, EngineError> {
        parameters
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .ok_or_else(|| EngineError::configuration(format!("missing grid parameter {key:?}")))
    };
    let get_bool_or = |key: &str, default: bool| -> bool {
        parameters.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    };

    Ok(GridConfig {
        lower_price: get_decimal("lower_price")?,
        upper_price: get_decimal("upper_price")?,
        grid_count: get_u32("grid_count")?,
        order_size: get_decimal("order_size")?,
        take_profit_pct: get_f64("take_profit_pct")?,
        max_position: parameters
            .get("max_position")
            .and_then(|v| v.as_f64())
            .map(Decimal::from_float)
            .unwrap_or(Decimal::from_int(i64::MAX / 2)),
        enable_long: get_bool_or("enable_long", true),
        enable_short: get_bool_or("enable_short", false),
    })
}
