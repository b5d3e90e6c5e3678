/// grid_trading.rs — Grid-Trading State Machine
///
/// ─────────────────────────────────────────────────────────────────────────
/// MATHEMATICAL SPECIFICATION
/// ─────────────────────────────────────────────────────────────────────────
///
/// LADDER
///   `grid_count + 1` price levels evenly spaced between `lower_price` and
///   `upper_price`:
///     L_k = lower_price + k × (upper_price − lower_price) / grid_count,  k = 0..=grid_count
///
/// PER-LEVEL STATE
///   Each level carries at most one outstanding order:
///     - a standing BUY at L_k.price, while price has not yet traded down to it
///     - after that buy fills: a SELL at L_k.price × (1 + take_profit_pct/100),
///       same quantity (`order_size`); the level label stays L_k so re-arming
///       finds the original anchor.
///
///   When the sell fills: realized PnL += (sell_price − buy_price) × order_size,
///   and a fresh buy is re-armed at L_k.
///
/// TIE-BREAK
///   Multiple levels filling within one tick are processed lowest price to
///   highest (buy the dip first).
/// ─────────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LevelOrder {
    Buy,
    Sell { buy_price: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub price: Decimal,
    pub order: Option<LevelOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FillSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub level_index: usize,
    pub side: FillSide,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Only set on sell fills.
    pub realized_pnl: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct GridConfig {
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub grid_count: u32,
    pub order_size: Decimal,
    pub take_profit_pct: f64,
    pub max_position: Decimal,
    pub enable_long: bool,
    pub enable_short: bool,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.upper_price <= self.lower_price {
            return Err(EngineError::configuration("grid upper_price must be > lower_price"));
        }
        if !(2..=100).contains(&self.grid_count) {
            return Err(EngineError::configuration("grid_count must be in [2, 100]"));
        }
        if !self.order_size.is_positive() {
            return Err(EngineError::configuration("grid order_size must be positive"));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct <= 100.0) {
            return Err(EngineError::configuration("grid take_profit_pct must be in (0, 100]"));
        }
        Ok(())
    }
}

/// The live ladder: levels plus outstanding-position accounting.
pub struct GridLadder {
    config: GridConfig,
    levels: Vec<GridLevel>,
    outstanding_position: Decimal,
    pub realized_pnl: Decimal,
}

impl GridLadder {
    pub fn new(config: GridConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let n = config.grid_count as i64;
        let span = config.upper_price - config.lower_price;
        let step = span.checked_div(Decimal::from_int(n))?;
        let levels = (0..=n)
            .map(|k| GridLevel {
                index: k as usize,
                price: config.lower_price + step * Decimal::from_int(k),
                order: None,
            })
            .collect();
        Ok(Self { config, levels, outstanding_position: Decimal::ZERO, realized_pnl: Decimal::ZERO })
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn outstanding_position(&self) -> Decimal {
        self.outstanding_position
    }

    pub fn outstanding_buys(&self) -> usize {
        self.levels.iter().filter(|l| matches!(l.order, Some(LevelOrder::Buy))).count()
    }

    pub fn outstanding_sells(&self) -> usize {
        self.levels.iter().filter(|l| matches!(l.order, Some(LevelOrder::Sell { .. }))).count()
    }

    fn sell_target(&self, buy_price: Decimal) -> Decimal {
        Decimal::from_float(buy_price.to_float() * (1.0 + self.config.take_profit_pct / 100.0))
    }

    /// (Re-)arms standing buys at every level below `current_price` with no
    /// outstanding order, respecting `max_position`.
    pub fn sync_buy_orders(&mut self, current_price: Decimal) {
        if !self.config.enable_long {
            return;
        }
        for level in self.levels.iter_mut() {
            if level.order.is_none()
                && level.price < current_price
                && self.outstanding_position + self.config.order_size <= self.config.max_position
            {
                level.order = Some(LevelOrder::Buy);
            }
        }
    }

    /// Advances the ladder one tick given the current market price. Returns
    /// the fills that occurred, lowest price first.
    pub fn process_tick(&mut self, current_price: Decimal) -> Vec<FillEvent> {
        let mut fills = Vec::new();
        let mut indices: Vec<usize> = (0..self.levels.len()).collect();
        indices.sort_by_key(|&i| self.levels[i].price);

        for i in indices {
            let level = &self.levels[i];
            match level.order {
                Some(LevelOrder::Buy) if current_price <= level.price => {
                    let price = level.price;
                    self.outstanding_position = self.outstanding_position + self.config.order_size;
                    self.levels[i].order = Some(LevelOrder::Sell { buy_price: price });
                    fills.push(FillEvent {
                        level_index: i,
                        side: FillSide::Buy,
                        price,
                        quantity: self.config.order_size,
                        realized_pnl: None,
                    });
                }
                Some(LevelOrder::Sell { buy_price }) => {
                    let target = self.sell_target(buy_price);
                    if current_price >= target {
                        let pnl = (target - buy_price) * self.config.order_size;
                        self.realized_pnl = self.realized_pnl + pnl;
                        self.outstanding_position = self.outstanding_position - self.config.order_size;
                        self.levels[i].order = None;
                        fills.push(FillEvent {
                            level_index: i,
                            side: FillSide::Sell,
                            price: target,
                            quantity: self.config.order_size,
                            realized_pnl: Some(pnl),
                        });
                    }
                }
                _ => {}
            }
        }

        self.sync_buy_orders(current_price);
        fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: &str) -> Decimal {
        Decimal::from_string(v).unwrap()
    }

    fn sample_config() -> GridConfig {
        GridConfig {
            lower_price: d("100"),
            upper_price: d("106"),
            grid_count: 2,
            order_size: d("1"),
            take_profit_pct: 1.0,
            max_position: d("10"),
            enable_long: true,
            enable_short: false,
        }
    }

    #[test]
    fn levels_are_evenly_spaced() {
        let ladder = GridLadder::new(sample_config()).unwrap();
        let prices: Vec<f64> = ladder.levels().iter().map(|l| l.price.to_float()).collect();
        assert_eq!(prices, vec![100.0, 103.0, 106.0]);
    }

    #[test]
    fn outstanding_orders_never_exceed_grid_count_plus_one() {
        let mut ladder = GridLadder::new(sample_config()).unwrap();
        ladder.sync_buy_orders(d("103"));
        for p in ["103", "100", "103.03", "106", "103", "100"] {
            ladder.process_tick(d(p));
            assert!(ladder.outstanding_buys() + ladder.outstanding_sells() <= 3);
        }
    }

    #[test]
    fn two_round_trips_yield_realized_pnl_of_at_least_two() {
        // Dip to 100 and rally past 101 closes the first round trip; a
        // second dip arms level 103, and a rally past 104.03 closes it.
        let mut ladder = GridLadder::new(sample_config()).unwrap();
        ladder.sync_buy_orders(d("103"));
        for p in ["100", "101", "103.5", "103", "104.03"] {
            ladder.process_tick(d(p));
        }
        assert!(ladder.realized_pnl.to_float() >= 2.0, "realized = {}", ladder.realized_pnl);
    }

    #[test]
    fn max_position_cap_is_respected() {
        let mut cfg = sample_config();
        cfg.max_position = d("1");
        let mut ladder = GridLadder::new(cfg).unwrap();
        ladder.sync_buy_orders(d("103"));
        ladder.process_tick(d("99"));
        assert!(ladder.outstanding_position() <= d("1"));
    }
}
